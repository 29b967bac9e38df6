use std::time::Duration;

use bridge::errors::{Error, Result};
use bridge::metrics::{TICKS_TOTAL, WEATHER_FAILURES_TOTAL};
use bridge::{EntityConfig, Location, Published, Publisher};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::weather::OpenMeteoClient;

/// Fetch -> publish -> sleep, one reading per cycle.
pub struct Poller {
    weather: OpenMeteoClient,
    publisher: Publisher,
    entity: EntityConfig,
    location: Location,
    interval: Duration,
}

impl Poller {
    pub fn new(
        weather: OpenMeteoClient,
        publisher: Publisher,
        entity: EntityConfig,
        location: Location,
        interval: Duration,
    ) -> Self {
        Self {
            weather,
            publisher,
            entity,
            location,
            interval,
        }
    }

    /// Runs until the future is dropped. A failed cycle is logged and the
    /// next one starts after the usual interval.
    pub async fn run(&self) {
        loop {
            if let Err(e) = self.tick().await {
                self.report(&e);
            }
            info!("Waiting {:?} until the next update", self.interval);
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One full cycle. The weather fetch and both broker calls finish before
    /// this returns.
    pub async fn tick(&self) -> Result<Published> {
        TICKS_TOTAL.inc();

        let current = self
            .weather
            .fetch_current(&self.location)
            .await
            .inspect_err(|_| WEATHER_FAILURES_TOTAL.inc())?;

        self.publisher
            .publish_current(&self.entity, &current, &self.location, Utc::now())
            .await
    }

    fn report(&self, err: &Error) {
        match err {
            Error::Data(msg) => warn!("Reading rejected, nothing sent to broker: {}", msg),
            e if e.is_timeout() => error!("Request timed out: {}", e),
            Error::Http { status, body } => {
                error!("Unexpected HTTP status {} for '{}': {}", status, self.entity.id, body)
            }
            e => error!("Failed to publish reading for '{}': {}", self.entity.id, e),
        }
    }
}
