use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::{EntityConfig, Location};
use crate::errors::{Error, Result};
use crate::metrics::{
    DATA_ERRORS_TOTAL, ENTITY_CREATES_TOTAL, ENTITY_UPDATES_TOTAL, PUBLISH_FAILURES_TOTAL,
    PUBLISH_LATENCY_SECONDS,
};
use crate::model::{AttributeSet, EntityPayload};
use crate::orion::OrionClient;
use crate::validate::reading_from_current;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    Updated,
    Created,
}

/// Upserts readings into the broker: update first, create on 404.
pub struct Publisher {
    client: OrionClient,
}

impl Publisher {
    pub fn new(client: OrionClient) -> Self {
        Self { client }
    }

    /// Validates the upstream `current` object and publishes it.
    ///
    /// No request is sent when a required field is missing.
    pub async fn publish_current(
        &self,
        entity: &EntityConfig,
        current: &Value,
        location: &Location,
        observed_at: DateTime<Utc>,
    ) -> Result<Published> {
        let reading = reading_from_current(current, location, observed_at)
            .inspect_err(|_| DATA_ERRORS_TOTAL.inc())?;
        let attrs = AttributeSet::from(&reading);
        self.publish(entity, &attrs).await
    }

    pub async fn publish(&self, entity: &EntityConfig, attrs: &AttributeSet) -> Result<Published> {
        if attrs.is_empty() {
            DATA_ERRORS_TOTAL.inc();
            return Err(Error::Data(format!("no attributes to publish for {}", entity.id)));
        }

        let start = Instant::now();
        let result = self.upsert(entity, attrs).await;
        PUBLISH_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(Published::Updated) => ENTITY_UPDATES_TOTAL.inc(),
            Ok(Published::Created) => ENTITY_CREATES_TOTAL.inc(),
            Err(_) => PUBLISH_FAILURES_TOTAL.inc(),
        }
        result
    }

    async fn upsert(&self, entity: &EntityConfig, attrs: &AttributeSet) -> Result<Published> {
        let correlator = uuid::Uuid::new_v4().to_string();
        debug!("Publishing {} attributes to {} ({})", attrs.len(), entity.id, correlator);

        match self.client.update_attrs(&entity.id, attrs, &correlator).await {
            Ok(()) => {
                info!("Entity '{}' updated", entity.id);
                Ok(Published::Updated)
            }
            Err(Error::NotFound(_)) => {
                info!("Entity '{}' not found, creating it", entity.id);
                let payload = EntityPayload::new(entity, attrs);
                self.client
                    .create_entity(&payload, &correlator)
                    .await
                    .inspect_err(|e| {
                        error!(
                            "Failed to create entity '{}' after update returned 404: {}",
                            entity.id, e
                        )
                    })?;
                info!("Entity '{}' created", entity.id);
                Ok(Published::Created)
            }
            Err(e) => Err(e),
        }
    }
}
