use bridge::errors::{Error, Result};
use bridge::validate::{FIELD_HUMIDITY, FIELD_TEMPERATURE, FIELD_WEATHER_CODE, FIELD_WIND_SPEED};
use bridge::Location;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Open-Meteo forecast client, asking only for current conditions.
pub struct OpenMeteoClient {
    http: Client,
    base_url: String,
    timezone: String,
}

impl OpenMeteoClient {
    pub fn new(base_url: impl Into<String>, timezone: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            timezone: timezone.into(),
        })
    }

    /// Fetches the `current` object for `location`, unvalidated.
    pub async fn fetch_current(&self, location: &Location) -> Result<Value> {
        let url = format!("{}/v1/forecast", self.base_url.trim_end_matches('/'));
        let fields = current_fields();
        let latitude = location.latitude.to_string();
        let longitude = location.longitude.to_string();

        let response = self
            .http
            .get(&url)
            .query(&[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("current", fields.as_str()),
                ("wind_speed_unit", "ms"),
                ("timezone", self.timezone.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error body".to_string());
            return Err(Error::Http { status, body });
        }

        let body = response.text().await?;
        let mut data: Value = serde_json::from_str(&body)?;
        let current = data
            .get_mut("current")
            .map(Value::take)
            .ok_or_else(|| Error::Data("response has no current object".to_string()))?;

        debug!("Open-Meteo current conditions: {}", current);
        Ok(current)
    }
}

fn current_fields() -> String {
    [
        FIELD_TEMPERATURE,
        FIELD_HUMIDITY,
        FIELD_WEATHER_CODE,
        FIELD_WIND_SPEED,
    ]
    .join(",")
}
