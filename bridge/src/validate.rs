use chrono::{DateTime, Utc};
use serde_json::{Number, Value};

use crate::config::Location;
use crate::errors::{Error, Result};
use crate::model::Reading;

pub const FIELD_TEMPERATURE: &str = "temperature_2m";
pub const FIELD_HUMIDITY: &str = "relative_humidity_2m";
pub const FIELD_WEATHER_CODE: &str = "weather_code";
pub const FIELD_WIND_SPEED: &str = "wind_speed_120m";

/// Builds a reading from the upstream `current` object.
///
/// Fails on the first missing or non-numeric required field; nothing is
/// substituted.
pub fn reading_from_current(
    current: &Value,
    location: &Location,
    observed_at: DateTime<Utc>,
) -> Result<Reading> {
    let fields = current
        .as_object()
        .ok_or_else(|| Error::Data("current conditions are not a JSON object".to_string()))?;

    let required = |name: &str| -> Result<Number> {
        match fields.get(name) {
            Some(Value::Number(n)) => Ok(n.clone()),
            Some(Value::Null) | None => Err(Error::Data(format!("missing field {}", name))),
            Some(other) => Err(Error::Data(format!(
                "field {} is not a number: {}",
                name, other
            ))),
        }
    };

    let wind_speed = match fields.get(FIELD_WIND_SPEED) {
        Some(Value::Number(n)) => Some(n.clone()),
        Some(Value::Null) | None => None,
        Some(other) => {
            return Err(Error::Data(format!(
                "field {} is not a number: {}",
                FIELD_WIND_SPEED, other
            )))
        }
    };

    Ok(Reading {
        temperature: required(FIELD_TEMPERATURE)?,
        humidity: required(FIELD_HUMIDITY)?,
        weather_code: required(FIELD_WEATHER_CODE)?,
        wind_speed,
        location: location.clone(),
        observed_at,
    })
}
