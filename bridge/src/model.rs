use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

use crate::config::{EntityConfig, Location};

pub const ATTR_TEMPERATURE: &str = "temperature";
pub const ATTR_HUMIDITY: &str = "humidity";
pub const ATTR_WEATHER_CODE: &str = "weatherCode";
pub const ATTR_WIND_SPEED: &str = "windSpeed120";
pub const ATTR_LOCATION: &str = "location";
pub const ATTR_DATE_OBSERVED: &str = "dateObserved";

pub const TYPE_NUMBER: &str = "Number";
pub const TYPE_TEXT: &str = "Text";
pub const TYPE_GEO_POINT: &str = "geo:point";
pub const TYPE_DATE_TIME: &str = "DateTime";

/// One weather observation, as fetched for a single poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub temperature: Number,
    pub humidity: Number,
    pub weather_code: Number,
    pub wind_speed: Option<Number>,
    pub location: Location,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub value: Value,
    #[serde(rename = "type")]
    pub meta_type: String,
}

/// NGSI v2 attribute: `{value, type, metadata?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub value: Value,
    #[serde(rename = "type")]
    pub attr_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Metadata>,
}

impl Attribute {
    pub fn new(value: impl Into<Value>, attr_type: &str) -> Self {
        Self {
            value: value.into(),
            attr_type: attr_type.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn number(value: Number) -> Self {
        Self::new(Value::Number(value), TYPE_NUMBER)
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.metadata.insert(
            "unit".to_string(),
            Metadata {
                value: Value::String(unit.to_string()),
                meta_type: TYPE_TEXT.to_string(),
            },
        );
        self
    }
}

/// Attribute name -> attribute, the body of a PATCH on `/attrs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet(BTreeMap<String, Attribute>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, attribute: Attribute) {
        self.0.insert(name.to_string(), attribute);
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&Reading> for AttributeSet {
    fn from(reading: &Reading) -> Self {
        let mut attrs = AttributeSet::new();
        attrs.insert(
            ATTR_TEMPERATURE,
            Attribute::number(reading.temperature.clone()).with_unit("celsius"),
        );
        attrs.insert(
            ATTR_HUMIDITY,
            Attribute::number(reading.humidity.clone()).with_unit("percent"),
        );
        attrs.insert(
            ATTR_WEATHER_CODE,
            Attribute::number(reading.weather_code.clone()),
        );
        if let Some(wind) = &reading.wind_speed {
            attrs.insert(
                ATTR_WIND_SPEED,
                Attribute::number(wind.clone()).with_unit("m/s"),
            );
        }
        attrs.insert(
            ATTR_LOCATION,
            Attribute::new(reading.location.geo_point(), TYPE_GEO_POINT),
        );
        attrs.insert(
            ATTR_DATE_OBSERVED,
            Attribute::new(
                reading
                    .observed_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
                TYPE_DATE_TIME,
            ),
        );
        attrs
    }
}

/// Full entity record for `POST /v2/entities`.
#[derive(Debug, Serialize)]
pub struct EntityPayload<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub entity_type: &'a str,
    #[serde(flatten)]
    pub attrs: &'a AttributeSet,
}

impl<'a> EntityPayload<'a> {
    pub fn new(entity: &'a EntityConfig, attrs: &'a AttributeSet) -> Self {
        Self {
            id: &entity.id,
            entity_type: &entity.entity_type,
            attrs,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub attrs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub entities: Vec<EntityRef>,
    #[serde(default)]
    pub condition: Condition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpTarget {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub http: HttpTarget,
    #[serde(default)]
    pub attrs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs_format: Option<String>,
}

/// Subscription record, as listed by and posted to `/v2/subscriptions`.
///
/// Every field defaults so records created by other tools never fail the scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub subject: Subject,
    #[serde(default)]
    pub notification: Notification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttling: Option<u64>,
}

impl Subscription {
    pub fn notify_url(&self) -> Option<&str> {
        self.notification.http.url.as_deref()
    }

    pub fn targets_entity(&self, entity_id: &str) -> bool {
        self.subject
            .entities
            .iter()
            .any(|e| e.id.as_deref() == Some(entity_id))
    }
}
