//! Check-then-create registration of the broker subscription that forwards
//! entity updates to the time-series sink.
//!
//! Two known limitations are kept as-is:
//! - listing and creating are separate requests, so two concurrent runs can
//!   both miss and both create;
//! - notify URLs are compared byte for byte, so `http://ql:8668/v2/notify`
//!   and `http://ql:8668/v2/notify/` are different targets.

use tracing::info;

use crate::config::EntityConfig;
use crate::errors::Result;
use crate::model::{
    Condition, EntityRef, HttpTarget, Notification, Subject, Subscription, ATTR_DATE_OBSERVED,
    ATTR_HUMIDITY, ATTR_LOCATION, ATTR_TEMPERATURE, ATTR_WEATHER_CODE,
};
use crate::orion::OrionClient;

pub const ATTRS_FORMAT_NORMALIZED: &str = "normalized";
pub const DEFAULT_THROTTLING_SECS: u64 = 1;

pub fn default_trigger_attrs() -> Vec<String> {
    [ATTR_TEMPERATURE, ATTR_HUMIDITY, ATTR_WEATHER_CODE, ATTR_DATE_OBSERVED]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn default_forward_attrs() -> Vec<String> {
    [
        ATTR_TEMPERATURE,
        ATTR_HUMIDITY,
        ATTR_WEATHER_CODE,
        ATTR_LOCATION,
        ATTR_DATE_OBSERVED,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// What the registrar should make sure exists.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub entity: EntityConfig,
    pub notify_url: String,
    pub trigger_attrs: Vec<String>,
    pub forward_attrs: Vec<String>,
    pub description: String,
    pub throttling: u64,
}

impl SubscriptionRequest {
    /// Request with the default attribute filters and throttling.
    pub fn new(entity: EntityConfig, notify_url: impl Into<String>) -> Self {
        let description = format!("Notify the time-series sink of updates to {}", entity.id);
        Self {
            entity,
            notify_url: notify_url.into(),
            trigger_attrs: default_trigger_attrs(),
            forward_attrs: default_forward_attrs(),
            description,
            throttling: DEFAULT_THROTTLING_SECS,
        }
    }

    pub fn to_subscription(&self) -> Subscription {
        Subscription {
            id: None,
            description: Some(self.description.clone()),
            subject: Subject {
                entities: vec![EntityRef {
                    id: Some(self.entity.id.clone()),
                    entity_type: Some(self.entity.entity_type.clone()),
                }],
                condition: Condition {
                    attrs: self.trigger_attrs.clone(),
                },
            },
            notification: Notification {
                http: HttpTarget {
                    url: Some(self.notify_url.clone()),
                },
                attrs: self.forward_attrs.clone(),
                attrs_format: Some(ATTRS_FORMAT_NORMALIZED.to_string()),
            },
            throttling: Some(self.throttling),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    AlreadyExists { id: Option<String> },
    Created { id: Option<String> },
}

/// First subscription that notifies `notify_url` about `entity_id`.
pub fn find_matching<'a>(
    subscriptions: &'a [Subscription],
    entity_id: &str,
    notify_url: &str,
) -> Option<&'a Subscription> {
    subscriptions
        .iter()
        .find(|s| s.notify_url() == Some(notify_url) && s.targets_entity(entity_id))
}

pub struct Registrar {
    client: OrionClient,
}

impl Registrar {
    pub fn new(client: OrionClient) -> Self {
        Self { client }
    }

    pub async fn ensure_subscription(&self, request: &SubscriptionRequest) -> Result<Registration> {
        let existing = self.client.list_subscriptions().await?;
        info!("Found {} subscriptions in tenant", existing.len());

        if let Some(found) = find_matching(&existing, &request.entity.id, &request.notify_url) {
            info!(
                "Subscription already exists with id {}",
                found.id.as_deref().unwrap_or("<unknown>")
            );
            return Ok(Registration::AlreadyExists {
                id: found.id.clone(),
            });
        }

        info!("Subscription not found, creating a new one");
        let id = self
            .client
            .create_subscription(&request.to_subscription())
            .await?;
        Ok(Registration::Created { id })
    }
}
