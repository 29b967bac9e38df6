use std::time::Duration;

pub const DEFAULT_BROKER_TIMEOUT: Duration = Duration::from_secs(5);

/// Orion endpoint plus the tenant headers every request is scoped by.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub base_url: String,
    pub service: String,
    pub service_path: String,
    pub timeout: Duration,
}

impl BrokerConfig {
    pub fn new(base_url: impl Into<String>, service: impl Into<String>, service_path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            service: service.into(),
            service_path: service_path.into(),
            timeout: DEFAULT_BROKER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn entities_url(&self) -> String {
        format!("{}/v2/entities", self.base())
    }

    pub fn entity_attrs_url(&self, entity_id: &str) -> String {
        format!("{}/v2/entities/{}/attrs", self.base(), entity_id)
    }

    pub fn subscriptions_url(&self) -> String {
        format!("{}/v2/subscriptions", self.base())
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// The entity readings are published into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityConfig {
    pub id: String,
    pub entity_type: String,
}

impl EntityConfig {
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
        }
    }
}

/// Fixed observation point.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// NGSI `geo:point` value, "lat,lon".
    pub fn geo_point(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}
