//! Publishes weather readings into a FIWARE Orion broker and registers the
//! subscription that forwards them to a time-series sink.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod orion;
pub mod publish;
pub mod subscription;
pub mod validate;

pub use config::{BrokerConfig, EntityConfig, Location};
pub use errors::{Error, Result};
pub use orion::OrionClient;
pub use publish::{Published, Publisher};
pub use subscription::{Registrar, Registration, SubscriptionRequest};
