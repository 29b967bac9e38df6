use anyhow::Context;
use bridge::subscription::DEFAULT_THROTTLING_SECS;
use bridge::{
    BrokerConfig, EntityConfig, Error, OrionClient, Registrar, Registration, SubscriptionRequest,
};
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Makes sure Orion notifies the time-series sink about the weather entity.
#[derive(Debug, Parser)]
#[command(name = "subscriber", version)]
struct Args {
    #[arg(long, env = "ORION_HOST", default_value = "http://localhost:1026")]
    orion_host: String,

    #[arg(long, env = "QUANTUMLEAP_HOST", default_value = "http://localhost:8668")]
    quantumleap_host: String,

    /// Overrides `{QUANTUMLEAP_HOST}/v2/notify`, e.g. with the sink's name
    /// inside a compose network.
    #[arg(long, env = "NOTIFY_URL")]
    notify_url: Option<String>,

    #[arg(long, env = "FIWARE_SERVICE", default_value = "openmeteo_service")]
    fiware_service: String,

    #[arg(long, env = "FIWARE_SERVICE_PATH", default_value = "/weather")]
    fiware_service_path: String,

    #[arg(long, env = "ENTITY_ID", default_value = "WeatherObserved:Natal")]
    entity_id: String,

    #[arg(long, env = "ENTITY_TYPE", default_value = "WeatherObserved")]
    entity_type: String,

    #[arg(long, env = "THROTTLING", default_value_t = DEFAULT_THROTTLING_SECS)]
    throttling: u64,

    #[arg(long, env = "BROKER_TIMEOUT_SECS", default_value_t = 5)]
    broker_timeout_secs: u64,
}

impl Args {
    fn notify_url(&self) -> String {
        self.notify_url
            .clone()
            .unwrap_or_else(|| format!("{}/v2/notify", self.quantumleap_host))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let broker = BrokerConfig::new(&args.orion_host, &args.fiware_service, &args.fiware_service_path)
        .with_timeout(Duration::from_secs(args.broker_timeout_secs));
    let mut request = SubscriptionRequest::new(
        EntityConfig::new(&args.entity_id, &args.entity_type),
        args.notify_url(),
    );
    request.throttling = args.throttling;

    info!("Ensuring subscription for entity '{}'", request.entity.id);
    info!("Orion: {}", broker.subscriptions_url());
    info!("Notify URL: {}", request.notify_url);

    let registrar = Registrar::new(OrionClient::new(broker).context("Failed to build broker client")?);

    let outcome = registrar.ensure_subscription(&request).await;
    Ok(ExitCode::from(exit_status(&outcome)))
}

/// Logs the registration outcome and maps it to a process exit status.
///
/// A conflict on create means another run got there first, so it is not a
/// failure.
fn exit_status(outcome: &bridge::Result<Registration>) -> u8 {
    match outcome {
        Ok(Registration::AlreadyExists { id }) => {
            info!(
                "Subscription already exists (id {}), nothing to do",
                id.as_deref().unwrap_or("<unknown>")
            );
            0
        }
        Ok(Registration::Created { id }) => {
            info!(
                "Subscription created (id {})",
                id.as_deref().unwrap_or("<not reported>")
            );
            0
        }
        Err(Error::Conflict { status, body }) => {
            warn!(
                "Broker reports the subscription already exists ({}): {}",
                status, body
            );
            0
        }
        Err(e) if e.is_timeout() => {
            error!("Timed out talking to Orion: {}", e);
            1
        }
        Err(e) => {
            error!("Failed to ensure subscription: {}", e);
            1
        }
    }
}
