mod poll;
mod rest;
mod weather;

use anyhow::Context;
use bridge::{BrokerConfig, EntityConfig, Location, OrionClient, Publisher};
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use poll::Poller;
use weather::OpenMeteoClient;

/// Polls Open-Meteo and upserts the current conditions into Orion.
#[derive(Debug, Parser)]
#[command(name = "adapter", version)]
struct Args {
    #[arg(long, env = "ORION_HOST", default_value = "http://localhost:1026")]
    orion_host: String,

    #[arg(long, env = "FIWARE_SERVICE", default_value = "openmeteo_service")]
    fiware_service: String,

    #[arg(long, env = "FIWARE_SERVICE_PATH", default_value = "/weather")]
    fiware_service_path: String,

    #[arg(long, env = "ENTITY_ID", default_value = "WeatherObserved:Natal")]
    entity_id: String,

    #[arg(long, env = "ENTITY_TYPE", default_value = "WeatherObserved")]
    entity_type: String,

    #[arg(long, env = "CITY_NAME", default_value = "Natal")]
    city_name: String,

    #[arg(long, env = "LATITUDE", default_value_t = -5.795, allow_negative_numbers = true)]
    latitude: f64,

    #[arg(long, env = "LONGITUDE", default_value_t = -35.195, allow_negative_numbers = true)]
    longitude: f64,

    #[arg(long, env = "REFRESH_INTERVAL_SECONDS", default_value_t = 30)]
    refresh_interval_seconds: u64,

    #[arg(long, env = "OPEN_METEO_URL", default_value = "https://api.open-meteo.com")]
    open_meteo_url: String,

    #[arg(long, env = "TIMEZONE", default_value = "America/Sao_Paulo")]
    timezone: String,

    #[arg(long, env = "BROKER_TIMEOUT_SECS", default_value_t = 5)]
    broker_timeout_secs: u64,

    #[arg(long, env = "WEATHER_TIMEOUT_SECS", default_value_t = 10)]
    weather_timeout_secs: u64,

    /// Serve /metrics and /health on this address when set.
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let location = Location {
        name: args.city_name.clone(),
        latitude: args.latitude,
        longitude: args.longitude,
    };
    let entity = EntityConfig::new(&args.entity_id, &args.entity_type);
    let broker = BrokerConfig::new(&args.orion_host, &args.fiware_service, &args.fiware_service_path)
        .with_timeout(Duration::from_secs(args.broker_timeout_secs));
    let interval = Duration::from_secs(args.refresh_interval_seconds);

    info!(
        "Starting Open-Meteo adapter for '{}' ({}, {})",
        location.name, location.latitude, location.longitude
    );
    info!(
        "Broker: {} service='{}' path='{}', every {:?}",
        broker.base_url, broker.service, broker.service_path, interval
    );
    info!("Entity: id='{}' type='{}'", entity.id, entity.entity_type);

    bridge::metrics::init_metrics().context("Failed to register metrics")?;

    let weather = OpenMeteoClient::new(
        &args.open_meteo_url,
        &args.timezone,
        Duration::from_secs(args.weather_timeout_secs),
    )
    .context("Failed to build weather client")?;
    let publisher = Publisher::new(OrionClient::new(broker).context("Failed to build broker client")?);
    let poller = Poller::new(weather, publisher, entity, location, interval);

    let server_handle = match &args.metrics_addr {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind to {}", addr))?;
            info!("HTTP server listening on {}", addr);
            Some(tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, rest::create_router()).await {
                    error!("HTTP server error: {}", e);
                }
            }))
        }
        None => None,
    };

    tokio::select! {
        _ = poller.run() => {
            error!("Poll loop terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    if let Some(handle) = server_handle {
        handle.abort();
    }

    info!("Shutting down");
    Ok(())
}
