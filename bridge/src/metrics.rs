use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref TICKS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "bridge_ticks_total",
        "Total poll cycles started"
    ))
    .unwrap();
    pub static ref WEATHER_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "bridge_weather_failures_total",
        "Total failed requests to the weather API"
    ))
    .unwrap();
    pub static ref DATA_ERRORS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "bridge_data_errors_total",
        "Total readings rejected before publishing"
    ))
    .unwrap();
    pub static ref ENTITY_UPDATES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "bridge_entity_updates_total",
        "Total readings published as an attribute update"
    ))
    .unwrap();
    pub static ref ENTITY_CREATES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "bridge_entity_creates_total",
        "Total readings published by creating the entity"
    ))
    .unwrap();
    pub static ref PUBLISH_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "bridge_publish_failures_total",
        "Total readings the broker did not accept"
    ))
    .unwrap();
    pub static ref PUBLISH_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "bridge_publish_latency_seconds",
            "Time taken to upsert a reading into the broker"
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    )
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(TICKS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WEATHER_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DATA_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ENTITY_UPDATES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ENTITY_CREATES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PUBLISH_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PUBLISH_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
