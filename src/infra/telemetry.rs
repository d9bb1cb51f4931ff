//! Tracing subscriber and metric descriptions for the rgdps process.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing::debug;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Registry, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

enum MetricKind {
    Counter,
    Histogram,
}

const METRICS: &[(&str, MetricKind, Unit, &str)] = &[
    (
        "rgdps_cache_hit_total",
        MetricKind::Counter,
        Unit::Count,
        "Entity lookups answered from the cache.",
    ),
    (
        "rgdps_cache_miss_total",
        MetricKind::Counter,
        Unit::Count,
        "Entity lookups that fell through to the store.",
    ),
    (
        "rgdps_cache_evict_total",
        MetricKind::Counter,
        Unit::Count,
        "In-process cache entries evicted due to capacity.",
    ),
    (
        "rgdps_pubsub_handler_ms",
        MetricKind::Histogram,
        Unit::Milliseconds,
        "Pub/sub handler latency in milliseconds.",
    ),
];

/// Installs the global subscriber: `RUST_LOG` directives on top of the
/// configured level, then a compact or JSON formatter.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(format_layer(logging.format))
        .with(ErrorLayer::default())
        .with(env_filter)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })?;

    debug!(level = %logging.level, format = ?logging.format, "Telemetry initialised");
    Ok(())
}

fn format_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_thread_names(true)
            .boxed(),
    }
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for (name, kind, unit, description) in METRICS {
            match kind {
                MetricKind::Counter => describe_counter!(*name, *unit, *description),
                MetricKind::Histogram => describe_histogram!(*name, *unit, *description),
            }
        }
    });
}
