use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_DELETE, METRIC_ERROR, METRIC_FLIGHT_WAIT, METRIC_HIT, METRIC_INVALIDATION,
    METRIC_MISS, METRIC_SET, METRIC_SWEPT,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub(crate) fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(METRIC_HIT, Unit::Count, "Total number of cache hits.");
        describe_counter!(METRIC_MISS, Unit::Count, "Total number of cache misses.");
        describe_counter!(METRIC_SET, Unit::Count, "Total number of cache writes.");
        describe_counter!(
            METRIC_DELETE,
            Unit::Count,
            "Total number of cache delete operations."
        );
        describe_counter!(
            METRIC_INVALIDATION,
            Unit::Count,
            "Total number of tag invalidation operations."
        );
        describe_counter!(
            METRIC_ERROR,
            Unit::Count,
            "Total number of cache backend errors absorbed by fail-open handling."
        );
        describe_counter!(
            METRIC_SWEPT,
            Unit::Count,
            "Total number of expired entries purged by the sweeper."
        );
        describe_counter!(
            METRIC_FLIGHT_WAIT,
            Unit::Count,
            "Total number of callers that waited on an in-flight compute."
        );
    });
}
