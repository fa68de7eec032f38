use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber and describe the cache counters.
///
/// JSON lines carry the current middleware span (`handler_id`, `path`) but
/// not the full span list. Fails if a global subscriber is already set.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))
}

/// Register descriptions for the cache counters with the installed recorder.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "triggercache_hit_total",
            Unit::Count,
            "Total number of requests served from the response cache."
        );
        describe_counter!(
            "triggercache_miss_total",
            Unit::Count,
            "Total number of cacheable requests forwarded to the handler."
        );
        describe_counter!(
            "triggercache_lookup_error_total",
            Unit::Count,
            "Total number of requests rejected because the store lookup failed."
        );
        describe_counter!(
            "triggercache_persist_error_total",
            Unit::Count,
            "Total number of captured responses the store failed to save."
        );
        describe_counter!(
            "triggercache_invalidate_total",
            Unit::Count,
            "Total number of keys and patterns dispatched for deletion by triggers."
        );
        describe_counter!(
            "triggercache_delete_error_total",
            Unit::Count,
            "Total number of invalidation deletes the store failed to apply."
        );
    });
}
