//! Crate-specific metrics functionality.
//!
//! Registers metrics & lists constants to be used as metric names throughout crate.

use metrics::{
    describe_counter,
    describe_gauge,
    describe_histogram,
    Unit,
};
use telemetry::metric_names;

pub(crate) const PROVIDER_LABEL: &str = "provider";
pub(crate) const HEALTH_LABEL: &str = "health";
pub(crate) const STATUS_LABEL: &str = "status";
pub(crate) const STATUS_SUCCESS: &str = "success";
pub(crate) const STATUS_FAILURE: &str = "failure";

/// Bucket bounds, in seconds, of all latency histograms.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];
/// The suffix shared by the names of all latency histograms.
pub const LATENCY_SUFFIX: &str = "_latency";

/// Describes all metrics emitted by this crate.
///
/// Metrics are recorded through the global recorder installed by [`telemetry::Config`]; this
/// only attaches units and descriptions to them.
pub fn register() {
    describe_counter!(
        OBSERVATIONS_RECEIVED,
        Unit::Count,
        "The number of price observations received from providers and forwarded to the \
         aggregator, labelled by provider"
    );

    describe_counter!(
        OBSERVATIONS_DROPPED,
        Unit::Count,
        "The number of price observations dropped because the provider is not configured for \
         their currency pair, labelled by provider"
    );

    describe_counter!(
        PROVIDER_STATUS_TRANSITIONS,
        Unit::Count,
        "The number of times a provider changed its health, labelled by provider and the health \
         it changed to"
    );

    describe_histogram!(
        PROVIDER_FETCH_LATENCY,
        Unit::Seconds,
        "The time it took a polling provider to return prices, in seconds"
    );

    describe_counter!(
        CONSOLIDATED_PRICES_PUBLISHED,
        Unit::Count,
        "The number of fresh consolidated prices published by the aggregator"
    );

    describe_gauge!(
        STALE_MARKETS,
        Unit::Count,
        "The number of tracked markets without a fresh consolidated price after the last \
         aggregation round"
    );

    describe_counter!(
        ORACLE_RESPONSES,
        Unit::Count,
        "The number of price queries served by the oracle service, labelled by status"
    );

    describe_histogram!(
        ORACLE_RESPONSE_LATENCY,
        Unit::Seconds,
        "The time it took the oracle service to answer a price query, in seconds"
    );
}

metric_names!(pub const METRICS_NAMES:
    OBSERVATIONS_RECEIVED,
    OBSERVATIONS_DROPPED,
    PROVIDER_STATUS_TRANSITIONS,
    PROVIDER_FETCH_LATENCY,
    CONSOLIDATED_PRICES_PUBLISHED,
    STALE_MARKETS,
    ORACLE_RESPONSES,
    ORACLE_RESPONSE_LATENCY,
);
