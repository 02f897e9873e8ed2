//! Crate-specific metrics functionality.
//!
//! Registers metrics & lists constants to be used as metric names throughout crate.

use metrics::{
    describe_counter,
    describe_histogram,
    Unit,
};
use telemetry::metric_names;

pub(crate) const REASON_LABEL: &str = "reason";

/// Describes all metrics emitted by this crate.
pub fn register() {
    describe_counter!(
        SUBMISSIONS_REJECTED,
        Unit::Count,
        "The number of validator submissions excluded from aggregation, labelled by the reason \
         they were rejected"
    );

    describe_counter!(
        CANONICAL_PRICES_PRODUCED,
        Unit::Count,
        "The number of canonical prices produced across all finalized heights"
    );

    describe_histogram!(
        AGGREGATION_DURATION,
        Unit::Seconds,
        "The time it took to aggregate the submissions of one height, in seconds"
    );
}

metric_names!(pub const METRICS_NAMES:
    SUBMISSIONS_REJECTED,
    CANONICAL_PRICES_PRODUCED,
    AGGREGATION_DURATION,
);
