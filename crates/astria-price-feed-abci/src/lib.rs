//! The consensus side of the price feed.
//!
//! Every validator extends its precommit with the prices reported by its local sidecar
//! ([`Handler::extend_vote`]) and checks the vote extensions of its peers
//! ([`Handler::verify_vote_extension`]). Once a height is decided, the [`Aggregator`] reduces the
//! validators' vote extensions to one canonical price per tracked pair, weighting each
//! validator by its voting power in the active set, and keeps track of which validators
//! contributed.
//!
//! The aggregator is synchronous and only works on its inputs: it neither reads chain state nor
//! talks to the sidecar.

pub mod aggregation;
pub mod compliance;
pub mod metrics_init;
pub mod submission;
pub mod validity;
pub mod vote_extension;

pub use aggregation::{
    Aggregator,
    AggregatorConfig,
    CanonicalPrice,
    CanonicalPrices,
};
pub use compliance::ComplianceTracker;
pub use submission::{
    Authentication,
    ValidatorSet,
    ValidatorSubmission,
};
pub use validity::Rejection;
pub use vote_extension::{
    Handler,
    HandlerConfig,
    OracleClient,
    VerifyOutcome,
};
