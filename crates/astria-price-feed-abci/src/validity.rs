//! The rules a validator's vote extension must satisfy to be used for aggregation.
//!
//! The same rules back [`crate::Handler::verify_vote_extension`] and the per-height
//! [`crate::Aggregator`], so that a vote extension accepted by one is never rejected by the other.
use std::collections::BTreeMap;

use astria_price_feed_core::{
    abci::OracleVoteExtension,
    generated::price_feed::abci::v1 as raw,
    types::{
        CurrencyPair,
        Price,
        ValidatorAddress,
        VotingPower,
    },
    Protobuf as _,
};
use prost::Message as _;

use crate::submission::{
    Authentication,
    ValidatorSet,
    ValidatorSubmission,
};

/// Why a submission was excluded from aggregation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("validator `{validator}` is not in the active set at height {height}")]
    NotInActiveSet {
        validator: ValidatorAddress,
        height: u64,
    },
    #[error("submission is for height {actual}, but height {expected} is being aggregated")]
    WrongHeight { expected: u64, actual: u64 },
    #[error(
        "declared voting power `{declared}` does not match voting power `{active}` in the active \
         set"
    )]
    VotingPowerMismatch {
        declared: VotingPower,
        active: VotingPower,
    },
    #[error("the submission's authentication failed")]
    AuthenticationFailed,
    #[error("vote extension is malformed: {reason}")]
    Malformed { reason: String },
    #[error("vote extension contains {count} prices, more than the allowed {max}")]
    TooManyPairs { count: usize, max: usize },
    #[error("validator `{validator}` submitted more than one vote extension")]
    Duplicate { validator: ValidatorAddress },
}

impl Rejection {
    /// A short, stable name of the rejection reason, used as a metric label.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotInActiveSet {
                ..
            } => "not_in_active_set",
            Self::WrongHeight {
                ..
            } => "wrong_height",
            Self::VotingPowerMismatch {
                ..
            } => "voting_power_mismatch",
            Self::AuthenticationFailed => "authentication_failed",
            Self::Malformed {
                ..
            } => "malformed",
            Self::TooManyPairs {
                ..
            } => "too_many_pairs",
            Self::Duplicate {
                ..
            } => "duplicate",
        }
    }
}

/// A submission that passed all checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidVote {
    pub validator: ValidatorAddress,
    /// The validator's voting power as per the active set.
    pub voting_power: VotingPower,
    pub prices: BTreeMap<CurrencyPair, Price>,
}

/// Decodes and checks a vote extension on its own, without regard to who submitted it.
///
/// An empty byte string is the valid encoding of a vote extension without prices.
///
/// # Errors
/// Returns a rejection if the bytes are not a protobuf encoded vote extension, if it contains
/// more than `max_pairs` prices, or if any of its currency pairs or prices is invalid.
pub fn check_vote_extension(
    bytes: &[u8],
    max_pairs: usize,
) -> Result<OracleVoteExtension, Rejection> {
    let raw = raw::OracleVoteExtension::decode(bytes).map_err(|err| Rejection::Malformed {
        reason: format!("failed decoding bytes as protobuf: {err}"),
    })?;
    if raw.prices.len() > max_pairs {
        return Err(Rejection::TooManyPairs {
            count: raw.prices.len(),
            max: max_pairs,
        });
    }
    OracleVoteExtension::try_from_raw(raw).map_err(|err| Rejection::Malformed {
        reason: format_error_chain(&err),
    })
}

/// Checks a submission against the active validator set of `height`.
///
/// The voting power of the returned vote is taken from `validator_set`, never from the
/// submission.
///
/// # Errors
/// Returns a rejection if the submission's authentication failed, if its validator is not in
/// `validator_set`, if it was made for a different height, if its declared voting power differs
/// from the active set, or if its vote extension fails [`check_vote_extension`].
pub fn check_submission(
    submission: &ValidatorSubmission,
    height: u64,
    validator_set: &ValidatorSet,
    max_pairs: usize,
) -> Result<ValidVote, Rejection> {
    if submission.authentication == Authentication::Failed {
        return Err(Rejection::AuthenticationFailed);
    }
    let Some(active) = validator_set.power_of(&submission.validator) else {
        return Err(Rejection::NotInActiveSet {
            validator: submission.validator,
            height,
        });
    };
    if submission.height != height {
        return Err(Rejection::WrongHeight {
            expected: height,
            actual: submission.height,
        });
    }
    if submission.voting_power != active {
        return Err(Rejection::VotingPowerMismatch {
            declared: submission.voting_power,
            active,
        });
    }
    let vote_extension = check_vote_extension(&submission.vote_extension, max_pairs)?;
    Ok(ValidVote {
        validator: submission.validator,
        voting_power: active,
        prices: vote_extension.prices,
    })
}

fn format_error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
