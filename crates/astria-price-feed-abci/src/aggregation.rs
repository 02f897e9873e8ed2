//! Aggregation of the validators' vote extensions of one height into canonical prices.
//!
//! A height passes through the states [`Collecting`], [`Validating`], [`Aggregating`] and
//! [`Finalized`], each consuming the previous one. [`Aggregator::aggregate`] drives a height
//! through all of them and records the outcome in its [`ComplianceTracker`].
//!
//! The result only depends on the set of submissions, not on the order in which they arrived:
//! a validator submitting more than once has all its submissions rejected.
use std::{
    collections::{
        BTreeMap,
        BTreeSet,
    },
    num::NonZeroU64,
    time::Instant,
};

use astria_price_feed_core::{
    math::weighted_median,
    types::{
        CurrencyPair,
        Price,
        ValidatorAddress,
        VotingPower,
    },
};
use metrics::{
    counter,
    histogram,
};
use tracing::{
    debug,
    info,
    instrument,
    warn,
};

use crate::{
    compliance::{
        ComplianceTracker,
        Report,
    },
    metrics_init::{
        AGGREGATION_DURATION,
        CANONICAL_PRICES_PRODUCED,
        REASON_LABEL,
        SUBMISSIONS_REJECTED,
    },
    submission::{
        ValidatorSet,
        ValidatorSubmission,
    },
    validity::{
        check_submission,
        Rejection,
        ValidVote,
    },
};

const BASIS_POINTS: u16 = 10_000;

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    #[must_use]
    pub fn is_missing_validator_set(&self) -> bool {
        matches!(self.0, ErrorKind::MissingValidatorSet { .. })
    }

    #[must_use]
    pub fn is_validator_set_height_mismatch(&self) -> bool {
        matches!(self.0, ErrorKind::ValidatorSetHeightMismatch { .. })
    }

    #[must_use]
    pub fn is_zero_total_power(&self) -> bool {
        matches!(self.0, ErrorKind::ZeroTotalPower { .. })
    }

    #[must_use]
    pub fn is_already_finalized(&self) -> bool {
        matches!(self.0, ErrorKind::AlreadyFinalized { .. })
    }

    #[must_use]
    pub fn is_invalid_config(&self) -> bool {
        matches!(self.0, ErrorKind::MinParticipationOutOfRange { .. })
    }
}

#[derive(Debug, thiserror::Error)]
enum ErrorKind {
    #[error("no validator set was provided for height {height}")]
    MissingValidatorSet { height: u64 },
    #[error("validator set is for height {actual}, but height {expected} is being aggregated")]
    ValidatorSetHeightMismatch { expected: u64, actual: u64 },
    #[error("the validator set of height {height} has zero total voting power")]
    ZeroTotalPower { height: u64 },
    #[error("height {height} is at or below the last finalized height {last_finalized}")]
    AlreadyFinalized { height: u64, last_finalized: u64 },
    #[error(
        "minimum participation of {bps} basis points exceeds the maximum of {BASIS_POINTS} basis \
         points"
    )]
    MinParticipationOutOfRange { bps: u16 },
}

/// The consensus price of a currency pair at a height.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalPrice {
    pub pair: CurrencyPair,
    pub price: Price,
    pub height: u64,
}

/// The canonical prices of all tracked pairs that had sufficient valid submissions at a height.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CanonicalPrices {
    pub height: u64,
    pub prices: BTreeMap<CurrencyPair, CanonicalPrice>,
}

impl CanonicalPrices {
    #[must_use]
    pub fn get(&self, pair: &CurrencyPair) -> Option<Price> {
        self.prices.get(pair).map(|canonical| canonical.price)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct AggregatorConfig {
    /// The currency pairs tracked by the chain. Prices for other pairs are ignored.
    pub tracked_pairs: BTreeSet<CurrencyPair>,
    pub max_pairs_per_vote_extension: usize,
    /// The number of most recent heights covered by compliance tracking.
    pub compliance_window: NonZeroU64,
    /// The share of the active set's total voting power, in basis points, that must have
    /// reported a pair for it to receive a canonical price.
    pub min_participation_bps: u16,
}

/// Gathers the submissions of a height, keyed by validator.
///
/// Submissions from validators outside the active set are rejected immediately, so the number of
/// keys is bounded by the size of the active set.
pub struct Collecting<'a> {
    height: u64,
    validator_set: &'a ValidatorSet,
    submissions: BTreeMap<ValidatorAddress, Vec<ValidatorSubmission>>,
    rejections: Vec<(ValidatorAddress, Rejection)>,
}

impl<'a> Collecting<'a> {
    #[must_use]
    pub fn new(height: u64, validator_set: &'a ValidatorSet) -> Self {
        Self {
            height,
            validator_set,
            submissions: BTreeMap::new(),
            rejections: Vec::new(),
        }
    }

    pub fn collect(&mut self, submission: ValidatorSubmission) {
        if !self.validator_set.contains(&submission.validator) {
            self.rejections.push((
                submission.validator,
                Rejection::NotInActiveSet {
                    validator: submission.validator,
                    height: self.height,
                },
            ));
            return;
        }
        self.submissions
            .entry(submission.validator)
            .or_default()
            .push(submission);
    }

    #[must_use]
    pub fn finish(self) -> Validating<'a> {
        Validating {
            height: self.height,
            validator_set: self.validator_set,
            submissions: self.submissions,
            rejections: self.rejections,
        }
    }
}

/// Holds the collected submissions of a height until they are checked.
pub struct Validating<'a> {
    height: u64,
    validator_set: &'a ValidatorSet,
    submissions: BTreeMap<ValidatorAddress, Vec<ValidatorSubmission>>,
    rejections: Vec<(ValidatorAddress, Rejection)>,
}

impl<'a> Validating<'a> {
    /// Checks every collected submission, dropping prices of pairs not in `tracked_pairs`.
    #[must_use]
    pub fn validate(
        self,
        tracked_pairs: &BTreeSet<CurrencyPair>,
        max_pairs: usize,
    ) -> Aggregating<'a> {
        let Self {
            height,
            validator_set,
            submissions,
            mut rejections,
        } = self;

        let mut votes = Vec::with_capacity(submissions.len());
        for (validator, mut submissions) in submissions {
            if submissions.len() > 1 {
                for _ in &submissions {
                    rejections.push((
                        validator,
                        Rejection::Duplicate {
                            validator,
                        },
                    ));
                }
                continue;
            }
            let Some(submission) = submissions.pop() else {
                continue;
            };
            match check_submission(&submission, height, validator_set, max_pairs) {
                Ok(mut vote) => {
                    vote.prices.retain(|pair, _| tracked_pairs.contains(pair));
                    votes.push(vote);
                }
                Err(rejection) => rejections.push((validator, rejection)),
            }
        }

        Aggregating {
            height,
            validator_set,
            votes,
            rejections,
        }
    }
}

/// Holds the valid votes of a height until their prices are reduced.
pub struct Aggregating<'a> {
    height: u64,
    validator_set: &'a ValidatorSet,
    votes: Vec<ValidVote>,
    rejections: Vec<(ValidatorAddress, Rejection)>,
}

impl Aggregating<'_> {
    #[must_use]
    pub fn votes(&self) -> &[ValidVote] {
        &self.votes
    }

    #[must_use]
    pub fn rejections(&self) -> &[(ValidatorAddress, Rejection)] {
        &self.rejections
    }

    /// Computes the stake-weighted median of every tracked pair.
    ///
    /// A pair is left out if nobody reported it, or if the voting power of those who did is
    /// below `min_participation_bps` of the active set's total power.
    #[must_use]
    pub fn aggregate(
        self,
        tracked_pairs: &BTreeSet<CurrencyPair>,
        min_participation_bps: u16,
    ) -> Finalized {
        let total_power = self.validator_set.total_power();

        let mut reported: BTreeMap<&CurrencyPair, Vec<(Price, VotingPower)>> = BTreeMap::new();
        for vote in &self.votes {
            for (pair, price) in &vote.prices {
                reported
                    .entry(pair)
                    .or_default()
                    .push((*price, vote.voting_power));
            }
        }

        let mut prices = BTreeMap::new();
        for pair in tracked_pairs {
            let Some(entries) = reported.remove(pair) else {
                continue;
            };
            let reported_power: u128 = entries
                .iter()
                .map(|(_, power)| u128::from(power.get()))
                .sum();
            if !meets_participation(reported_power, total_power, min_participation_bps) {
                debug!(
                    %pair,
                    reported_power,
                    total_power,
                    "not enough voting power reported a price for the pair; leaving it out",
                );
                continue;
            }
            if let Some(price) = weighted_median(entries) {
                prices.insert(
                    pair.clone(),
                    CanonicalPrice {
                        pair: pair.clone(),
                        price,
                        height: self.height,
                    },
                );
            }
        }

        let mut reports: BTreeMap<ValidatorAddress, Report> = self
            .validator_set
            .iter()
            .map(|(validator, _)| (*validator, Report::Missing))
            .collect();
        for (validator, _) in &self.rejections {
            if let Some(report) = reports.get_mut(validator) {
                *report = Report::Rejected;
            }
        }
        for vote in self.votes {
            reports.insert(
                vote.validator,
                Report::Valid(vote.prices.into_keys().collect()),
            );
        }

        Finalized {
            prices: CanonicalPrices {
                height: self.height,
                prices,
            },
            reports,
            rejections: self.rejections,
        }
    }
}

/// The immutable outcome of a height.
#[derive(Debug)]
pub struct Finalized {
    prices: CanonicalPrices,
    reports: BTreeMap<ValidatorAddress, Report>,
    rejections: Vec<(ValidatorAddress, Rejection)>,
}

impl Finalized {
    #[must_use]
    pub fn prices(&self) -> &CanonicalPrices {
        &self.prices
    }

    /// The compliance report of every member of the active set.
    #[must_use]
    pub fn reports(&self) -> &BTreeMap<ValidatorAddress, Report> {
        &self.reports
    }

    #[must_use]
    pub fn rejections(&self) -> &[(ValidatorAddress, Rejection)] {
        &self.rejections
    }
}

fn meets_participation(reported: u128, total: u128, min_bps: u16) -> bool {
    reported.saturating_mul(u128::from(BASIS_POINTS)) >= total.saturating_mul(u128::from(min_bps))
}

/// Turns the submissions of consecutive heights into canonical prices.
#[derive(Debug)]
pub struct Aggregator {
    config: AggregatorConfig,
    compliance: ComplianceTracker,
    last_finalized: Option<u64>,
}

impl Aggregator {
    /// Constructs an aggregator from `config`.
    ///
    /// # Errors
    /// Returns an error if `config.min_participation_bps` exceeds 10000.
    pub fn new(config: AggregatorConfig) -> Result<Self, Error> {
        if config.min_participation_bps > BASIS_POINTS {
            return Err(Error(ErrorKind::MinParticipationOutOfRange {
                bps: config.min_participation_bps,
            }));
        }
        Ok(Self {
            compliance: ComplianceTracker::new(config.compliance_window),
            config,
            last_finalized: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    #[must_use]
    pub fn compliance(&self) -> &ComplianceTracker {
        &self.compliance
    }

    #[must_use]
    pub fn last_finalized_height(&self) -> Option<u64> {
        self.last_finalized
    }

    /// Aggregates the submissions of `height` into canonical prices.
    ///
    /// Individual submissions failing validation are left out and recorded in compliance.
    /// Tracked pairs without enough valid reports are absent from the result.
    ///
    /// # Errors
    /// Returns an error, leaving the aggregator unchanged, if:
    /// - `height` is at or below the last finalized height;
    /// - `validator_set` is `None` or is the set of a different height;
    /// - the validator set has zero total voting power.
    #[instrument(skip(self, submissions, validator_set), err)]
    pub fn aggregate<I>(
        &mut self,
        height: u64,
        submissions: I,
        validator_set: Option<&ValidatorSet>,
    ) -> Result<CanonicalPrices, Error>
    where
        I: IntoIterator<Item = ValidatorSubmission>,
    {
        let start = Instant::now();

        if let Some(last_finalized) = self.last_finalized {
            if height <= last_finalized {
                return Err(Error(ErrorKind::AlreadyFinalized {
                    height,
                    last_finalized,
                }));
            }
        }
        let Some(validator_set) = validator_set else {
            return Err(Error(ErrorKind::MissingValidatorSet {
                height,
            }));
        };
        if validator_set.height() != height {
            return Err(Error(ErrorKind::ValidatorSetHeightMismatch {
                expected: height,
                actual: validator_set.height(),
            }));
        }
        if validator_set.total_power() == 0 {
            return Err(Error(ErrorKind::ZeroTotalPower {
                height,
            }));
        }

        let mut collecting = Collecting::new(height, validator_set);
        for submission in submissions {
            collecting.collect(submission);
        }
        let finalized = collecting
            .finish()
            .validate(
                &self.config.tracked_pairs,
                self.config.max_pairs_per_vote_extension,
            )
            .aggregate(
                &self.config.tracked_pairs,
                self.config.min_participation_bps,
            );

        for (validator, rejection) in finalized.rejections() {
            warn!(
                %validator,
                reason = rejection.reason(),
                error = %rejection,
                "rejected validator submission",
            );
            counter!(SUBMISSIONS_REJECTED, REASON_LABEL => rejection.reason()).increment(1);
        }

        let Finalized {
            prices,
            reports,
            ..
        } = finalized;
        self.compliance.record(height, reports);
        self.last_finalized = Some(height);

        counter!(CANONICAL_PRICES_PRODUCED)
            .increment(u64::try_from(prices.len()).unwrap_or(u64::MAX));
        histogram!(AGGREGATION_DURATION).record(start.elapsed());
        info!(
            num_prices = prices.len(),
            num_tracked = self.config.tracked_pairs.len(),
            "finalized canonical prices",
        );
        Ok(prices)
    }
}
