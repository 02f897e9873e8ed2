//! Per-validator participation over a sliding window of heights.
use std::{
    collections::{
        BTreeMap,
        BTreeSet,
        VecDeque,
    },
    num::NonZeroU64,
    ops::RangeInclusive,
};

use astria_price_feed_core::types::{
    CurrencyPair,
    ValidatorAddress,
};

/// What a member of the active set contributed at one height.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Report {
    /// The validator's submission was valid and carried prices for these tracked pairs.
    Valid(BTreeSet<CurrencyPair>),
    /// The validator submitted, but its submission was rejected.
    Rejected,
    /// The validator did not submit anything.
    Missing,
}

/// Submission counters of a validator over the compliance window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    /// Heights at which the validator submitted, whether valid or not.
    pub attempted: u64,
    /// Heights at which the validator's submission was valid.
    pub valid: u64,
    /// Heights at which the validator did not submit.
    pub missing: u64,
}

/// Per-pair counters of a validator over the compliance window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PairCounters {
    /// Heights with a valid submission containing a price for the pair.
    pub with_price: u64,
    /// Heights with a valid submission not containing a price for the pair.
    pub without_price: u64,
    /// Heights without a valid submission.
    pub no_vote: u64,
}

#[derive(Debug)]
struct HeightRecord {
    height: u64,
    reports: BTreeMap<ValidatorAddress, Report>,
}

#[derive(Debug)]
pub struct ComplianceTracker {
    window: NonZeroU64,
    heights: VecDeque<HeightRecord>,
    first_height: Option<u64>,
}

impl ComplianceTracker {
    #[must_use]
    pub fn new(window: NonZeroU64) -> Self {
        Self {
            window,
            heights: VecDeque::new(),
            first_height: None,
        }
    }

    /// Records the reports of all members of the active set at `height`.
    ///
    /// Heights that fall out of the window ending at `height` are evicted. Heights must be
    /// recorded in increasing order; recording a height at or below the latest recorded one
    /// replaces nothing and is ignored.
    pub fn record<I>(&mut self, height: u64, reports: I)
    where
        I: IntoIterator<Item = (ValidatorAddress, Report)>,
    {
        if self
            .heights
            .back()
            .is_some_and(|latest| latest.height >= height)
        {
            return;
        }
        let oldest_kept = height.saturating_sub(self.window.get() - 1);
        while self
            .heights
            .front()
            .is_some_and(|record| record.height < oldest_kept)
        {
            self.heights.pop_front();
        }
        self.first_height.get_or_insert(height);
        self.heights.push_back(HeightRecord {
            height,
            reports: reports.into_iter().collect(),
        });
    }

    /// The heights covered by the window, or `None` if nothing was recorded yet.
    ///
    /// Until the window is full it starts at the first height ever recorded.
    #[must_use]
    pub fn window(&self) -> Option<RangeInclusive<u64>> {
        let latest = self.heights.back()?.height;
        let start = latest.saturating_sub(self.window.get() - 1);
        Some(start.max(self.first_height.unwrap_or(start))..=latest)
    }

    /// Returns the submission counters of `validator` over the window.
    ///
    /// Heights at which `validator` was not in the active set are not counted.
    #[must_use]
    pub fn counters(&self, validator: &ValidatorAddress) -> Counters {
        let mut counters = Counters::default();
        for report in self.reports_of(validator) {
            match report {
                Report::Valid(_) => {
                    counters.attempted += 1;
                    counters.valid += 1;
                }
                Report::Rejected => counters.attempted += 1,
                Report::Missing => counters.missing += 1,
            }
        }
        counters
    }

    /// Returns the counters of `validator` for `pair` over the window.
    #[must_use]
    pub fn pair_counters(
        &self,
        validator: &ValidatorAddress,
        pair: &CurrencyPair,
    ) -> PairCounters {
        let mut counters = PairCounters::default();
        for report in self.reports_of(validator) {
            match report {
                Report::Valid(pairs) if pairs.contains(pair) => counters.with_price += 1,
                Report::Valid(_) => counters.without_price += 1,
                Report::Rejected | Report::Missing => counters.no_vote += 1,
            }
        }
        counters
    }

    fn reports_of<'a>(
        &'a self,
        validator: &'a ValidatorAddress,
    ) -> impl Iterator<Item = &'a Report> {
        self.heights
            .iter()
            .filter_map(move |record| record.reports.get(validator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(byte: u8) -> ValidatorAddress {
        ValidatorAddress::new([byte; ValidatorAddress::LENGTH])
    }

    fn pair(s: &str) -> CurrencyPair {
        s.parse().unwrap()
    }

    fn valid(pairs: &[&str]) -> Report {
        Report::Valid(pairs.iter().copied().map(pair).collect())
    }

    fn tracker(window: u64) -> ComplianceTracker {
        ComplianceTracker::new(NonZeroU64::new(window).unwrap())
    }

    #[test]
    fn empty_tracker_has_no_window() {
        let tracker = tracker(3);
        assert_eq!(None, tracker.window());
        assert_eq!(Counters::default(), tracker.counters(&validator(1)));
    }

    #[test]
    fn counters_sum_over_recorded_heights() {
        let mut tracker = tracker(10);
        tracker.record(1, [(validator(1), valid(&["BTC/USD"]))]);
        tracker.record(2, [(validator(1), Report::Rejected)]);
        tracker.record(3, [(validator(1), Report::Missing)]);
        assert_eq!(
            Counters {
                attempted: 2,
                valid: 1,
                missing: 1,
            },
            tracker.counters(&validator(1))
        );
    }

    #[test]
    fn pair_counters_distinguish_abstention_from_no_vote() {
        let mut tracker = tracker(10);
        tracker.record(1, [(validator(1), valid(&["BTC/USD", "ETH/USD"]))]);
        tracker.record(2, [(validator(1), valid(&["ETH/USD"]))]);
        tracker.record(3, [(validator(1), Report::Rejected)]);
        tracker.record(4, [(validator(1), Report::Missing)]);
        assert_eq!(
            PairCounters {
                with_price: 1,
                without_price: 1,
                no_vote: 2,
            },
            tracker.pair_counters(&validator(1), &pair("BTC/USD"))
        );
    }

    #[test]
    fn heights_outside_the_window_are_evicted() {
        let mut tracker = tracker(3);
        for height in 1..=5 {
            tracker.record(height, [(validator(1), Report::Missing)]);
        }
        assert_eq!(Some(3..=5), tracker.window());
        assert_eq!(3, tracker.counters(&validator(1)).missing);
    }

    #[test]
    fn window_starts_at_first_recorded_height_until_full() {
        let mut tracker = tracker(10);
        tracker.record(3, [(validator(1), Report::Missing)]);
        tracker.record(4, [(validator(1), Report::Missing)]);
        assert_eq!(Some(3..=4), tracker.window());
        tracker.record(15, [(validator(1), Report::Missing)]);
        assert_eq!(Some(6..=15), tracker.window());
    }

    #[test]
    fn gaps_in_heights_evict_by_height_not_by_count() {
        let mut tracker = tracker(3);
        tracker.record(1, [(validator(1), Report::Missing)]);
        tracker.record(2, [(validator(1), Report::Missing)]);
        tracker.record(10, [(validator(1), Report::Missing)]);
        assert_eq!(Some(8..=10), tracker.window());
        assert_eq!(1, tracker.counters(&validator(1)).missing);
    }

    #[test]
    fn heights_where_validator_was_not_active_are_not_counted() {
        let mut tracker = tracker(10);
        tracker.record(1, [(validator(1), Report::Missing)]);
        tracker.record(
            2,
            [
                (validator(1), Report::Missing),
                (validator(2), valid(&[])),
            ],
        );
        assert_eq!(
            Counters {
                attempted: 1,
                valid: 1,
                missing: 0,
            },
            tracker.counters(&validator(2))
        );
    }

    #[test]
    fn stale_heights_are_ignored() {
        let mut tracker = tracker(10);
        tracker.record(5, [(validator(1), Report::Missing)]);
        tracker.record(5, [(validator(1), valid(&[]))]);
        tracker.record(4, [(validator(1), valid(&[]))]);
        assert_eq!(Some(5..=5), tracker.window());
        assert_eq!(0, tracker.counters(&validator(1)).valid);
    }
}
