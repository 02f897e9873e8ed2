//! Reductions of many prices for one currency pair to a single price.
use crate::types::{
    Price,
    VotingPower,
};

/// Returns the median of `prices`, or `None` if `prices` is empty.
///
/// For an even number of prices the result is the mean of the two middle values.
#[must_use]
pub fn median(mut prices: Vec<Price>) -> Option<Price> {
    prices.sort_unstable();
    let midpoint = prices.len() / 2;
    if prices.len() % 2 == 1 {
        return prices.get(midpoint).copied();
    }

    // `None` if and only if `prices` is empty.
    let lower_index = midpoint.checked_sub(1)?;
    let lower = prices.get(lower_index)?;
    let higher = prices.get(midpoint)?;
    Some(lower.midpoint(*higher))
}

/// Returns the stake-weighted median of `entries`.
///
/// The entries are ordered by price and the result is the lowest price at which the cumulative
/// voting power reaches at least half of the total. If the cumulative power lands exactly on
/// one half, the lower of the two candidate prices is chosen.
///
/// Returns `None` if `entries` is empty or all of them carry zero voting power.
///
/// The result only depends on the multiset of entries, not on their order.
#[must_use]
pub fn weighted_median(mut entries: Vec<(Price, VotingPower)>) -> Option<Price> {
    let total: u128 = entries
        .iter()
        .map(|(_, power)| u128::from(power.get()))
        .sum();
    if total == 0 {
        return None;
    }
    entries.sort_unstable();

    let mut cumulative: u128 = 0;
    for (price, power) in entries {
        cumulative = cumulative.saturating_add(u128::from(power.get()));
        if cumulative.saturating_mul(2) >= total {
            return Some(price);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(value: &str) -> Price {
        value.parse().unwrap()
    }

    fn prices<'a, I: IntoIterator<Item = &'a str>>(values: I) -> Vec<Price> {
        values.into_iter().map(price).collect()
    }

    fn weighted<'a, I: IntoIterator<Item = (&'a str, u64)>>(
        values: I,
    ) -> Vec<(Price, VotingPower)> {
        values
            .into_iter()
            .map(|(value, power)| (price(value), VotingPower::new(power)))
            .collect()
    }

    #[test]
    fn should_calculate_median() {
        // Empty set should return None.
        assert!(median(vec![]).is_none());

        // Should handle a set with 1 entry.
        assert_eq!(price("1"), median(prices(["1"])).unwrap());

        // Should handle a set with 2 entries.
        assert_eq!(price("15"), median(prices(["20", "10"])).unwrap());

        // Odd number of entries picks the middle one.
        assert_eq!(price("12"), median(prices(["14", "10", "12"])).unwrap());

        // Even number of entries averages the two middle ones.
        assert_eq!(
            price("13"),
            median(prices(["16", "10", "14", "12"])).unwrap()
        );

        // Averages are not rounded.
        assert_eq!(
            price("17.5"),
            median(prices(["10", "15", "20", "25"])).unwrap()
        );
    }

    #[test]
    fn median_of_large_values_does_not_overflow() {
        let max = Price::try_new(rust_decimal::Decimal::MAX).unwrap();
        assert_eq!(max, median(vec![max, max]).unwrap());
    }

    #[test]
    fn weighted_median_follows_the_stake() {
        // A single validator holding 80% of the stake decides the price.
        let entries = weighted([("100", 1), ("101", 1), ("200", 8)]);
        assert_eq!(price("200"), weighted_median(entries).unwrap());
    }

    #[test]
    fn weighted_median_tie_resolves_to_lower_price() {
        let entries = weighted([("200", 5), ("100", 5)]);
        assert_eq!(price("100"), weighted_median(entries).unwrap());
    }

    #[test]
    fn weighted_median_with_equal_weights_is_lower_median() {
        let entries = weighted([("10", 1), ("12", 1), ("14", 1), ("16", 1)]);
        assert_eq!(price("12"), weighted_median(entries).unwrap());
    }

    #[test]
    fn weighted_median_does_not_depend_on_input_order() {
        let forward = weighted([("1", 3), ("2", 1), ("3", 1), ("4", 2)]);
        let mut backward = forward.clone();
        backward.reverse();
        assert_eq!(
            weighted_median(forward).unwrap(),
            weighted_median(backward).unwrap(),
        );
    }

    #[test]
    fn weighted_median_without_power_is_none() {
        assert!(weighted_median(vec![]).is_none());
        assert!(weighted_median(weighted([("1", 0), ("2", 0)])).is_none());
    }

    #[test]
    fn weighted_median_handles_maximum_voting_powers() {
        let entries = weighted([("1", u64::MAX), ("2", u64::MAX), ("3", u64::MAX)]);
        assert_eq!(price("2"), weighted_median(entries).unwrap());
    }
}
