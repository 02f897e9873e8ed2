use std::collections::BTreeMap;

use astria_price_feed_core::types::{
    ValidatorAddress,
    VotingPower,
};
use bytes::Bytes;

/// The outcome of checking a submission's signature, as reported by the consensus engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authentication {
    Verified,
    Failed,
}

/// A vote extension as received from a validator, before any validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorSubmission {
    pub validator: ValidatorAddress,
    pub height: u64,
    /// The protobuf encoded `OracleVoteExtension`.
    pub vote_extension: Bytes,
    /// The voting power the validator declared for itself.
    pub voting_power: VotingPower,
    pub authentication: Authentication,
}

/// The active validators at a height and their voting power.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorSet {
    height: u64,
    powers: BTreeMap<ValidatorAddress, VotingPower>,
}

impl ValidatorSet {
    /// Constructs the validator set active at `height`.
    ///
    /// If a validator is listed more than once, its last entry wins.
    pub fn new<I>(height: u64, powers: I) -> Self
    where
        I: IntoIterator<Item = (ValidatorAddress, VotingPower)>,
    {
        Self {
            height,
            powers: powers.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.height
    }

    #[must_use]
    pub fn power_of(&self, validator: &ValidatorAddress) -> Option<VotingPower> {
        self.powers.get(validator).copied()
    }

    #[must_use]
    pub fn contains(&self, validator: &ValidatorAddress) -> bool {
        self.powers.contains_key(validator)
    }

    /// The sum of the voting power of all validators in the set.
    #[must_use]
    pub fn total_power(&self) -> u128 {
        self.powers.values().map(|power| u128::from(power.get())).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.powers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.powers.is_empty()
    }

    /// Iterates over the validators in ascending order of their address.
    pub fn iter(&self) -> impl Iterator<Item = (&ValidatorAddress, &VotingPower)> {
        self.powers.iter()
    }
}
