use std::{
    collections::BTreeSet,
    time::Duration,
};

use astria_eyre::eyre;
use astria_price_feed_core::{
    abci::OracleVoteExtension,
    service::{
        QueryPricesRequest,
        QueryPricesResponse,
    },
    types::CurrencyPair,
};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::timeout;
use tracing::{
    debug,
    instrument,
    warn,
};

use crate::validity::{
    check_vote_extension,
    Rejection,
};

/// A client of the price feed sidecar.
#[async_trait]
pub trait OracleClient: Send + Sync {
    async fn prices(&self, request: QueryPricesRequest) -> eyre::Result<QueryPricesResponse>;
}

#[derive(Clone, Debug)]
pub struct HandlerConfig {
    pub tracked_pairs: BTreeSet<CurrencyPair>,
    pub max_pairs_per_vote_extension: usize,
    /// How long to wait for the sidecar before extending the vote without prices.
    pub client_timeout: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Accept,
    Reject(Rejection),
}

impl VerifyOutcome {
    #[must_use]
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

pub struct Handler<C> {
    oracle_client: C,
    config: HandlerConfig,
}

impl<C: OracleClient> Handler<C> {
    pub fn new(oracle_client: C, config: HandlerConfig) -> Self {
        Self {
            oracle_client,
            config,
        }
    }

    /// Returns the protobuf encoded vote extension carrying the sidecar's prices of the tracked
    /// pairs.
    ///
    /// If the sidecar fails or does not answer within the configured timeout, the vote is
    /// extended with an empty vote extension.
    #[instrument(skip(self))]
    pub async fn extend_vote(&self, height: u64) -> Bytes {
        let request = QueryPricesRequest {
            currency_pairs: self.config.tracked_pairs.iter().cloned().collect(),
        };
        let query = self.oracle_client.prices(request);
        let response = match timeout(self.config.client_timeout, query).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                warn!(
                    error = AsRef::<dyn std::error::Error>::as_ref(&error),
                    "failed to get prices from oracle sidecar; extending vote without prices",
                );
                return OracleVoteExtension::empty().encode_to_bytes();
            }
            Err(_) => {
                warn!(
                    timeout = %telemetry::display::format_duration(self.config.client_timeout),
                    "oracle sidecar did not respond in time; extending vote without prices",
                );
                return OracleVoteExtension::empty().encode_to_bytes();
            }
        };

        let prices = response
            .prices
            .into_iter()
            .filter(|(pair, _)| self.config.tracked_pairs.contains(pair))
            .take(self.config.max_pairs_per_vote_extension)
            .collect();
        let vote_extension = OracleVoteExtension {
            prices,
        };
        debug!(
            num_prices = vote_extension.prices.len(),
            "extending vote with oracle prices"
        );
        vote_extension.encode_to_bytes()
    }

    /// Checks a vote extension received from a peer.
    ///
    /// Applies the same rules used when aggregating the vote extensions of a height.
    #[instrument(skip_all)]
    pub fn verify_vote_extension(&self, vote_extension: &[u8]) -> VerifyOutcome {
        match check_vote_extension(vote_extension, self.config.max_pairs_per_vote_extension) {
            Ok(_) => VerifyOutcome::Accept,
            Err(rejection) => {
                debug!(
                    reason = rejection.reason(),
                    error = %rejection,
                    vote_extension = %telemetry::display::hex(vote_extension),
                    "rejecting vote extension",
                );
                VerifyOutcome::Reject(rejection)
            }
        }
    }
}
