//! The boundary through which the consensus engine reads the sidecar's prices.
use std::{
    sync::Arc,
    time::{
        Instant,
        SystemTime,
    },
};

use astria_eyre::eyre::{
    self,
    bail,
    WrapErr as _,
};
use astria_price_feed_core::service::{
    QueryPricesRequest,
    QueryPricesResponse,
};
use async_trait::async_trait;
use metrics::{
    counter,
    histogram,
};
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    aggregator::Snapshot,
    metrics_init::{
        ORACLE_RESPONSES,
        ORACLE_RESPONSE_LATENCY,
        STATUS_FAILURE,
        STATUS_LABEL,
        STATUS_SUCCESS,
    },
    runner::{
        Health,
        ProviderState,
    },
};

/// A summary of a provider's state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub health: &'static str,
    pub consecutive_failures: u32,
    /// The number of pairs for which the provider has delivered at least one observation.
    pub pairs_observed: usize,
}

impl ProviderStatus {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.health == Health::Healthy.as_str()
    }
}

impl From<&ProviderState> for ProviderStatus {
    fn from(state: &ProviderState) -> Self {
        Self {
            name: state.source.to_string(),
            health: state.health.as_str(),
            consecutive_failures: state.consecutive_failures,
            pairs_observed: state.latest.len(),
        }
    }
}

#[async_trait]
pub trait OracleService: Send + Sync {
    /// Returns the latest fresh prices of the requested pairs, or of all pairs if none were
    /// requested.
    ///
    /// Pairs without a price and pairs whose price is stale are left out of the response.
    async fn prices(&self, request: QueryPricesRequest) -> eyre::Result<QueryPricesResponse>;

    /// Returns the status of every provider.
    async fn status(&self) -> Vec<ProviderStatus>;
}

/// Answers queries from the snapshots published by the local aggregator.
#[derive(Clone)]
pub struct LocalOracleService {
    snapshot: watch::Receiver<Arc<Snapshot>>,
    providers: Vec<watch::Receiver<ProviderState>>,
}

impl LocalOracleService {
    #[must_use]
    pub fn new(
        snapshot: watch::Receiver<Arc<Snapshot>>,
        providers: Vec<watch::Receiver<ProviderState>>,
    ) -> Self {
        Self {
            snapshot,
            providers,
        }
    }
}

#[async_trait]
impl OracleService for LocalOracleService {
    async fn prices(&self, request: QueryPricesRequest) -> eyre::Result<QueryPricesResponse> {
        if self.snapshot.has_changed().is_err() {
            bail!("the aggregator is no longer running");
        }
        let snapshot = self.snapshot.borrow().clone();

        let prices = if request.currency_pairs.is_empty() {
            snapshot
                .fresh_prices()
                .map(|price| (price.pair.clone(), price.price))
                .collect()
        } else {
            request
                .currency_pairs
                .iter()
                .filter_map(|pair| snapshot.fresh_price(pair))
                .map(|price| (price.pair.clone(), price.price))
                .collect()
        };

        Ok(QueryPricesResponse {
            prices,
            timestamp: Some(now_as_timestamp()?),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    async fn status(&self) -> Vec<ProviderStatus> {
        self.providers
            .iter()
            .map(|state| ProviderStatus::from(&*state.borrow()))
            .collect()
    }
}

fn now_as_timestamp() -> eyre::Result<pbjson_types::Timestamp> {
    let since_epoch = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .wrap_err("system clock is set before the unix epoch")?;
    Ok(pbjson_types::Timestamp {
        seconds: i64::try_from(since_epoch.as_secs())
            .wrap_err("seconds since the unix epoch do not fit into i64")?,
        // subsec_nanos is always below 10^9
        nanos: i32::try_from(since_epoch.subsec_nanos())
            .wrap_err("sub-second nanos do not fit into i32")?,
    })
}

/// Records the outcome and latency of every query answered by the wrapped service.
#[derive(Clone)]
pub struct MetricsOracleService<S> {
    inner: S,
}

impl<S> MetricsOracleService<S> {
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
        }
    }

    #[must_use]
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: OracleService> OracleService for MetricsOracleService<S> {
    async fn prices(&self, request: QueryPricesRequest) -> eyre::Result<QueryPricesResponse> {
        let start = Instant::now();
        let response = self.inner.prices(request).await;
        let status = if response.is_ok() {
            STATUS_SUCCESS
        } else {
            STATUS_FAILURE
        };
        counter!(ORACLE_RESPONSES, STATUS_LABEL => status).increment(1);
        histogram!(ORACLE_RESPONSE_LATENCY, STATUS_LABEL => status).record(start.elapsed());
        response
    }

    async fn status(&self) -> Vec<ProviderStatus> {
        self.inner.status().await
    }
}
