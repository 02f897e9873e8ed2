//! The capabilities a source of market data must offer to be run by the price feed.
//!
//! A provider is either polled ([`PollingProvider`]) or pushes observations over a long-lived
//! connection ([`StreamingProvider`]). Providers only talk to their venue; scheduling, timeouts,
//! reconnects, and health tracking are the job of the [`crate::runner`].
use std::sync::Arc;

use astria_eyre::eyre;
use astria_price_feed_core::types::{
    CurrencyPair,
    Price,
};
use async_trait::async_trait;
use tokio::time::Instant;

pub mod http;

/// A single price reported by a provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriceObservation {
    pub pair: CurrencyPair,
    pub price: Price,
    pub observed_at: Instant,
    pub source: Arc<str>,
}

impl PriceObservation {
    /// Creates an observation stamped with the current time.
    #[must_use]
    pub fn now(source: Arc<str>, pair: CurrencyPair, price: Price) -> Self {
        Self {
            pair,
            price,
            observed_at: Instant::now(),
            source,
        }
    }
}

#[async_trait]
pub trait PollingProvider: Send + Sync + 'static {
    fn name(&self) -> Arc<str>;

    /// Fetches the current prices of `pairs`.
    ///
    /// Pairs the venue does not know may be left out of the returned observations.
    async fn fetch(&self, pairs: &[CurrencyPair]) -> eyre::Result<Vec<PriceObservation>>;
}

#[async_trait]
pub trait StreamingProvider: Send + Sync + 'static {
    fn name(&self) -> Arc<str>;

    /// Opens a new connection subscribed to `pairs`.
    ///
    /// Called again every time the previous connection failed.
    async fn connect(&self, pairs: &[CurrencyPair]) -> eyre::Result<Box<dyn Connection>>;
}

/// What a streaming connection produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Observation(PriceObservation),
    /// Proof of life without a price, e.g. a pong or a venue heartbeat.
    Heartbeat,
}

#[async_trait]
pub trait Connection: Send + 'static {
    /// Waits for the next event.
    ///
    /// Returns `None` if the venue closed the connection. Must be cancel safe: the runner drops
    /// the returned future when it needs to send a ping.
    async fn next_event(&mut self) -> Option<eyre::Result<StreamEvent>>;

    /// Sends a keep-alive message to the venue.
    async fn ping(&mut self) -> eyre::Result<()> {
        Ok(())
    }
}

pub enum Provider {
    Polling(Box<dyn PollingProvider>),
    Streaming(Box<dyn StreamingProvider>),
}

impl Provider {
    #[must_use]
    pub fn name(&self) -> Arc<str> {
        match self {
            Self::Polling(provider) => provider.name(),
            Self::Streaming(provider) => provider.name(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Polling(_) => "polling",
            Self::Streaming(_) => "streaming",
        }
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}
