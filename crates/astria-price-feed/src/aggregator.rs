//! Reduces the observations of all providers to one consolidated price per tracked market.
//!
//! The aggregator keeps the latest observation of every (provider, pair), and on every tick of
//! the aggregation interval computes a new [`Snapshot`] which it publishes through a watch
//! channel. Readers hold on to an `Arc` of the snapshot they read and never block the aggregator.
use std::{
    collections::{
        BTreeMap,
        HashMap,
        HashSet,
    },
    sync::Arc,
};

use astria_eyre::eyre;
use astria_price_feed_core::{
    math::median,
    types::{
        CurrencyPair,
        Price,
    },
};
use metrics::{
    counter,
    gauge,
};
use tokio::{
    select,
    sync::watch,
    time::{
        interval,
        Instant,
        MissedTickBehavior,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    instrument,
};

use crate::{
    config::{
        AggregatorSettings,
        Leg,
        Market,
    },
    metrics_init::{
        CONSOLIDATED_PRICES_PUBLISHED,
        STALE_MARKETS,
    },
    provider::PriceObservation,
    runner::{
        buffer,
        Health,
        ProviderState,
    },
};

/// The price of a market as agreed on by the providers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsolidatedPrice {
    pub pair: CurrencyPair,
    pub price: Price,
    pub computed_at: Instant,
    /// The number of distinct providers that contributed to `price`.
    pub num_sources: usize,
    /// Set if the last aggregation round did not have enough sources and `price` was carried
    /// over from an earlier round.
    pub is_stale: bool,
}

/// The consolidated prices of one aggregation round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub prices: BTreeMap<CurrencyPair, ConsolidatedPrice>,
    /// `None` before the first aggregation round.
    pub computed_at: Option<Instant>,
}

impl Snapshot {
    /// Returns the price of `pair` if it is known and not stale.
    #[must_use]
    pub fn fresh_price(&self, pair: &CurrencyPair) -> Option<&ConsolidatedPrice> {
        self.prices.get(pair).filter(|price| !price.is_stale)
    }

    /// Iterates over all prices that are not stale.
    pub fn fresh_prices(&self) -> impl Iterator<Item = &ConsolidatedPrice> {
        self.prices.values().filter(|price| !price.is_stale)
    }
}

pub(crate) struct Builder {
    pub(crate) markets: Vec<Market>,
    pub(crate) settings: AggregatorSettings,
    pub(crate) observations: buffer::Receiver,
    pub(crate) provider_states: Vec<watch::Receiver<ProviderState>>,
    pub(crate) shutdown: CancellationToken,
}

impl Builder {
    pub(crate) fn build(self) -> Aggregator {
        let Self {
            markets,
            settings,
            observations,
            provider_states,
            shutdown,
        } = self;
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::default()));
        Aggregator {
            markets,
            settings,
            latest: HashMap::new(),
            observations,
            provider_states,
            snapshot,
            shutdown,
        }
    }
}

pub(crate) struct Aggregator {
    markets: Vec<Market>,
    settings: AggregatorSettings,
    latest: HashMap<(Arc<str>, CurrencyPair), PriceObservation>,
    observations: buffer::Receiver,
    provider_states: Vec<watch::Receiver<ProviderState>>,
    snapshot: watch::Sender<Arc<Snapshot>>,
    shutdown: CancellationToken,
}

impl Aggregator {
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot.subscribe()
    }

    #[instrument(skip_all)]
    pub(crate) async fn run_until_stopped(mut self) -> eyre::Result<()> {
        let mut ticker = interval(self.settings.aggregation_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut providers_running = true;

        loop {
            select! {
                biased;

                () = self.shutdown.cancelled() => {
                    info!("received shutdown signal");
                    break;
                }

                _ = ticker.tick() => self.publish(),

                batch = self.observations.recv(), if providers_running => {
                    match batch {
                        Some(batch) => self.ingest(batch),
                        None => {
                            // keep serving the last observations until they go stale
                            info!("all providers have stopped");
                            providers_running = false;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn ingest(&mut self, batch: Vec<PriceObservation>) {
        for observation in batch {
            let key = (observation.source.clone(), observation.pair.clone());
            self.latest.insert(key, observation);
        }
    }

    fn publish(&mut self) {
        let failed: HashSet<Arc<str>> = self
            .provider_states
            .iter()
            .filter_map(|state| {
                let state = state.borrow();
                (state.health == Health::Failed).then(|| state.source.clone())
            })
            .collect();
        let previous = self.snapshot.borrow().clone();
        let snapshot = compute(
            &self.markets,
            self.latest.values(),
            &failed,
            &previous,
            self.settings,
            Instant::now(),
        );

        let fresh = snapshot.fresh_prices().count();
        let stale = self.markets.len().saturating_sub(fresh);
        debug!(fresh, stale, excluded_providers = failed.len(), "computed prices");
        counter!(CONSOLIDATED_PRICES_PUBLISHED).increment(fresh as u64);
        // allow: the number of markets is small
        #[allow(clippy::cast_precision_loss)]
        gauge!(STALE_MARKETS).set(stale as f64);

        self.snapshot.send_replace(Arc::new(snapshot));
    }
}

/// Computes the consolidated prices of `markets` at `now`.
///
/// Observations are only considered if they are younger than the staleness window and their
/// provider is not in `failed`. A market gets a new price only if at least
/// `min_provider_count` providers contributed to it; otherwise its price from `previous` is
/// carried over and marked stale.
fn compute<'a>(
    markets: &[Market],
    observations: impl IntoIterator<Item = &'a PriceObservation>,
    failed: &HashSet<Arc<str>>,
    previous: &Snapshot,
    settings: AggregatorSettings,
    now: Instant,
) -> Snapshot {
    let mut quotes: BTreeMap<&str, HashMap<&CurrencyPair, Price>> = BTreeMap::new();
    for observation in observations {
        let age = now.saturating_duration_since(observation.observed_at);
        if age > settings.staleness_window || failed.contains(&observation.source) {
            continue;
        }
        quotes
            .entry(&*observation.source)
            .or_default()
            .insert(&observation.pair, observation.price);
    }

    let mut prices = BTreeMap::new();
    for market in markets {
        let contributions: Vec<Price> = quotes
            .values()
            .filter_map(|quotes| contribution(market, quotes))
            .collect();
        let num_sources = contributions.len();
        let fresh = if num_sources >= settings.min_provider_count {
            median(contributions)
        } else {
            None
        };
        let price = match fresh {
            Some(price) => Some(ConsolidatedPrice {
                pair: market.pair.clone(),
                price,
                computed_at: now,
                num_sources,
                is_stale: false,
            }),
            None => previous.prices.get(&market.pair).map(|previous| ConsolidatedPrice {
                is_stale: true,
                ..previous.clone()
            }),
        };
        if let Some(price) = price {
            prices.insert(market.pair.clone(), price);
        }
    }

    Snapshot {
        prices,
        computed_at: Some(now),
    }
}

/// A provider's price for `market`: its direct quote, or else the converted price along the
/// first conversion path it has quotes for.
fn contribution(market: &Market, quotes: &HashMap<&CurrencyPair, Price>) -> Option<Price> {
    if let Some(price) = quotes.get(&market.pair) {
        return Some(*price);
    }
    market
        .conversion_paths
        .iter()
        .find_map(|path| convert_along(path, quotes))
}

fn convert_along(path: &[Leg], quotes: &HashMap<&CurrencyPair, Price>) -> Option<Price> {
    let mut legs = path.iter().map(|leg| {
        let price = *quotes.get(&leg.pair)?;
        if leg.invert {
            price.checked_inverse()
        } else {
            Some(price)
        }
    });
    let first = legs.next()??;
    legs.try_fold(first, |acc, leg| acc.checked_mul(leg?))
}
