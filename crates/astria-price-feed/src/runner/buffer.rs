//! A conflating many-to-one channel of price observations.
//!
//! Every provider gets its own [`Sender`]. The buffer holds at most one pending observation per
//! (provider, pair): a newer observation replaces an unconsumed older one instead of queueing
//! behind it. A slow consumer therefore never causes unbounded memory growth and always sees the
//! most recent prices.
use std::{
    collections::HashSet,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

use astria_price_feed_core::types::CurrencyPair;
use indexmap::IndexMap;
use tokio::sync::Notify;

use crate::provider::PriceObservation;

type Slots = IndexMap<(Arc<str>, CurrencyPair), PriceObservation>;

struct Shared {
    slots: Mutex<Slots>,
    notify: Notify,
    senders: AtomicUsize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What happened to an observation handed to [`Sender::send`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    Queued,
    /// Replaced a pending observation of the same pair that was not consumed yet.
    Superseded,
    /// The provider is not configured for the pair.
    Dropped,
}

pub(crate) struct Sender {
    provider: Arc<str>,
    pairs: Arc<HashSet<CurrencyPair>>,
    shared: Arc<Shared>,
}

impl Sender {
    pub(crate) fn send(&self, observation: PriceObservation) -> Delivery {
        if !self.pairs.contains(&observation.pair) {
            return Delivery::Dropped;
        }
        let key = (self.provider.clone(), observation.pair.clone());
        let previous = self.shared.lock().insert(key, observation);
        self.shared.notify.notify_one();
        if previous.is_some() {
            Delivery::Superseded
        } else {
            Delivery::Queued
        }
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.notify.notify_one();
        }
    }
}

pub(crate) struct Receiver {
    shared: Arc<Shared>,
}

impl Receiver {
    /// Waits until at least one observation is pending and returns all pending observations.
    ///
    /// Returns `None` once every sender was dropped and no observation is left.
    pub(crate) async fn recv(&mut self) -> Option<Vec<PriceObservation>> {
        loop {
            let pending: Vec<_> = self.shared.lock().drain(..).map(|(_, obs)| obs).collect();
            if !pending.is_empty() {
                return Some(pending);
            }
            if self.shared.senders.load(Ordering::Acquire) == 0 {
                return None;
            }
            self.shared.notify.notified().await;
        }
    }
}

/// Creates one sender per `(provider, pairs)` entry and a single receiver.
pub(crate) fn channel<I>(providers: I) -> (Vec<Sender>, Receiver)
where
    I: IntoIterator<Item = (Arc<str>, Vec<CurrencyPair>)>,
{
    let shared = Arc::new(Shared {
        slots: Mutex::new(IndexMap::new()),
        notify: Notify::new(),
        senders: AtomicUsize::new(0),
    });
    let senders: Vec<_> = providers
        .into_iter()
        .map(|(provider, pairs)| Sender {
            provider,
            pairs: Arc::new(pairs.into_iter().collect()),
            shared: shared.clone(),
        })
        .collect();
    shared.senders.store(senders.len(), Ordering::Release);
    (
        senders,
        Receiver {
            shared,
        },
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use astria_price_feed_core::types::Price;
    use tokio::time::timeout;

    use super::*;

    fn pair(s: &str) -> CurrencyPair {
        s.parse().unwrap()
    }

    fn observation(source: &str, pair_str: &str, price: &str) -> PriceObservation {
        PriceObservation::now(source.into(), pair(pair_str), price.parse::<Price>().unwrap())
    }

    #[tokio::test]
    async fn newer_observation_supersedes_pending_one() {
        let (senders, mut rx) = channel([("a".into(), vec![pair("BTC/USD")])]);
        assert_eq!(
            Delivery::Queued,
            senders[0].send(observation("a", "BTC/USD", "1"))
        );
        assert_eq!(
            Delivery::Superseded,
            senders[0].send(observation("a", "BTC/USD", "2"))
        );
        let batch = rx.recv().await.unwrap();
        assert_eq!(1, batch.len());
        assert_eq!("2".parse::<Price>().unwrap(), batch[0].price);
    }

    #[tokio::test]
    async fn same_pair_from_different_providers_is_kept_apart() {
        let (senders, mut rx) = channel([
            ("a".into(), vec![pair("BTC/USD")]),
            ("b".into(), vec![pair("BTC/USD")]),
        ]);
        senders[0].send(observation("a", "BTC/USD", "1"));
        senders[1].send(observation("b", "BTC/USD", "2"));
        assert_eq!(2, rx.recv().await.unwrap().len());
    }

    #[tokio::test]
    async fn unconfigured_pairs_are_dropped() {
        let (senders, mut rx) = channel([("a".into(), vec![pair("BTC/USD")])]);
        assert_eq!(
            Delivery::Dropped,
            senders[0].send(observation("a", "ETH/USD", "1"))
        );
        drop(senders);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn pending_observations_are_delivered_after_senders_are_gone() {
        let (senders, mut rx) = channel([("a".into(), vec![pair("BTC/USD")])]);
        senders[0].send(observation("a", "BTC/USD", "1"));
        drop(senders);
        assert_eq!(1, rx.recv().await.unwrap().len());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn receiver_waits_for_observations() {
        let (senders, mut rx) = channel([("a".into(), vec![pair("BTC/USD")])]);
        timeout(Duration::from_millis(10), rx.recv())
            .await
            .expect_err("receiver should be blocked without observations");
        let sender = senders.into_iter().next().unwrap();
        tokio::spawn(async move {
            sender.send(observation("a", "BTC/USD", "1"));
        });
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("receiver should be woken up")
            .unwrap();
    }
}
