use std::{
    collections::BTreeMap,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
        LazyLock,
    },
    time::Duration,
};

use astria_eyre::eyre::{
    self,
    bail,
};
use astria_price_feed::{
    config::{
        AggregatorSettings,
        HttpProviderSettings,
        Market,
        Settings,
        SupervisionSettings,
    },
    provider::{
        PollingProvider,
        PriceObservation,
    },
    runner::{
        PollSchedule,
        ProviderSpec,
    },
    LocalOracleService,
    OracleService as _,
    PriceFeed,
    ShutdownHandle,
};
use astria_price_feed_core::{
    service::QueryPricesRequest,
    types::{
        CurrencyPair,
        Price,
    },
};
use async_trait::async_trait;
use tokio::task::JoinHandle;

static TELEMETRY: LazyLock<()> = LazyLock::new(|| {
    astria_eyre::install().unwrap();
    if std::env::var_os("TEST_LOG").is_some() {
        let filter_directives = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
        println!("initializing telemetry");
        telemetry::configure()
            .set_no_otel(true)
            .set_force_stdout(true)
            .set_pretty_print(true)
            .set_filter_directives(&filter_directives)
            .try_init()
            .unwrap();
    }
});

pub fn pair(s: &str) -> CurrencyPair {
    s.parse().unwrap()
}

pub fn price(s: &str) -> Price {
    s.parse().unwrap()
}

pub fn market(s: &str) -> Market {
    Market {
        pair: pair(s),
        conversion_paths: vec![],
    }
}

pub fn settings(markets: Vec<Market>, min_provider_count: usize) -> Settings {
    Settings {
        markets,
        http_providers: vec![],
        aggregator: AggregatorSettings {
            min_provider_count,
            staleness_window: Duration::from_secs(10),
            aggregation_interval: Duration::from_millis(100),
        },
        supervision: SupervisionSettings {
            backoff_initial_delay: Duration::from_millis(50),
            backoff_max_delay: Duration::from_millis(500),
            max_consecutive_failures: 2,
            health_recheck_interval: Duration::from_secs(5),
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(1),
            max_idle_interval: Duration::from_secs(5),
            ping_interval: Duration::from_secs(1),
        },
        shutdown_grace_period: Duration::from_secs(1),
    }
}

pub fn http_provider(
    name: &str,
    url_template: String,
    pairs: Vec<CurrencyPair>,
) -> HttpProviderSettings {
    HttpProviderSettings {
        name: name.into(),
        url_template,
        price_pointer: "/data/amount".to_string(),
        interval: Duration::from_millis(100),
        request_timeout: Duration::from_millis(500),
        pairs,
    }
}

/// Quotes the same prices on every fetch.
pub struct FixedPrices {
    name: Arc<str>,
    prices: Vec<(CurrencyPair, Price)>,
}

impl FixedPrices {
    pub fn spec(name: &str, prices: &[(&str, &str)]) -> ProviderSpec {
        let prices: Vec<_> = prices.iter().map(|(p, v)| (pair(p), price(v))).collect();
        let pairs = prices.iter().map(|(p, _)| p.clone()).collect();
        ProviderSpec::polling(
            Self {
                name: name.into(),
                prices,
            },
            pairs,
            schedule(),
        )
    }
}

#[async_trait]
impl PollingProvider for FixedPrices {
    fn name(&self) -> Arc<str> {
        self.name.clone()
    }

    async fn fetch(&self, _pairs: &[CurrencyPair]) -> eyre::Result<Vec<PriceObservation>> {
        Ok(self
            .prices
            .iter()
            .map(|(pair, price)| PriceObservation::now(self.name.clone(), pair.clone(), *price))
            .collect())
    }
}

/// Fails every fetch.
pub struct Broken {
    name: Arc<str>,
}

impl Broken {
    pub fn spec(name: &str, pairs: &[&str]) -> ProviderSpec {
        ProviderSpec::polling(
            Self {
                name: name.into(),
            },
            pairs.iter().map(|p| pair(p)).collect(),
            schedule(),
        )
    }
}

#[async_trait]
impl PollingProvider for Broken {
    fn name(&self) -> Arc<str> {
        self.name.clone()
    }

    async fn fetch(&self, _pairs: &[CurrencyPair]) -> eyre::Result<Vec<PriceObservation>> {
        bail!("venue is down")
    }
}

/// Stamps every fetch with a different source name and fails once it ran out of names.
pub struct ChangingSource {
    name: Arc<str>,
    quotes: Vec<(&'static str, Price)>,
    fetches: AtomicUsize,
}

impl ChangingSource {
    pub fn spec(name: &str, pair: &str, quotes: &[(&'static str, &str)]) -> ProviderSpec {
        ProviderSpec::polling(
            Self {
                name: name.into(),
                quotes: quotes.iter().map(|(source, v)| (*source, price(v))).collect(),
                fetches: AtomicUsize::new(0),
            },
            vec![self::pair(pair)],
            schedule(),
        )
    }
}

#[async_trait]
impl PollingProvider for ChangingSource {
    fn name(&self) -> Arc<str> {
        self.name.clone()
    }

    async fn fetch(&self, pairs: &[CurrencyPair]) -> eyre::Result<Vec<PriceObservation>> {
        let fetch = self.fetches.fetch_add(1, Ordering::SeqCst);
        let Some((source, price)) = self.quotes.get(fetch) else {
            bail!("venue is down");
        };
        Ok(pairs
            .iter()
            .map(|pair| PriceObservation::now((*source).into(), pair.clone(), *price))
            .collect())
    }
}

fn schedule() -> PollSchedule {
    PollSchedule {
        interval: Duration::from_millis(100),
        request_timeout: Duration::from_millis(500),
    }
}

pub struct TestPriceFeed {
    pub oracle: LocalOracleService,
    pub shutdown: ShutdownHandle,
    pub task: JoinHandle<eyre::Result<()>>,
}

impl TestPriceFeed {
    /// Queries the oracle until it returns a price for every pair in `pairs`.
    ///
    /// # Panics
    /// Panics if the prices are not available within 5 seconds.
    pub async fn wait_for_prices(&self, pairs: &[&str]) -> BTreeMap<CurrencyPair, Price> {
        let request = QueryPricesRequest {
            currency_pairs: pairs.iter().map(|p| pair(p)).collect(),
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let response = self.oracle.prices(request.clone()).await.unwrap();
                if response.prices.len() == pairs.len() {
                    break response.prices;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("prices should have become available")
    }
}

/// Spawns a price feed running `providers`.
///
/// # Panics
/// There is no explicit error handling in favour of panicking loudly and early.
pub fn spawn_price_feed(settings: Settings, providers: Vec<ProviderSpec>) -> TestPriceFeed {
    LazyLock::force(&TELEMETRY);
    let price_feed = PriceFeed::with_providers(settings, providers).unwrap();
    start(price_feed)
}

/// Spawns a price feed running the HTTP providers in `settings`.
pub fn spawn_http_price_feed(settings: Settings) -> TestPriceFeed {
    LazyLock::force(&TELEMETRY);
    let price_feed = PriceFeed::new(settings).unwrap();
    start(price_feed)
}

fn start(price_feed: PriceFeed) -> TestPriceFeed {
    TestPriceFeed {
        oracle: price_feed.oracle_service(),
        shutdown: price_feed.shutdown_handle(),
        task: tokio::spawn(price_feed.run_until_stopped()),
    }
}
