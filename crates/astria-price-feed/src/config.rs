use std::{
    collections::HashSet,
    sync::Arc,
    time::Duration,
};

use astria_eyre::eyre::{
    self,
    bail,
    ensure,
    WrapErr as _,
};
use astria_price_feed_core::types::CurrencyPair;
use serde::{
    Deserialize,
    Serialize,
};

/// The high-level config for creating an astria-price-feed service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Log level. One of debug, info, warn, or error
    pub log: String,

    /// Forces writing trace data to stdout no matter if connected to a tty or not.
    pub force_stdout: bool,

    /// Disables writing trace data to an opentelemetry endpoint.
    pub no_otel: bool,

    /// Writes a human readable format to stdout instead of JSON formatted OTEL trace data.
    pub pretty_print: bool,

    /// Set to true to disable the metrics server
    pub no_metrics: bool,

    /// The endpoint which will be listened on for serving prometheus metrics
    pub metrics_http_listener_addr: String,

    /// Path to the json file containing the tracked markets and the providers to query.
    pub market_config_path: String,

    /// The minimum number of distinct providers that must contribute to a market for a new
    /// price to be published.
    pub min_provider_count: usize,

    /// Observations older than this are not used when computing a price.
    pub staleness_window_ms: u64,

    /// How often the consolidated prices are recomputed.
    pub aggregation_interval_ms: u64,

    pub backoff_initial_delay_ms: u64,
    pub backoff_max_delay_ms: u64,

    /// The number of consecutive failures after which a provider is considered failed.
    pub max_consecutive_failures: u32,

    /// How often a failed provider is retried.
    pub health_recheck_interval_ms: u64,

    /// Streaming providers: upper bound on waiting for the next event.
    pub read_timeout_ms: u64,

    /// Streaming providers: upper bound on connecting and sending pings.
    pub write_timeout_ms: u64,

    /// Streaming providers: a connection without an observation for this long is restarted.
    pub max_idle_interval_ms: u64,

    /// Streaming providers: how often a ping is sent.
    pub ping_interval_ms: u64,

    /// How long provider tasks are given to exit after shutdown was requested.
    pub shutdown_grace_period_ms: u64,
}

impl config::Config for Config {
    const PREFIX: &'static str = "ASTRIA_PRICE_FEED_";
}

impl Config {
    /// Reads the market config file and validates `self` into [`Settings`].
    ///
    /// # Errors
    /// Returns an error if the market config file could not be read or parsed, or if any value
    /// is out of range.
    pub fn to_settings(&self) -> eyre::Result<Settings> {
        let markets: MarketConfig = config::read_file(&self.market_config_path).wrap_err_with(|| {
            format!(
                "failed reading market config from `{}`",
                self.market_config_path
            )
        })?;
        Settings::new(self, markets)
    }
}

/// The market map: which currency pairs are tracked, how they can be derived from other pairs,
/// and which providers are queried for which pairs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketConfig {
    pub markets: Vec<MarketEntry>,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

impl config::FileConfig for MarketConfig {}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketEntry {
    pub pair: CurrencyPair,
    #[serde(default)]
    pub conversion_paths: Vec<Vec<Leg>>,
}

/// One step of a conversion path.
///
/// If `invert` is set the leg's price is used as `1 / price`, i.e. it converts from the pair's
/// quote to its base.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Leg {
    pub pair: CurrencyPair,
    #[serde(default)]
    pub invert: bool,
}

impl Leg {
    fn from_asset(&self) -> &str {
        if self.invert {
            self.pair.quote()
        } else {
            self.pair.base()
        }
    }

    fn to_asset(&self) -> &str {
        if self.invert {
            self.pair.base()
        } else {
            self.pair.quote()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEntry {
    pub name: String,
    /// URL queried once per pair. `{base}` and `{quote}` are replaced by the pair's assets.
    pub url_template: String,
    /// JSON pointer to the price inside the response body, e.g. `/data/amount`.
    pub price_pointer: String,
    pub interval_ms: u64,
    pub request_timeout_ms: u64,
    pub pairs: Vec<CurrencyPair>,
}

/// A tracked market and the ways it can be derived if a provider does not quote it directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Market {
    pub pair: CurrencyPair,
    pub conversion_paths: Vec<Vec<Leg>>,
}

#[derive(Clone, Debug)]
pub struct HttpProviderSettings {
    pub name: Arc<str>,
    pub url_template: String,
    pub price_pointer: String,
    pub interval: Duration,
    pub request_timeout: Duration,
    pub pairs: Vec<CurrencyPair>,
}

#[derive(Clone, Copy, Debug)]
pub struct AggregatorSettings {
    pub min_provider_count: usize,
    pub staleness_window: Duration,
    pub aggregation_interval: Duration,
}

#[derive(Clone, Copy, Debug)]
pub struct SupervisionSettings {
    pub backoff_initial_delay: Duration,
    pub backoff_max_delay: Duration,
    pub max_consecutive_failures: u32,
    pub health_recheck_interval: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_idle_interval: Duration,
    pub ping_interval: Duration,
}

/// The validated, immutable settings of the price feed.
#[derive(Clone, Debug)]
pub struct Settings {
    pub markets: Vec<Market>,
    pub http_providers: Vec<HttpProviderSettings>,
    pub aggregator: AggregatorSettings,
    pub supervision: SupervisionSettings,
    pub shutdown_grace_period: Duration,
}

impl Settings {
    /// Validates the environment config together with the market config.
    ///
    /// # Errors
    /// Returns an error if:
    /// - a duration or count that must be positive is zero;
    /// - the initial backoff delay exceeds the maximum delay;
    /// - the health re-check interval is shorter than the maximum backoff delay;
    /// - no markets are configured or a market is configured twice;
    /// - a conversion path is empty or does not lead from a market's base to its quote;
    /// - a provider has an empty name, a duplicate name, or no pairs.
    pub fn new(config: &Config, market_config: MarketConfig) -> eyre::Result<Self> {
        fn positive(name: &str, millis: u64) -> eyre::Result<Duration> {
            ensure!(millis > 0, "`{name}` must be positive");
            Ok(Duration::from_millis(millis))
        }

        ensure!(
            config.min_provider_count > 0,
            "`min_provider_count` must be at least 1"
        );
        ensure!(
            config.max_consecutive_failures > 0,
            "`max_consecutive_failures` must be at least 1"
        );
        ensure!(
            config.backoff_initial_delay_ms <= config.backoff_max_delay_ms,
            "`backoff_initial_delay_ms` must not exceed `backoff_max_delay_ms`"
        );
        ensure!(
            config.health_recheck_interval_ms >= config.backoff_max_delay_ms,
            "`health_recheck_interval_ms` must not be shorter than `backoff_max_delay_ms`"
        );

        let aggregator = AggregatorSettings {
            min_provider_count: config.min_provider_count,
            staleness_window: positive("staleness_window_ms", config.staleness_window_ms)?,
            aggregation_interval: positive(
                "aggregation_interval_ms",
                config.aggregation_interval_ms,
            )?,
        };
        let supervision = SupervisionSettings {
            backoff_initial_delay: positive(
                "backoff_initial_delay_ms",
                config.backoff_initial_delay_ms,
            )?,
            backoff_max_delay: positive("backoff_max_delay_ms", config.backoff_max_delay_ms)?,
            max_consecutive_failures: config.max_consecutive_failures,
            health_recheck_interval: positive(
                "health_recheck_interval_ms",
                config.health_recheck_interval_ms,
            )?,
            read_timeout: positive("read_timeout_ms", config.read_timeout_ms)?,
            write_timeout: positive("write_timeout_ms", config.write_timeout_ms)?,
            max_idle_interval: positive("max_idle_interval_ms", config.max_idle_interval_ms)?,
            ping_interval: positive("ping_interval_ms", config.ping_interval_ms)?,
        };

        let markets = validate_markets(market_config.markets)?;
        let http_providers = validate_providers(market_config.providers)?;

        Ok(Self {
            markets,
            http_providers,
            aggregator,
            supervision,
            shutdown_grace_period: Duration::from_millis(config.shutdown_grace_period_ms),
        })
    }

    /// The pairs for which consolidated prices are published.
    pub fn tracked_pairs(&self) -> impl Iterator<Item = &CurrencyPair> {
        self.markets.iter().map(|market| &market.pair)
    }
}

fn validate_markets(entries: Vec<MarketEntry>) -> eyre::Result<Vec<Market>> {
    ensure!(!entries.is_empty(), "at least one market must be configured");
    let mut seen = HashSet::new();
    let mut markets = Vec::with_capacity(entries.len());
    for MarketEntry {
        pair,
        conversion_paths,
    } in entries
    {
        ensure!(
            seen.insert(pair.clone()),
            "market `{pair}` is configured more than once"
        );
        for (index, path) in conversion_paths.iter().enumerate() {
            validate_path(&pair, path).wrap_err_with(|| {
                format!("conversion path #{index} of market `{pair}` is invalid")
            })?;
        }
        markets.push(Market {
            pair,
            conversion_paths,
        });
    }
    Ok(markets)
}

/// Checks that the legs of `path` chain from `target`'s base to its quote.
fn validate_path(target: &CurrencyPair, path: &[Leg]) -> eyre::Result<()> {
    let (Some(first), Some(last)) = (path.first(), path.last()) else {
        bail!("path must contain at least one leg");
    };
    ensure!(
        first.from_asset() == target.base(),
        "first leg `{}` does not start at `{}`",
        first.pair,
        target.base(),
    );
    ensure!(
        last.to_asset() == target.quote(),
        "last leg `{}` does not end at `{}`",
        last.pair,
        target.quote(),
    );
    for (prev, next) in path.iter().zip(path.iter().skip(1)) {
        ensure!(
            prev.to_asset() == next.from_asset(),
            "leg `{}` does not continue from leg `{}`",
            next.pair,
            prev.pair,
        );
    }
    Ok(())
}

fn validate_providers(entries: Vec<ProviderEntry>) -> eyre::Result<Vec<HttpProviderSettings>> {
    let mut seen = HashSet::new();
    let mut providers = Vec::with_capacity(entries.len());
    for ProviderEntry {
        name,
        url_template,
        price_pointer,
        interval_ms,
        request_timeout_ms,
        pairs,
    } in entries
    {
        ensure!(!name.is_empty(), "provider names must not be empty");
        ensure!(
            seen.insert(name.clone()),
            "provider `{name}` is configured more than once"
        );
        ensure!(!pairs.is_empty(), "provider `{name}` has no pairs");
        ensure!(
            interval_ms > 0 && request_timeout_ms > 0,
            "provider `{name}` must have positive `interval_ms` and `request_timeout_ms`"
        );
        providers.push(HttpProviderSettings {
            name: name.into(),
            url_template,
            price_pointer,
            interval: Duration::from_millis(interval_ms),
            request_timeout: Duration::from_millis(request_timeout_ms),
            pairs,
        });
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    const EXAMPLE_ENV: &str = include_str!("../local.env.example");
    const EXAMPLE_MARKETS: &str = include_str!("../markets.example.json");

    #[test]
    fn example_env_config_is_up_to_date() {
        config::example_env_config_is_up_to_date::<Config>(EXAMPLE_ENV);
    }

    #[test]
    #[should_panic]
    fn config_should_reject_unknown_var() {
        config::config_should_reject_unknown_var::<Config>(EXAMPLE_ENV);
    }

    fn config() -> Config {
        Config {
            log: "info".to_string(),
            force_stdout: false,
            no_otel: true,
            pretty_print: false,
            no_metrics: true,
            metrics_http_listener_addr: "127.0.0.1:9000".to_string(),
            market_config_path: String::new(),
            min_provider_count: 1,
            staleness_window_ms: 10_000,
            aggregation_interval_ms: 500,
            backoff_initial_delay_ms: 100,
            backoff_max_delay_ms: 10_000,
            max_consecutive_failures: 3,
            health_recheck_interval_ms: 30_000,
            read_timeout_ms: 5_000,
            write_timeout_ms: 5_000,
            max_idle_interval_ms: 20_000,
            ping_interval_ms: 10_000,
            shutdown_grace_period_ms: 5_000,
        }
    }

    fn markets(json: serde_json::Value) -> MarketConfig {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn example_market_config_is_valid() {
        let market_config: MarketConfig =
            config::example_file_config_is_valid::<MarketConfig>(EXAMPLE_MARKETS);
        let settings = Settings::new(&config(), market_config).unwrap();
        assert!(settings.tracked_pairs().count() > 0);
        assert!(!settings.http_providers.is_empty());
    }

    #[test]
    fn market_config_is_read_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXAMPLE_MARKETS.as_bytes()).unwrap();
        let config = Config {
            market_config_path: file.path().display().to_string(),
            ..config()
        };
        config.to_settings().unwrap();
    }

    #[test]
    fn missing_market_config_file_is_an_error() {
        let config = Config {
            market_config_path: "/this/file/does/not/exist.json".to_string(),
            ..config()
        };
        config.to_settings().unwrap_err();
    }

    #[test]
    fn inverted_leg_chains_correctly() {
        let market_config = markets(serde_json::json!({
            "markets": [{
                "pair": "BTC/EUR",
                "conversion_paths": [[
                    {"pair": "BTC/USD"},
                    {"pair": "EUR/USD", "invert": true},
                ]],
            }],
        }));
        Settings::new(&config(), market_config).unwrap();
    }

    #[test]
    fn broken_conversion_path_is_rejected() {
        let market_config = markets(serde_json::json!({
            "markets": [{
                "pair": "BTC/EUR",
                "conversion_paths": [[
                    {"pair": "BTC/USD"},
                    {"pair": "EUR/USD"},
                ]],
            }],
        }));
        let err = Settings::new(&config(), market_config).unwrap_err();
        assert!(format!("{err:?}").contains("BTC/EUR"), "{err:?}");
    }

    #[test]
    fn duplicate_market_is_rejected() {
        let market_config = markets(serde_json::json!({
            "markets": [{"pair": "BTC/USD"}, {"pair": "btc/usd"}],
        }));
        Settings::new(&config(), market_config).unwrap_err();
    }

    #[test]
    fn zero_min_provider_count_is_rejected() {
        let market_config = markets(serde_json::json!({"markets": [{"pair": "BTC/USD"}]}));
        let config = Config {
            min_provider_count: 0,
            ..config()
        };
        Settings::new(&config, market_config).unwrap_err();
    }

    #[test]
    fn initial_backoff_above_max_is_rejected() {
        let market_config = markets(serde_json::json!({"markets": [{"pair": "BTC/USD"}]}));
        let config = Config {
            backoff_initial_delay_ms: 20_000,
            ..config()
        };
        Settings::new(&config, market_config).unwrap_err();
    }

    #[test]
    fn health_recheck_shorter_than_max_backoff_is_rejected() {
        let market_config = markets(serde_json::json!({"markets": [{"pair": "BTC/USD"}]}));
        let config = Config {
            backoff_max_delay_ms: 10_000,
            health_recheck_interval_ms: 500,
            ..config()
        };
        let error = Settings::new(&config, market_config).unwrap_err();
        assert!(error.to_string().contains("health_recheck_interval_ms"));
    }

    #[test]
    fn duplicate_provider_is_rejected() {
        let provider = serde_json::json!({
            "name": "coinbase",
            "url_template": "http://localhost/{base}-{quote}",
            "price_pointer": "/data/amount",
            "interval_ms": 1000,
            "request_timeout_ms": 500,
            "pairs": ["BTC/USD"],
        });
        let market_config = markets(serde_json::json!({
            "markets": [{"pair": "BTC/USD"}],
            "providers": [provider.clone(), provider],
        }));
        Settings::new(&config(), market_config).unwrap_err();
    }
}
