//! # Astria Price Feed
//!
//! A price oracle sidecar. It continuously pulls prices for a set of currency pairs from many
//! independent market data providers, reduces them to one consolidated price per pair, and serves
//! those prices to the node's consensus engine.
//!
//! Data flows strictly in one direction:
//! - every provider runs in its own supervised task ([`runner`]), which restarts it with backoff
//!   when it fails and tracks its health;
//! - observations are funneled through a conflating buffer into the local aggregator, which
//!   recomputes the median price of every tracked market on a fixed tick ([`aggregator`]);
//! - the [`OracleService`] answers queries from the latest published snapshot.
//!
//! [`PriceFeed`] is constructed from a [`Config`] and started with
//! [`PriceFeed::run_until_stopped`].
//!
//! # Examples
//!
//! ```no_run
//! # use astria_price_feed::{
//! #     Config,
//! #     PriceFeed,
//! # };
//! # tokio_test::block_on(async {
//! let cfg: Config = config::get().expect("failed to read configuration");
//! let settings = cfg.to_settings().expect("configuration must be valid");
//! let price_feed = PriceFeed::new(settings).expect("failed creating price feed");
//! let _shutdown = price_feed.shutdown_handle();
//! price_feed
//!     .run_until_stopped()
//!     .await
//!     .expect("price feed exited with an error");
//! # })
//! ```
pub mod aggregator;
pub mod config;
pub mod metrics_init;
mod price_feed;
pub mod provider;
pub mod runner;
pub mod service;
pub(crate) mod utils;

pub use config::Config;
pub use price_feed::{
    PriceFeed,
    ShutdownHandle,
};
pub use service::{
    LocalOracleService,
    MetricsOracleService,
    OracleService,
};
