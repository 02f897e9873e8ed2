//! Read a service config from the process environment and from JSON files.
//!
//! A [`Config`] is read from environment variables: every field is taken from a variable named
//! after the field, upper-cased and prefixed with [`Config::PREFIX`]. The one exception is
//! `log`: if `RUST_LOG` is set, it takes precedence over `<PREFIX>LOG`.
//!
//! Data that does not fit into flat environment variables, like a list of markets and the
//! venues quoting them, is kept in a JSON file and read as a [`FileConfig`].
//!
//! # Example
//! ```no_run
//! use astria_config as config;
//! use serde::{
//!     Deserialize,
//!     Serialize,
//! };
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! #[serde(deny_unknown_fields)]
//! pub struct MyConfig {
//!     pub log: String,
//!     pub market_config_path: String,
//! }
//!
//! impl config::Config for MyConfig {
//!     const PREFIX: &'static str = "MY_SERVICE_";
//! }
//!
//! #[derive(Debug, Deserialize)]
//! pub struct Markets {
//!     pub pairs: Vec<String>,
//! }
//!
//! impl config::FileConfig for Markets {}
//!
//! let config: MyConfig = config::get().unwrap();
//! let markets: Markets = config::read_file(&config.market_config_path).unwrap();
//! ```
use std::path::Path;

use figment::{
    providers::{
        Env,
        Format as _,
        Json,
    },
    Figment,
};
use serde::{
    de::DeserializeOwned,
    Serialize,
};


#[cfg(feature = "tests")]
pub use tests::{
    config_should_reject_unknown_var,
    example_env_config_is_up_to_date,
    example_file_config_is_valid,
};

/// Utility function to get a config without having to import the `Config` trait.
///
/// # Errors
/// Returns an error if the environment does not contain a valid config of type `T`.
pub fn get<T: Config>() -> Result<T, figment::Error> {
    T::get()
}

/// Utility function to read a file config without having to import the `FileConfig` trait.
///
/// # Errors
/// Returns an error if `path` does not point to a JSON file holding a valid `T`.
pub fn read_file<T: FileConfig, P: AsRef<Path>>(path: P) -> Result<T, figment::Error> {
    T::read(path)
}

pub trait Config: Serialize + DeserializeOwned {
    const PREFIX: &'static str;

    /// Reads the config from environment variables starting with [`Self::PREFIX`].
    ///
    /// # Errors
    /// Returns an error if a variable is missing, cannot be parsed, or if an unknown variable
    /// with the prefix is set and the config denies unknown fields.
    fn get() -> Result<Self, figment::Error> {
        Self::get_with_prefix(Self::PREFIX, _internal::Internal)
    }

    #[doc(hidden)]
    fn get_with_prefix(
        prefix: &str,
        _internal: _internal::Internal,
    ) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Env::prefixed(prefix))
            .merge(Env::prefixed("RUST_").split("_").only(&["log"]))
            .extract()
    }
}

/// A config read from a JSON file.
pub trait FileConfig: DeserializeOwned {
    /// Reads the config from the JSON file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file does not exist, is not valid JSON, or does not match
    /// `Self`.
    fn read<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(figment::Error::from(format!(
                "config file `{}` does not exist or is not a file",
                path.display()
            )));
        }
        Figment::from(Json::file(path)).extract()
    }
}

mod _internal {
    pub struct Internal;
}

#[cfg(test)]
mod unit_tests {
    use figment::Jail;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct TestConfig {
        log: String,
        staleness_window_ms: u64,
    }

    impl Config for TestConfig {
        const PREFIX: &'static str = "TEST_PRICE_FEED_";
    }

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct TestMarkets {
        pairs: Vec<String>,
        #[serde(default)]
        min_sources: u32,
    }

    impl FileConfig for TestMarkets {}

    #[test]
    fn config_is_read_from_prefixed_env_vars() {
        Jail::expect_with(|jail| {
            jail.set_env("TEST_PRICE_FEED_LOG", "debug");
            jail.set_env("TEST_PRICE_FEED_STALENESS_WINDOW_MS", "1500");
            let config: TestConfig = get()?;
            assert_eq!(1500, config.staleness_window_ms);
            Ok(())
        });
    }

    #[test]
    fn rust_log_takes_precedence() {
        Jail::expect_with(|jail| {
            jail.set_env("TEST_PRICE_FEED_LOG", "debug");
            jail.set_env("TEST_PRICE_FEED_STALENESS_WINDOW_MS", "1500");
            jail.set_env("RUST_LOG", "warn");
            let config: TestConfig = get()?;
            assert_eq!("warn", config.log);
            Ok(())
        });
    }

    #[test]
    fn file_config_is_read_from_json() {
        Jail::expect_with(|jail| {
            jail.create_file("markets.json", r#"{"pairs": ["BTC/USD", "ETH/USD"]}"#)?;
            let markets: TestMarkets = read_file("markets.json")?;
            assert_eq!(
                TestMarkets {
                    pairs: vec!["BTC/USD".to_string(), "ETH/USD".to_string()],
                    min_sources: 0,
                },
                markets
            );
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_an_error() {
        Jail::expect_with(|_| {
            read_file::<TestMarkets, _>("markets.json").unwrap_err();
            Ok(())
        });
    }

    #[test]
    fn unknown_field_in_file_is_an_error() {
        Jail::expect_with(|jail| {
            jail.create_file("markets.json", r#"{"pairs": [], "venues": []}"#)?;
            read_file::<TestMarkets, _>("markets.json").unwrap_err();
            Ok(())
        });
    }
}
