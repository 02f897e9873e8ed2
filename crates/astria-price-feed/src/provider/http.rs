//! A venue-agnostic provider polling a JSON-over-HTTP endpoint once per pair.
//!
//! For a template `https://api.coinbase.com/v2/prices/{base}-{quote}/spot` and the pointer
//! `/data/amount`, fetching `BTC/USD` issues
//! `GET https://api.coinbase.com/v2/prices/BTC-USD/spot` and reads the price from
//! `{"data": {"amount": "67000.12"}}`.
use std::sync::Arc;

use astria_eyre::eyre::{
    self,
    bail,
    eyre,
    WrapErr as _,
};
use astria_price_feed_core::types::{
    CurrencyPair,
    Price,
};
use async_trait::async_trait;
use tracing::{
    instrument,
    warn,
};

use super::{
    PollingProvider,
    PriceObservation,
};
use crate::config::HttpProviderSettings;

pub struct HttpJsonProvider {
    name: Arc<str>,
    client: reqwest::Client,
    url_template: String,
    price_pointer: String,
}

impl HttpJsonProvider {
    /// Constructs a provider from its settings.
    ///
    /// # Errors
    /// Returns an error if the HTTP client could not be constructed.
    pub fn new(settings: &HttpProviderSettings) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("astria-price-feed/", env!("CARGO_PKG_VERSION")))
            .build()
            .wrap_err("failed to construct http client")?;
        Ok(Self {
            name: settings.name.clone(),
            client,
            url_template: settings.url_template.clone(),
            price_pointer: settings.price_pointer.clone(),
        })
    }

    fn url_for(&self, pair: &CurrencyPair) -> String {
        self.url_template
            .replace("{base}", pair.base())
            .replace("{quote}", pair.quote())
    }

    async fn fetch_one(&self, pair: &CurrencyPair) -> eyre::Result<Price> {
        let url = self.url_for(pair);
        let body: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await
            .wrap_err_with(|| format!("failed sending request to `{url}`"))?
            .error_for_status()
            .wrap_err("venue responded with error status")?
            .json()
            .await
            .wrap_err("failed reading response body as json")?;
        let value = body
            .pointer(&self.price_pointer)
            .ok_or_else(|| eyre!("response has no value at `{}`", self.price_pointer))?;
        price_from_json(value)
    }
}

fn price_from_json(value: &serde_json::Value) -> eyre::Result<Price> {
    let price = match value {
        serde_json::Value::String(s) => s.parse::<Price>(),
        serde_json::Value::Number(n) => n.to_string().parse::<Price>(),
        other => bail!("expected price to be a string or number, got `{other}`"),
    };
    price.wrap_err("failed parsing price")
}

#[async_trait]
impl PollingProvider for HttpJsonProvider {
    fn name(&self) -> Arc<str> {
        self.name.clone()
    }

    #[instrument(skip_all, fields(provider = %self.name), err)]
    async fn fetch(&self, pairs: &[CurrencyPair]) -> eyre::Result<Vec<PriceObservation>> {
        let mut observations = Vec::with_capacity(pairs.len());
        let mut last_error = None;
        for pair in pairs {
            match self.fetch_one(pair).await {
                Ok(price) => observations.push(PriceObservation::now(
                    self.name.clone(),
                    pair.clone(),
                    price,
                )),
                Err(error) => {
                    warn!(%pair, %error, "failed fetching price; skipping pair");
                    last_error = Some(error);
                }
            }
        }
        match last_error {
            Some(error) if observations.is_empty() => {
                Err(error).wrap_err("failed fetching prices for all pairs")
            }
            _ => Ok(observations),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::{
        matchers::{
            method,
            path,
        },
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    fn provider(server: &MockServer) -> HttpJsonProvider {
        HttpJsonProvider::new(&HttpProviderSettings {
            name: "coinbase".into(),
            url_template: format!("{}/v2/prices/{{base}}-{{quote}}/spot", server.uri()),
            price_pointer: "/data/amount".to_string(),
            interval: Duration::from_secs(1),
            request_timeout: Duration::from_millis(500),
            pairs: vec![],
        })
        .unwrap()
    }

    fn pair(s: &str) -> CurrencyPair {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn price_is_read_from_pointer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/prices/BTC-USD/spot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"base": "BTC", "currency": "USD", "amount": "67000.12"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let observations = provider(&server).fetch(&[pair("BTC/USD")]).await.unwrap();
        assert_eq!(1, observations.len());
        assert_eq!(pair("BTC/USD"), observations[0].pair);
        assert_eq!("67000.12".parse::<Price>().unwrap(), observations[0].price);
        assert_eq!("coinbase", &*observations[0].source);
    }

    #[tokio::test]
    async fn numeric_prices_are_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/prices/ETH-USD/spot"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": {"amount": 3100.5}})),
            )
            .mount(&server)
            .await;

        let observations = provider(&server).fetch(&[pair("ETH/USD")]).await.unwrap();
        assert_eq!("3100.5".parse::<Price>().unwrap(), observations[0].price);
    }

    #[tokio::test]
    async fn failing_pairs_are_skipped_if_others_succeed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/prices/BTC-USD/spot"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": {"amount": "1"}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/prices/DOGE-USD/spot"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let observations = provider(&server)
            .fetch(&[pair("BTC/USD"), pair("DOGE/USD")])
            .await
            .unwrap();
        assert_eq!(1, observations.len());
        assert_eq!(pair("BTC/USD"), observations[0].pair);
    }

    #[tokio::test]
    async fn fetch_fails_if_every_pair_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        provider(&server)
            .fetch(&[pair("BTC/USD"), pair("ETH/USD")])
            .await
            .unwrap_err();
    }

    #[tokio::test]
    async fn negative_price_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": {"amount": "-5"}})),
            )
            .mount(&server)
            .await;

        provider(&server).fetch(&[pair("BTC/USD")]).await.unwrap_err();
    }

    #[test]
    fn non_scalar_price_is_rejected() {
        price_from_json(&serde_json::json!({"amount": "1"})).unwrap_err();
        price_from_json(&serde_json::json!(null)).unwrap_err();
    }
}
