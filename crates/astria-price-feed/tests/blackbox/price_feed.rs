use std::time::Duration;

use astria_price_feed::{
    config::Leg,
    OracleService as _,
};
use astria_price_feed_core::service::QueryPricesRequest;
use wiremock::{
    matchers::{
        method,
        path,
    },
    Mock,
    MockServer,
    ResponseTemplate,
};

use crate::helper::{
    http_provider,
    market,
    pair,
    price,
    settings,
    spawn_http_price_feed,
    spawn_price_feed,
    Broken,
    ChangingSource,
    FixedPrices,
};

#[tokio::test]
async fn median_of_all_providers_is_served() {
    let test_price_feed = spawn_price_feed(
        settings(vec![market("BTC/USD"), market("ETH/USD")], 2),
        vec![
            FixedPrices::spec("a", &[("BTC/USD", "67000"), ("ETH/USD", "3000")]),
            FixedPrices::spec("b", &[("BTC/USD", "67100"), ("ETH/USD", "3010")]),
            FixedPrices::spec("c", &[("BTC/USD", "69000")]),
        ],
    );

    let prices = test_price_feed.wait_for_prices(&["BTC/USD", "ETH/USD"]).await;
    assert_eq!(price("67100"), prices[&pair("BTC/USD")]);
    assert_eq!(price("3005"), prices[&pair("ETH/USD")]);
}

#[tokio::test]
async fn broken_provider_does_not_block_the_others() {
    let test_price_feed = spawn_price_feed(
        settings(vec![market("BTC/USD")], 2),
        vec![
            Broken::spec("down", &["BTC/USD"]),
            FixedPrices::spec("a", &[("BTC/USD", "100")]),
            FixedPrices::spec("b", &[("BTC/USD", "102")]),
        ],
    );

    let prices = test_price_feed.wait_for_prices(&["BTC/USD"]).await;
    assert_eq!(price("101"), prices[&pair("BTC/USD")]);

    let status = test_price_feed.oracle.status().await;
    let down = status.iter().find(|status| status.name == "down").unwrap();
    assert!(!down.is_healthy());
    assert!(down.consecutive_failures > 0);
}

#[tokio::test]
async fn a_provider_counts_once_under_its_registered_name() {
    let test_price_feed = spawn_price_feed(
        settings(vec![market("BTC/USD")], 2),
        vec![ChangingSource::spec("a", "BTC/USD", &[("x", "100"), ("y", "200")])],
    );

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let status = test_price_feed.oracle.status().await;
            if status.iter().any(|status| status.health == "failed") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("provider should have been marked failed");

    let response = test_price_feed
        .oracle
        .prices(QueryPricesRequest {
            currency_pairs: vec![pair("BTC/USD")],
        })
        .await
        .unwrap();
    assert!(response.prices.is_empty());
}

#[tokio::test]
async fn markets_with_too_few_providers_are_not_served() {
    let test_price_feed = spawn_price_feed(
        settings(vec![market("BTC/USD"), market("ETH/USD")], 2),
        vec![
            FixedPrices::spec("a", &[("BTC/USD", "100"), ("ETH/USD", "10")]),
            FixedPrices::spec("b", &[("BTC/USD", "102")]),
        ],
    );

    test_price_feed.wait_for_prices(&["BTC/USD"]).await;
    let response = test_price_feed
        .oracle
        .prices(QueryPricesRequest {
            currency_pairs: vec![],
        })
        .await
        .unwrap();
    assert_eq!(
        vec![pair("BTC/USD")],
        response.prices.keys().cloned().collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn cross_rates_are_derived_from_conversion_paths() {
    let mut eth_usd = market("ETH/USD");
    eth_usd.conversion_paths = vec![vec![
        Leg {
            pair: pair("ETH/BTC"),
            invert: false,
        },
        Leg {
            pair: pair("BTC/USD"),
            invert: false,
        },
    ]];
    let test_price_feed = spawn_price_feed(
        settings(vec![eth_usd], 1),
        vec![FixedPrices::spec("a", &[("ETH/BTC", "0.05"), ("BTC/USD", "60000")])],
    );

    let prices = test_price_feed.wait_for_prices(&["ETH/USD"]).await;
    assert_eq!(price("3000"), prices[&pair("ETH/USD")]);
}

#[tokio::test]
async fn shutdown_handle_stops_the_price_feed() {
    let test_price_feed = spawn_price_feed(
        settings(vec![market("BTC/USD")], 1),
        vec![FixedPrices::spec("a", &[("BTC/USD", "1")])],
    );
    test_price_feed.wait_for_prices(&["BTC/USD"]).await;

    test_price_feed.shutdown.shutdown();
    tokio::time::timeout(Duration::from_secs(5), test_price_feed.task)
        .await
        .expect("price feed should shut down within its grace period")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn prices_are_polled_from_http_venues() {
    let coinbase = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/prices/BTC-USD/spot"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"data": {"amount": "67000.5"}})),
        )
        .mount(&coinbase)
        .await;
    let other = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/prices/BTC-USD/spot"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"data": {"amount": 67001.5}})),
        )
        .mount(&other)
        .await;

    let mut settings = settings(vec![market("BTC/USD")], 2);
    settings.http_providers = vec![
        http_provider(
            "coinbase",
            format!("{}/v2/prices/{{base}}-{{quote}}/spot", coinbase.uri()),
            vec![pair("BTC/USD")],
        ),
        http_provider(
            "other",
            format!("{}/v2/prices/{{base}}-{{quote}}/spot", other.uri()),
            vec![pair("BTC/USD")],
        ),
    ];
    let test_price_feed = spawn_http_price_feed(settings);

    let prices = test_price_feed.wait_for_prices(&["BTC/USD"]).await;
    assert_eq!(price("67001"), prices[&pair("BTC/USD")]);
}
