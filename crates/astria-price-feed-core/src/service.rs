use std::collections::BTreeMap;

use crate::{
    generated::price_feed::service::v1 as raw,
    types::{
        CurrencyPair,
        CurrencyPairParseError,
        ParsePriceError,
        Price,
    },
    Protobuf,
};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct QueryPricesRequestError(QueryPricesRequestErrorKind);

#[derive(Debug, thiserror::Error)]
#[error("failed validating wire type `{}`", raw::QueryPricesRequest::full_name())]
enum QueryPricesRequestErrorKind {
    #[error("failed to parse entry `{input}` in `.currency_pairs` field as currency pair")]
    ParseCurrencyPair {
        input: String,
        source: CurrencyPairParseError,
    },
}

/// A request for the latest prices of `currency_pairs`, or of all pairs if it is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPricesRequest {
    pub currency_pairs: Vec<CurrencyPair>,
}

impl Protobuf for QueryPricesRequest {
    type Error = QueryPricesRequestError;
    type Raw = raw::QueryPricesRequest;

    fn try_from_raw_ref(raw: &Self::Raw) -> Result<Self, Self::Error> {
        let currency_pairs = raw
            .currency_pairs
            .iter()
            .map(|input| {
                input
                    .parse()
                    .map_err(|source| QueryPricesRequestErrorKind::ParseCurrencyPair {
                        input: input.clone(),
                        source,
                    })
            })
            .collect::<Result<_, _>>()
            .map_err(QueryPricesRequestError)?;
        Ok(Self {
            currency_pairs,
        })
    }

    fn to_raw(&self) -> Self::Raw {
        raw::QueryPricesRequest {
            currency_pairs: self
                .currency_pairs
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct QueryPricesResponseError(QueryPricesResponseErrorKind);

#[derive(Debug, thiserror::Error)]
#[error("failed validating wire type `{}`", raw::QueryPricesResponse::full_name())]
enum QueryPricesResponseErrorKind {
    #[error("failed to parse key `{input}` in `.prices` field as currency pair")]
    ParseCurrencyPair {
        input: String,
        source: CurrencyPairParseError,
    },
    #[error("failed to parse value `{input}` in `.prices` field at key `{key}` as price")]
    ParsePrice {
        input: String,
        key: String,
        source: ParsePriceError,
    },
}

/// The prices the sidecar currently considers fresh.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPricesResponse {
    pub prices: BTreeMap<CurrencyPair, Price>,
    pub timestamp: Option<pbjson_types::Timestamp>,
    pub version: String,
}

impl Protobuf for QueryPricesResponse {
    type Error = QueryPricesResponseError;
    type Raw = raw::QueryPricesResponse;

    /// Converts the on-wire [`raw::QueryPricesResponse`] to a validated domain type
    /// [`QueryPricesResponse`].
    ///
    /// # Errors
    /// Returns an error if:
    /// - A key in the `.prices` map could not be parsed as a [`CurrencyPair`].
    /// - A value in the `.prices` map could not be parsed as a [`Price`].
    fn try_from_raw_ref(raw: &Self::Raw) -> Result<Self, Self::Error> {
        let raw::QueryPricesResponse {
            prices,
            timestamp,
            version,
        } = raw;
        let prices = prices
            .iter()
            .map(|(key, value)| {
                let currency_pair = key.parse().map_err(|source| {
                    QueryPricesResponseErrorKind::ParseCurrencyPair {
                        input: key.clone(),
                        source,
                    }
                })?;
                let price = value.parse().map_err(|source| {
                    QueryPricesResponseErrorKind::ParsePrice {
                        input: value.clone(),
                        key: key.clone(),
                        source,
                    }
                })?;
                Ok((currency_pair, price))
            })
            .collect::<Result<_, _>>()
            .map_err(QueryPricesResponseError)?;
        Ok(Self {
            prices,
            timestamp: timestamp.clone(),
            version: version.clone(),
        })
    }

    fn to_raw(&self) -> Self::Raw {
        raw::QueryPricesResponse {
            prices: self
                .prices
                .iter()
                .map(|(pair, price)| (pair.to_string(), price.to_string()))
                .collect(),
            timestamp: self.timestamp.clone(),
            version: self.version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_with_unparsable_price_is_rejected() {
        let raw = raw::QueryPricesResponse {
            prices: [("BTC/USD".to_string(), "a lot".to_string())]
                .into_iter()
                .collect(),
            timestamp: None,
            version: "0.1.0".to_string(),
        };
        let err = QueryPricesResponse::try_from_raw(raw).unwrap_err();
        assert!(err.to_string().contains("`a lot`"), "{err}");
    }

    #[test]
    fn request_pairs_are_canonicalized() {
        let raw = raw::QueryPricesRequest {
            currency_pairs: vec!["btc/usd".to_string()],
        };
        let request = QueryPricesRequest::try_from_raw(raw).unwrap();
        assert_eq!(
            vec!["BTC/USD".to_string()],
            request.into_raw().currency_pairs
        );
    }
}
