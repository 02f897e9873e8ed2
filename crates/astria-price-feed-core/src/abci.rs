use std::collections::BTreeMap;

use bytes::Bytes;
use prost::Message as _;

use crate::{
    generated::price_feed::abci::v1 as raw,
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
pub struct OracleVoteExtensionError(OracleVoteExtensionErrorKind);

impl OracleVoteExtensionError {
    /// Returns `true` if the bytes could not be decoded as protobuf at all.
    #[must_use]
    pub fn is_decode(&self) -> bool {
        matches!(self.0, OracleVoteExtensionErrorKind::Decode(_))
    }

    /// Returns `true` if the extension contained a negative price.
    #[must_use]
    pub fn is_negative_price(&self) -> bool {
        matches!(
            &self.0,
            OracleVoteExtensionErrorKind::ParsePrice { source, .. } if source.is_negative()
        )
    }

    /// Returns `true` if a currency pair key was not spelled canonically.
    #[must_use]
    pub fn is_non_canonical_pair(&self) -> bool {
        matches!(
            self.0,
            OracleVoteExtensionErrorKind::NonCanonicalCurrencyPair { .. }
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed validating wire type `{}`", raw::OracleVoteExtension::full_name())]
enum OracleVoteExtensionErrorKind {
    #[error("failed decoding bytes as protobuf message")]
    Decode(#[source] prost::DecodeError),
    #[error("failed to parse key `{input}` in `.prices` field as currency pair")]
    ParseCurrencyPair {
        input: String,
        source: CurrencyPairParseError,
    },
    #[error("key `{input}` in `.prices` field is not canonical; expected `{canonical}`")]
    NonCanonicalCurrencyPair { input: String, canonical: String },
    #[error("failed to parse value `{input}` in `.prices` field at key `{key}` as price")]
    ParsePrice {
        input: String,
        key: String,
        source: ParsePriceError,
    },
}

/// The prices a validator attaches to its precommit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleVoteExtension {
    pub prices: BTreeMap<CurrencyPair, Price>,
}

impl OracleVoteExtension {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decodes and validates a vote extension from its protobuf encoding.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a protobuf encoded
    /// [`raw::OracleVoteExtension`], or if that fails validation per
    /// [`OracleVoteExtension::try_from_raw`].
    pub fn decode(bytes: &[u8]) -> Result<Self, OracleVoteExtensionError> {
        let raw = raw::OracleVoteExtension::decode(bytes).map_err(|source| {
            OracleVoteExtensionError(OracleVoteExtensionErrorKind::Decode(source))
        })?;
        Self::try_from_raw(raw)
    }

    /// Encodes the vote extension as protobuf.
    ///
    /// The encoding is deterministic: entries are written in the order of their canonical keys.
    #[must_use]
    pub fn encode_to_bytes(&self) -> Bytes {
        self.to_raw().encode_to_vec().into()
    }
}

impl Protobuf for OracleVoteExtension {
    type Error = OracleVoteExtensionError;
    type Raw = raw::OracleVoteExtension;

    /// Converts an on-wire [`raw::OracleVoteExtension`] to a validated domain type.
    ///
    /// # Errors
    /// Returns an error if:
    /// - A key in the `.prices` map could not be parsed as a [`CurrencyPair`].
    /// - A key in the `.prices` map is not the canonical spelling of its pair.
    /// - A value in the `.prices` map could not be parsed as a non-negative [`Price`].
    fn try_from_raw_ref(raw: &Self::Raw) -> Result<Self, Self::Error> {
        let prices = raw
            .prices
            .iter()
            .map(|(key, value)| {
                let pair: CurrencyPair = key.parse().map_err(|source| {
                    OracleVoteExtensionErrorKind::ParseCurrencyPair {
                        input: key.clone(),
                        source,
                    }
                })?;
                if !pair.is_canonical_encoding_of(key) {
                    return Err(OracleVoteExtensionErrorKind::NonCanonicalCurrencyPair {
                        input: key.clone(),
                        canonical: pair.to_string(),
                    });
                }
                let price = value.parse().map_err(|source| {
                    OracleVoteExtensionErrorKind::ParsePrice {
                        input: value.clone(),
                        key: key.clone(),
                        source,
                    }
                })?;
                Ok((pair, price))
            })
            .collect::<Result<_, _>>()
            .map_err(OracleVoteExtensionError)?;
        Ok(Self {
            prices,
        })
    }

    fn to_raw(&self) -> Self::Raw {
        raw::OracleVoteExtension {
            prices: self
                .prices
                .iter()
                .map(|(pair, price)| (pair.to_string(), price.to_string()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_extension<'a, I: IntoIterator<Item = (&'a str, &'a str)>>(
        entries: I,
    ) -> raw::OracleVoteExtension {
        raw::OracleVoteExtension {
            prices: entries
                .into_iter()
                .map(|(pair, price)| (pair.to_string(), price.to_string()))
                .collect(),
        }
    }

    #[test]
    fn valid_extension_is_accepted() {
        let extension = OracleVoteExtension::try_from_raw(raw_extension([
            ("BTC/USD", "67000.25"),
            ("ETH/USD", "3100"),
        ]))
        .unwrap();
        assert_eq!(2, extension.prices.len());
        assert_eq!(
            "67000.25".parse::<Price>().unwrap(),
            extension.prices[&"BTC/USD".parse::<CurrencyPair>().unwrap()],
        );
    }

    #[test]
    fn lower_case_pair_is_rejected_as_non_canonical() {
        let err = OracleVoteExtension::try_from_raw(raw_extension([("btc/usd", "1")]))
            .unwrap_err();
        assert!(err.is_non_canonical_pair(), "{err:?}");
    }

    #[test]
    fn negative_price_is_rejected() {
        let err = OracleVoteExtension::try_from_raw(raw_extension([("BTC/USD", "-1")]))
            .unwrap_err();
        assert!(err.is_negative_price(), "{err:?}");
    }

    #[test]
    fn unparsable_price_is_rejected() {
        let err = OracleVoteExtension::try_from_raw(raw_extension([("BTC/USD", "one")]))
            .unwrap_err();
        assert!(!err.is_negative_price());
        assert!(!err.is_decode());
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = OracleVoteExtension::decode(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(err.is_decode(), "{err:?}");
    }

    #[test]
    fn encoding_is_independent_of_insertion_order() {
        let btc: CurrencyPair = "BTC/USD".parse().unwrap();
        let eth: CurrencyPair = "ETH/USD".parse().unwrap();
        let one: Price = "1".parse().unwrap();
        let two: Price = "2".parse().unwrap();

        let mut first = OracleVoteExtension::empty();
        first.prices.insert(btc.clone(), one);
        first.prices.insert(eth.clone(), two);
        let mut second = OracleVoteExtension::empty();
        second.prices.insert(eth, two);
        second.prices.insert(btc, one);

        assert_eq!(first.encode_to_bytes(), second.encode_to_bytes());
        assert_eq!(first, OracleVoteExtension::decode(&first.encode_to_bytes()).unwrap());
    }

    #[test]
    fn empty_bytes_are_an_empty_extension() {
        assert_eq!(
            OracleVoteExtension::empty(),
            OracleVoteExtension::decode(&[]).unwrap()
        );
    }
}
