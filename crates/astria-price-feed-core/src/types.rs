use std::{
    fmt::{
        self,
        Display,
    },
    str::FromStr,
    sync::OnceLock,
};

use regex::Regex;
use rust_decimal::Decimal;

fn symbol_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("valid regex"))
}

/// Returns the upper-cased `input` if it is a non-empty run of ascii alphanumerics.
fn parse_symbol(input: &str) -> Option<String> {
    symbol_regex()
        .is_match(input)
        .then(|| input.to_ascii_uppercase())
}

/// The base asset of a [`CurrencyPair`], always upper case.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Base(String);

impl Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error(
    "failed to parse input `{input}` as base part of currency pair; only ascii alphanumeric \
     characters are permitted"
)]
pub struct ParseBaseError {
    input: String,
}

impl FromStr for Base {
    type Err = ParseBaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_symbol(s).map(Self).ok_or_else(|| Self::Err {
            input: s.to_string(),
        })
    }
}

/// The quote asset of a [`CurrencyPair`], always upper case.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quote(String);

impl Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error(
    "failed to parse input `{input}` as quote part of currency pair; only ascii alphanumeric \
     characters are permitted"
)]
pub struct ParseQuoteError {
    input: String,
}

impl FromStr for Quote {
    type Err = ParseQuoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_symbol(s).map(Self).ok_or_else(|| Self::Err {
            input: s.to_string(),
        })
    }
}

/// An ordered pair of assets, written `BASE/QUOTE`.
///
/// Parsing is case-insensitive; both parts are stored upper-cased, so that the [`Display`]
/// output is the one canonical spelling of a pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CurrencyPair {
    base: Base,
    quote: Quote,
}

impl CurrencyPair {
    #[must_use]
    pub fn from_parts(base: Base, quote: Quote) -> Self {
        Self {
            base,
            quote,
        }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base.0
    }

    #[must_use]
    pub fn quote(&self) -> &str {
        &self.quote.0
    }

    /// Returns `true` if `input` is exactly how this pair is displayed.
    #[must_use]
    pub fn is_canonical_encoding_of(&self, input: &str) -> bool {
        input
            .split_once('/')
            .is_some_and(|(base, quote)| base == self.base() && quote == self.quote())
    }
}

impl Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = CurrencyPairParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((base_str, quote_str)) = s.split_once('/') else {
            return Err(CurrencyPairParseError::invalid_currency_pair_string(s));
        };

        let base = base_str
            .parse()
            .map_err(CurrencyPairParseError::parse_base)?;
        let quote = quote_str
            .parse()
            .map_err(CurrencyPairParseError::parse_quote)?;

        Ok(Self {
            base,
            quote,
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct CurrencyPairParseError(CurrencyPairParseErrorKind);

#[derive(Debug, thiserror::Error)]
enum CurrencyPairParseErrorKind {
    #[error("invalid currency pair string `{0}`; expected `BASE/QUOTE`")]
    InvalidCurrencyPairString(String),
    #[error(transparent)]
    ParseBase { source: ParseBaseError },
    #[error(transparent)]
    ParseQuote { source: ParseQuoteError },
}

impl CurrencyPairParseError {
    fn invalid_currency_pair_string(s: &str) -> Self {
        Self(CurrencyPairParseErrorKind::InvalidCurrencyPairString(
            s.to_string(),
        ))
    }

    fn parse_base(source: ParseBaseError) -> Self {
        Self(CurrencyPairParseErrorKind::ParseBase {
            source,
        })
    }

    fn parse_quote(source: ParseQuoteError) -> Self {
        Self(CurrencyPairParseErrorKind::ParseQuote {
            source,
        })
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for CurrencyPair {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for CurrencyPair {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A non-negative decimal price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Constructs a price from a decimal value.
    ///
    /// # Errors
    /// Returns an error if `value` is negative.
    pub fn try_new(value: Decimal) -> Result<Self, NegativePriceError> {
        if value.is_zero() {
            return Ok(Self::ZERO);
        }
        if value.is_sign_negative() {
            return Err(NegativePriceError {
                value,
            });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn get(self) -> Decimal {
        self.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    #[must_use]
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        self.0.checked_mul(rhs.0).map(Self)
    }

    #[must_use]
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        self.0.checked_div(rhs.0).map(Self)
    }

    /// Returns `1 / self`, or `None` if `self` is zero.
    #[must_use]
    pub fn checked_inverse(self) -> Option<Self> {
        Decimal::ONE.checked_div(self.0).map(Self)
    }

    /// Returns the mean of `self` and `other`.
    ///
    /// Computed as `low + (high - low) / 2`, which cannot overflow.
    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        let (low, high) = if self <= other {
            (self.0, other.0)
        } else {
            (other.0, self.0)
        };
        let half_distance = (high - low) / Decimal::TWO;
        Self(low.checked_add(half_distance).unwrap_or(high))
    }
}

impl Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.normalize().fmt(f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("price must not be negative, but got `{value}`")]
pub struct NegativePriceError {
    value: Decimal,
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ParsePriceError(ParsePriceErrorKind);

impl ParsePriceError {
    /// Returns `true` if the input was a valid decimal, but negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        matches!(self.0, ParsePriceErrorKind::Negative(_))
    }
}

#[derive(Debug, thiserror::Error)]
enum ParsePriceErrorKind {
    #[error("failed to parse input as decimal")]
    Decimal(#[source] rust_decimal::Error),
    #[error(transparent)]
    Negative(NegativePriceError),
}

impl FromStr for Price {
    type Err = ParsePriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str_exact(s)
            .or_else(|_| Decimal::from_scientific(s))
            .map_err(|source| ParsePriceError(ParsePriceErrorKind::Decimal(source)))?;
        Self::try_new(value).map_err(|source| ParsePriceError(ParsePriceErrorKind::Negative(source)))
    }
}

impl TryFrom<Decimal> for Price {
    type Error = NegativePriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

/// The 20 byte consensus address of a validator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValidatorAddress([u8; ValidatorAddress::LENGTH]);

impl ValidatorAddress {
    pub const LENGTH: usize = 20;

    #[must_use]
    pub const fn new(bytes: [u8; Self::LENGTH]) -> Self {
        Self(bytes)
    }

    /// Constructs an address from a byte slice.
    ///
    /// # Errors
    /// Returns an error if `bytes` is not exactly [`ValidatorAddress::LENGTH`] long.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, ValidatorAddressError> {
        <[u8; Self::LENGTH]>::try_from(bytes)
            .map(Self)
            .map_err(|_| ValidatorAddressError::incorrect_length(bytes.len()))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }
}

impl Display for ValidatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for ValidatorAddress {
    type Err = ValidatorAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(ValidatorAddressError::hex)?;
        Self::try_from_slice(&bytes)
    }
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ValidatorAddressError(ValidatorAddressErrorKind);

impl ValidatorAddressError {
    fn incorrect_length(received: usize) -> Self {
        Self(ValidatorAddressErrorKind::IncorrectLength {
            received,
        })
    }

    fn hex(source: hex::FromHexError) -> Self {
        Self(ValidatorAddressErrorKind::Hex(source))
    }
}

#[derive(Debug, thiserror::Error)]
enum ValidatorAddressErrorKind {
    #[error("expected {} bytes, got {received}", ValidatorAddress::LENGTH)]
    IncorrectLength { received: usize },
    #[error("input is not valid hex")]
    Hex(#[source] hex::FromHexError),
}

/// The stake of a validator in the active set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VotingPower(u64);

impl VotingPower {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Display for VotingPower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for VotingPower {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
