#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryPricesRequest {
    /// The currency pairs to return prices for. All known pairs if empty.
    #[prost(string, repeated, tag = "1")]
    pub currency_pairs: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
impl ::prost::Name for QueryPricesRequest {
    const NAME: &'static str = "QueryPricesRequest";
    const PACKAGE: &'static str = "price_feed.service.v1";
    fn full_name() -> ::prost::alloc::string::String {
        ::prost::alloc::format!("price_feed.service.v1.{}", Self::NAME)
    }
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryPricesResponse {
    /// Maps a canonical currency pair `BASE/QUOTE` to the decimal string of its price.
    #[prost(btree_map = "string, string", tag = "1")]
    pub prices: ::prost::alloc::collections::BTreeMap<
        ::prost::alloc::string::String,
        ::prost::alloc::string::String,
    >,
    #[prost(message, optional, tag = "2")]
    pub timestamp: ::core::option::Option<::pbjson_types::Timestamp>,
    #[prost(string, tag = "3")]
    pub version: ::prost::alloc::string::String,
}
impl ::prost::Name for QueryPricesResponse {
    const NAME: &'static str = "QueryPricesResponse";
    const PACKAGE: &'static str = "price_feed.service.v1";
    fn full_name() -> ::prost::alloc::string::String {
        ::prost::alloc::format!("price_feed.service.v1.{}", Self::NAME)
    }
}
