/// The prices a validator observed locally, attached to its precommit as a vote extension.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OracleVoteExtension {
    /// Maps a canonical currency pair `BASE/QUOTE` to the decimal string of its price.
    #[prost(btree_map = "string, string", tag = "1")]
    pub prices: ::prost::alloc::collections::BTreeMap<
        ::prost::alloc::string::String,
        ::prost::alloc::string::String,
    >,
}
impl ::prost::Name for OracleVoteExtension {
    const NAME: &'static str = "OracleVoteExtension";
    const PACKAGE: &'static str = "price_feed.abci.v1";
    fn full_name() -> ::prost::alloc::string::String {
        ::prost::alloc::format!("price_feed.abci.v1.{}", Self::NAME)
    }
}
