#![allow(unreachable_pub, clippy::pedantic)]

/// Files generated using [`prost-build`] from the definitions under [`proto/price_feed`].
///
/// [`prost-build`]: https://docs.rs/prost-build
/// [`proto/price_feed`]: ../../../../proto/price_feed
#[path = ""]
pub mod price_feed {
    #[path = ""]
    pub mod abci {
        #[path = "price_feed.abci.v1.rs"]
        pub mod v1;
    }

    #[path = ""]
    pub mod service {
        #[path = "price_feed.service.v1.rs"]
        pub mod v1;
    }
}
