pub mod helper;
mod price_feed;
