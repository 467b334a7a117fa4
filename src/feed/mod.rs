//! Market data feed: CoinGecko client and polling service

pub mod client;
pub mod poller;
pub mod types;

pub use client::{FeedClient, DEFAULT_FEED_BASE_URL};
pub use poller::{start_price_poller, FeedView, PriceFeedHandle};
pub use types::{Candle, PriceSnapshot};
