pub mod feed;
pub mod live;
pub mod paper;

pub use feed::{FixedFeed, HyperliquidFeed, MarketFeed};
pub use live::LiveSpotAdapter;
pub use paper::PaperSpotAdapter;
