pub mod core;
pub mod status;

pub use self::core::FeedSynchronizer;
pub use status::{
    FeedConfig, FeedEvent, FeedPhase, LoadMoreOutcome, LoadOutcome, LoadSource, RefreshOutcome,
};

#[cfg(test)]
mod tests;
