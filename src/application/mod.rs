pub mod ports;
pub mod services;

pub use services::{
    ActionQueue, ContentVisibilityPolicy, FeedSynchronizer, OptimisticMutator, RealtimeReconciler,
    VisibilityMonitor,
};
