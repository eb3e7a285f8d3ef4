pub mod action_queue;
pub mod content_visibility;
pub mod feed_synchronizer;
pub mod optimistic_mutator;
pub mod realtime_reconciler;
pub mod refresh_target;
pub mod visibility_monitor;

pub use action_queue::ActionQueue;
pub use content_visibility::{AuthorTier, ContentVisibilityPolicy};
pub use feed_synchronizer::{
    FeedConfig, FeedEvent, FeedPhase, FeedSynchronizer, LoadMoreOutcome, LoadOutcome, LoadSource,
    RefreshOutcome,
};
pub use optimistic_mutator::{
    LocalUpdate, MutationTarget, OptimisticMutator, PendingMutation, Settlement,
};
pub use realtime_reconciler::{RealtimeReconciler, ReconcilerHandle, ReconcilerMode};
pub use refresh_target::RefreshTarget;
pub use visibility_monitor::{ResumeDecision, VisibilityMonitor};
