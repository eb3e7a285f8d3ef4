pub mod clock;
pub mod connection_checker;
pub mod key_value_store;
pub mod push_channel;
pub mod remote_source;
pub mod session_refresher;

pub use clock::Clock;
pub use connection_checker::ConnectionChecker;
pub use key_value_store::KeyValueStore;
pub use push_channel::{ChangeEvent, ChangeKind, PushChannel, PushSignal, PushSubscription};
pub use remote_source::{MutationAction, RemoteDataSource};
pub use session_refresher::SessionRefresher;
