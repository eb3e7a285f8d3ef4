pub mod push;
pub mod remote;

pub use push::*;
pub use remote::*;
