pub mod cache;
pub mod clock;
pub mod database;
pub mod storage;
