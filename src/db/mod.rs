//! Database access: pool construction with occupancy tracking, and the
//! request store with per-query timing.

pub mod pool;
pub mod store;

pub use pool::{connect, connect_with};
pub use store::{RequestRecord, RequestStore};
