//! Concurrent capture store for HTTP transactions

mod capture;
mod filter;

pub use capture::{StoreStats, TransactionStore};
pub use filter::UrlFilter;

/// Default number of retained transactions
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default per-body snapshot limit (1 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;
