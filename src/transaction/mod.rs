//! Captured HTTP transactions

mod id;
mod record;

pub use id::{TransactionId, ID_LEN};
pub use record::{Body, RequestMetadata, ResponseMetadata, TransactionRecord, TransactionState};
