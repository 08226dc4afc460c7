//! Error types for httpcap

use thiserror::Error;

use crate::transaction::TransactionId;

/// Result type for httpcap operations
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Errors that can occur in httpcap
///
/// None of the store variants are faults: the boolean operations on
/// [`TransactionStore`](crate::store::TransactionStore) collapse them to `false`.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// A record with this id is already stored
    #[error("Duplicate transaction id: {0}")]
    DuplicateId(TransactionId),

    /// Admission refused by the URL filter
    #[error("Transaction {id} filtered out: {url}")]
    Filtered {
        /// Id of the refused record
        id: TransactionId,
        /// URL that did not pass the filter
        url: String,
    },

    /// No record with this id (never admitted, evicted, or removed)
    #[error("Unknown transaction id: {0}")]
    UnknownId(TransactionId),

    /// The record already completed or failed
    #[error("Transaction {0} already terminal")]
    AlreadyTerminal(TransactionId),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid store name
    #[error("Invalid store name: {0}")]
    InvalidStoreName(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}
