//! Httpcap - In-process capture store for HTTP transactions
//!
//! Backs in-app network debugging overlays: producers admit requests and
//! attach responses from any thread, consumers read consistent snapshots.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod error;
pub mod registry;
pub mod store;
pub mod transaction;

pub use config::StoreConfig;
pub use error::{CaptureError, Result};
pub use registry::StoreRegistry;
pub use store::{StoreStats, TransactionStore};
pub use transaction::{
    RequestMetadata, ResponseMetadata, TransactionId, TransactionRecord, TransactionState,
};
