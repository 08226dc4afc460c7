//! Transaction identifiers

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::{CaptureError, Result};

/// Length of a transaction id in bytes
pub const ID_LEN: usize = 16;

/// Process-wide generation counter, mixed into every generated id
static GENERATION: AtomicU64 = AtomicU64::new(0);

/// Opaque identifier of one captured transaction
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId([u8; ID_LEN]);

impl TransactionId {
    /// Generate a fresh id for a request observed at `started_at`
    ///
    /// The id is a truncated SHA-256 over:
    /// 1. Method
    /// 2. URL
    /// 3. Start time (nanoseconds since the epoch)
    /// 4. Process-wide generation counter
    ///
    /// The counter keeps ids distinct for identical requests observed at the
    /// same instant.
    #[must_use]
    pub fn generate(method: &str, url: &str, started_at: SystemTime) -> Self {
        let mut hasher = Sha256::new();

        hasher.update((method.len() as u32).to_le_bytes());
        hasher.update(method.as_bytes());

        hasher.update((url.len() as u32).to_le_bytes());
        hasher.update(url.as_bytes());

        let nanos = started_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        hasher.update(nanos.to_le_bytes());

        let generation = GENERATION.fetch_add(1, Ordering::Relaxed);
        hasher.update(generation.to_le_bytes());

        let digest = hasher.finalize();
        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(&digest[..ID_LEN]);
        Self(id)
    }

    /// Wrap an identifier the producer already owns
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw id bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Abbreviated hex form used in log lines
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({self})")
    }
}

impl FromStr for TransactionId {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| CaptureError::Other(format!("Invalid transaction id '{s}': {e}")))?;

        let id: [u8; ID_LEN] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            CaptureError::Other(format!(
                "Invalid transaction id length: {} bytes, expected {ID_LEN}",
                bytes.len()
            ))
        })?;

        Ok(Self(id))
    }
}
