//! Named store registry

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::store::TransactionStore;
use crate::{CaptureError, Result};

/// Maximum number of stores in one registry
pub const MAX_STORES: usize = 1024;

/// Name of the store used when the host does not pick one
pub const DEFAULT_STORE: &str = "default";

/// Registry of independent named stores
///
/// The host application owns the registry and hands out `Arc` clones of its
/// stores to producers and consumers.
pub struct StoreRegistry {
    stores: DashMap<String, Arc<TransactionStore>>,
    config: StoreConfig,
}

impl StoreRegistry {
    /// Create a registry whose stores use `config`
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            stores: DashMap::new(),
            config,
        })
    }

    /// Get or create a store
    ///
    /// # Errors
    ///
    /// Returns error if the store limit is reached or the name is invalid
    pub fn get_or_create(&self, name: &str) -> Result<Arc<TransactionStore>> {
        if let Some(store) = self.stores.get(name) {
            return Ok(Arc::clone(&store));
        }

        // Checked without holding a shard lock; concurrent creators may
        // overshoot the limit by a few entries.
        if self.stores.len() >= MAX_STORES {
            return Err(CaptureError::Other(format!(
                "Store limit reached: {MAX_STORES}"
            )));
        }

        validate_store_name(name)?;

        let entry = self.stores.entry(name.to_string()).or_insert_with(|| {
            debug!("Created store '{}'", name);
            Arc::new(TransactionStore::configured(&self.config))
        });

        Ok(Arc::clone(&entry))
    }

    /// Get the default store, creating it on first use
    ///
    /// # Errors
    ///
    /// Returns error if the store limit is reached
    pub fn default_store(&self) -> Result<Arc<TransactionStore>> {
        self.get_or_create(DEFAULT_STORE)
    }

    /// Get an existing store
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<TransactionStore>> {
        self.stores.get(name).map(|store| Arc::clone(&store))
    }

    /// Drop a store from the registry
    ///
    /// Holders of the `Arc` keep a working store; it is only unregistered.
    pub fn remove(&self, name: &str) -> Option<Arc<TransactionStore>> {
        self.stores.remove(name).map(|(_, store)| store)
    }

    /// Registered store names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered stores
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Whether no store is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Reset every registered store
    pub fn reset_all(&self) {
        let stores: Vec<_> = self
            .stores
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for store in &stores {
            store.reset();
        }

        info!("Reset {} stores", stores.len());
    }
}

/// Validate a store name
///
/// # Errors
///
/// Returns error if the name is empty, too long, or contains control characters
fn validate_store_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CaptureError::InvalidStoreName(
            "Store name cannot be empty".to_string(),
        ));
    }

    if name.len() > 255 {
        return Err(CaptureError::InvalidStoreName(format!(
            "Store name too long: {} > 255",
            name.len()
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(CaptureError::InvalidStoreName(
            "Store name cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}
