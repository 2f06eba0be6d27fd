//! Named completion callbacks

use super::CompletionCallback;
use crate::config::CallbackConfig;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maps callback names to implementations
///
/// Lets a configuration file (or a service request) pick a callback by name.
/// Lookup failures report every registered name.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: BTreeMap<String, Arc<dyn CompletionCallback>>,
}

impl CallbackRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `name`, returning any callback it replaces
    pub fn register(
        &mut self,
        name: impl Into<String>,
        callback: Arc<dyn CompletionCallback>,
    ) -> Option<Arc<dyn CompletionCallback>> {
        self.callbacks.insert(name.into(), callback)
    }

    /// Look up a callback
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCallback`] listing the registered names.
    pub fn get(&self, name: &str) -> Result<Arc<dyn CompletionCallback>> {
        self.callbacks
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownCallback {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Resolve the callback named in `config`, if any
    pub fn resolve(&self, config: &CallbackConfig) -> Result<Option<Arc<dyn CompletionCallback>>> {
        config.name.as_deref().map(|name| self.get(name)).transpose()
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.callbacks.keys().cloned().collect()
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("names", &self.names())
            .finish()
    }
}
