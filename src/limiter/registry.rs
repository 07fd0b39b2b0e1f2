//! Algorithm registry: name → limiter factory.

use super::Limiter;
use crate::error::{LimitError, LimitResult};
use crate::store::{ScoreStore, ScriptHandle};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Constructs a limiter from a store reference and its script handle.
pub type LimiterFactory = fn(Arc<dyn ScoreStore>, ScriptHandle) -> Arc<dyn Limiter>;

/// Registry of rate-limit algorithm factories.
///
/// Registration happens at startup; reads are rare (service construction,
/// not per request).
#[derive(Default)]
pub struct LimiterRegistry {
    factories: RwLock<HashMap<String, LimiterFactory>>,
}

impl std::fmt::Debug for LimiterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterRegistry")
            .field("algorithms", &self.list())
            .finish()
    }
}

impl LimiterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`. Fails if the name is taken.
    pub fn register(&self, name: &str, factory: LimiterFactory) -> LimitResult<()> {
        let mut factories = self.factories.write().unwrap();
        if factories.contains_key(name) {
            return Err(LimitError::AlreadyRegistered(name.to_string()));
        }
        factories.insert(name.to_string(), factory);
        Ok(())
    }

    /// Instantiate the limiter registered under `name`.
    pub fn create(
        &self,
        name: &str,
        store: Arc<dyn ScoreStore>,
        script: ScriptHandle,
    ) -> LimitResult<Arc<dyn Limiter>> {
        let factories = self.factories.read().unwrap();
        let factory = factories
            .get(name)
            .ok_or_else(|| LimitError::UnknownAlgorithm(name.to_string()))?;
        Ok(factory(store, script))
    }

    /// Names of all registered algorithms.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}
