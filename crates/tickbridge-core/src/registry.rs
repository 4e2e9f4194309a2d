//! Process-wide adapter registry.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::debug;

use crate::adapter::SourceAdapter;
use crate::error::AdapterError;

/// Produces a fresh adapter instance per lookup.
pub type AdapterFactory = Arc<dyn Fn() -> Box<dyn SourceAdapter> + Send + Sync>;

/// Named adapter factories behind a reader-writer lock.
///
/// Registration happens at process startup; lookups run concurrently with
/// registration and never observe a partially-inserted entry.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<BTreeMap<String, AdapterFactory>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from `(name, factory)` pairs.
    pub fn with_adapters(
        adapters: impl IntoIterator<Item = (String, AdapterFactory)>,
    ) -> Result<Self, AdapterError> {
        let registry = Self::new();
        for (name, factory) in adapters {
            registry.register(&name, factory)?;
        }
        Ok(registry)
    }

    /// Register a factory under `name`.
    ///
    /// Empty names and duplicate registrations are hard failures; a
    /// duplicate almost always means two adapters are fighting over the
    /// same source and must not be papered over.
    pub fn register(&self, name: &str, factory: AdapterFactory) -> Result<(), AdapterError> {
        if name.is_empty() {
            return Err(AdapterError::EmptyName);
        }

        let mut adapters = self
            .adapters
            .write()
            .expect("adapter registry lock is not poisoned");
        if adapters.contains_key(name) {
            return Err(AdapterError::DuplicateName {
                name: name.to_string(),
            });
        }

        debug!("registered adapter: {}", name);
        adapters.insert(name.to_string(), factory);
        Ok(())
    }

    /// Instantiate the adapter registered under `name`.
    ///
    /// An unknown name fails with an error listing the registered names;
    /// the registry never substitutes a default adapter. The factory runs
    /// after the lock is released, so it may call back into the registry.
    pub fn get(&self, name: &str) -> Result<Box<dyn SourceAdapter>, AdapterError> {
        let factory = {
            let adapters = self
                .adapters
                .read()
                .expect("adapter registry lock is not poisoned");

            match adapters.get(name) {
                Some(factory) => Arc::clone(factory),
                None => {
                    let registered = if adapters.is_empty() {
                        "none".to_string()
                    } else {
                        adapters.keys().cloned().collect::<Vec<_>>().join(", ")
                    };
                    return Err(AdapterError::NotFound {
                        name: name.to_string(),
                        registered,
                    });
                }
            }
        };

        Ok(factory())
    }

    /// Registered names in sorted order.
    pub fn list(&self) -> Vec<String> {
        self.adapters
            .read()
            .expect("adapter registry lock is not poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.adapters
            .read()
            .expect("adapter registry lock is not poisoned")
            .contains_key(name)
    }

    /// Remove every registration. Intended for test isolation.
    pub fn clear(&self) {
        self.adapters
            .write()
            .expect("adapter registry lock is not poisoned")
            .clear();
    }
}

/// The process-wide registry used by adapter crates at startup.
pub fn registry() -> &'static AdapterRegistry {
    static REGISTRY: OnceLock<AdapterRegistry> = OnceLock::new();
    REGISTRY.get_or_init(AdapterRegistry::new)
}
