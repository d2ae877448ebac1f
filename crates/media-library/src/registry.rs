//! Converter Registry
//!
//! Populated once during bootstrap, then shared read-only behind an `Arc`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::converter::Converter;
use crate::error::{MediaError, MediaResult};

/// Name to converter mapping
///
/// Registering a name twice is rejected with [`MediaError::DuplicateConversion`].
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn Converter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter under a unique name
    pub fn register<C>(&mut self, name: impl Into<String>, converter: C) -> MediaResult<()>
    where
        C: Converter + 'static,
    {
        self.register_arc(name, Arc::new(converter))
    }

    /// Register an already shared converter under a unique name
    pub fn register_arc(
        &mut self,
        name: impl Into<String>,
        converter: Arc<dyn Converter>,
    ) -> MediaResult<()> {
        let name = name.into();

        if name.is_empty() {
            return Err(MediaError::UnknownConversion(name));
        }
        if self.converters.contains_key(&name) {
            return Err(MediaError::DuplicateConversion(name));
        }

        debug!(conversion = %name, "Converter registered");
        self.converters.insert(name, converter);
        Ok(())
    }

    /// Get the converter registered under `name`
    pub fn get(&self, name: &str) -> MediaResult<Arc<dyn Converter>> {
        self.converters
            .get(name)
            .cloned()
            .ok_or_else(|| MediaError::UnknownConversion(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.converters.contains_key(name)
    }

    /// Snapshot of every registered converter, ordered by name
    pub fn all(&self) -> BTreeMap<String, Arc<dyn Converter>> {
        self.converters
            .iter()
            .map(|(name, converter)| (name.clone(), Arc::clone(converter)))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.all().into_keys().collect()
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("converters", &self.names())
            .finish()
    }
}
