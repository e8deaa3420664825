//! Component catalogue backing the default [`ComponentResolver`].
//!
//! The catalogue stores validated [`ComponentMetadata`] keyed by component
//! name. Duplicate registrations are rejected. A catalogue can be loaded
//! from a JSON file holding an array of metadata entries:
//!
//! ```json
//! [
//!   {
//!     "name": {"package": "demo.plugin", "class": "SyncService"},
//!     "plugin": "demo",
//!     "process": "p0",
//!     "kind": "plugin"
//!   }
//! ]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::component::{ComponentMetadata, ComponentName};
use crate::error::CatalogError;
use crate::host::ComponentResolver;
use crate::process::ProcessSlot;

/// Validated set of known components.
///
/// # Example
///
/// ```
/// use rebind_registry::{
///     ComponentCatalog, ComponentKind, ComponentMetadata, ComponentName, ComponentResolver,
///     ProcessSlot,
/// };
///
/// let mut catalog = ComponentCatalog::new();
/// let name = ComponentName::new("demo.plugin", "SyncService");
/// catalog
///     .register(ComponentMetadata::new(
///         name.clone(),
///         "demo",
///         ProcessSlot::Plugin(0),
///         ComponentKind::Plugin,
///     ))
///     .expect("registration succeeds");
/// assert_eq!(catalog.resolve(&name).map(|m| m.process()), Some(ProcessSlot::Plugin(0)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ComponentCatalog {
    entries: BTreeMap<ComponentName, ComponentMetadata>,
}

impl ComponentCatalog {
    /// Creates an empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and validates a JSON catalogue file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the file cannot be read or parsed, or
    /// when an entry is invalid or duplicated.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })?;
        let entries: Vec<ComponentMetadata> =
            serde_json::from_str(&contents).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source: Arc::new(source),
            })?;
        Self::from_entries(entries)
    }

    /// Builds a catalogue from metadata entries.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] for the first invalid or duplicated entry.
    pub fn from_entries(
        entries: impl IntoIterator<Item = ComponentMetadata>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for entry in entries {
            catalog.register(entry)?;
        }
        Ok(catalog)
    }

    /// Registers one component after validation.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Invalid`] when validation fails and
    /// [`CatalogError::Duplicate`] when the name is already registered.
    pub fn register(&mut self, metadata: ComponentMetadata) -> Result<(), CatalogError> {
        metadata.validate()?;
        let name = metadata.name().clone();
        if self.entries.contains_key(&name) {
            return Err(CatalogError::Duplicate {
                component: name.to_string(),
            });
        }
        self.entries.insert(name, metadata);
        Ok(())
    }

    /// Returns every component hosted in `slot`.
    #[must_use]
    pub fn in_process(&self, slot: ProcessSlot) -> Vec<&ComponentMetadata> {
        self.entries
            .values()
            .filter(|metadata| metadata.process() == slot)
            .collect()
    }

    /// Returns every component shipped by `plugin`.
    #[must_use]
    pub fn for_plugin(&self, plugin: &str) -> Vec<&ComponentMetadata> {
        self.entries
            .values()
            .filter(|metadata| metadata.plugin() == plugin)
            .collect()
    }

    /// Returns the number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no components are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ComponentResolver for ComponentCatalog {
    fn resolve(&self, name: &ComponentName) -> Option<ComponentMetadata> {
        self.entries.get(name).cloned()
    }
}
