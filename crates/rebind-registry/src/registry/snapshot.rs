//! Read-only view of the registry for diagnostics.

use serde::{Deserialize, Serialize};

use crate::component::ComponentName;
use crate::process::{AnchorId, ProcessSlot};

/// Diagnostic snapshot of every installed component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// One entry per installed component, ordered by name.
    pub components: Vec<ComponentSnapshot>,
    /// Number of client processes with outstanding connections.
    pub client_processes: usize,
}

impl RegistrySnapshot {
    /// Looks up the entry for `name`.
    #[must_use]
    pub fn component(&self, name: &ComponentName) -> Option<&ComponentSnapshot> {
        self.components.iter().find(|entry| &entry.name == name)
    }
}

/// Diagnostic view of one installed component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    /// Component identity.
    pub name: ComponentName,
    /// Process slot hosting the component.
    pub process: ProcessSlot,
    /// Plugin shipping the component.
    pub plugin: String,
    /// Anchor keeping the hosting process alive, if one was acquired.
    pub anchor: Option<AnchorId>,
    /// Whether a start request is outstanding.
    pub started: bool,
    /// Number of intent bindings currently bound.
    pub bound_bindings: usize,
    /// Number of live connections.
    pub connections: usize,
}
