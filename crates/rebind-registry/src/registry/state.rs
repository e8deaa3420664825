//! Registry tables and the mutations that keep them consistent.
//!
//! A connection is indexed four times: under its component, under the
//! process binding of its intent, under its client process, and in the
//! registry-wide handle table. Every mutation here updates all four.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info};

use crate::component::{BindFlags, ComponentName, Intent};
use crate::host::ProcessAnchor;
use crate::process::{ConnectionHandle, ProcessId};

use super::records::{
    BindingPhase, ClientProcessRecord, ComponentRecord, ComponentState, ConnectionId,
    ConnectionRecord, IntentBindingRecord,
};
use super::snapshot::{ComponentSnapshot, RegistrySnapshot};
use super::{ConnectionSink, REGISTRY_TARGET};

/// Arguments of one bind call once the component is installed.
pub(crate) struct BindRequest<'a> {
    pub(crate) intent: &'a Intent,
    pub(crate) handle: ConnectionHandle,
    pub(crate) sink: Arc<dyn ConnectionSink>,
    pub(crate) flags: BindFlags,
    pub(crate) pid: ProcessId,
}

/// Sizes of every table, used to check that rejected calls change nothing.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TableSizes {
    pub(crate) components: usize,
    pub(crate) processes: usize,
    pub(crate) handles: usize,
    pub(crate) connections: usize,
}

#[derive(Default)]
pub(crate) struct RegistryState {
    pub(crate) components: BTreeMap<ComponentName, ComponentRecord>,
    processes: HashMap<ProcessId, ClientProcessRecord>,
    handles: HashMap<ConnectionHandle, Vec<ConnectionId>>,
    connections: HashMap<ConnectionId, ConnectionRecord>,
    next_connection: u64,
}

impl RegistryState {
    pub(crate) fn has_client(&self, pid: ProcessId) -> bool {
        self.processes.contains_key(&pid)
    }

    pub(crate) fn add_client(&mut self, pid: ProcessId, record: ClientProcessRecord) {
        self.processes.insert(pid, record);
    }

    /// Records a new connection and, when it opens a binding episode, asks
    /// the component for its binding handle.
    ///
    /// Returns `false` when the component is not installed.
    pub(crate) fn attach(&mut self, request: BindRequest<'_>) -> bool {
        let name = request.intent.component().clone();
        let key = request.intent.key();
        let id = self.allocate_id();
        let Some(component) = self.components.get_mut(&name) else {
            return false;
        };
        let instance = component.instance();

        component
            .connections
            .entry(request.handle)
            .or_default()
            .push(id);
        let binding = component
            .bindings
            .entry(key.clone())
            .or_insert_with(|| IntentBindingRecord::new(request.intent.clone()));
        binding
            .apps
            .entry(request.pid)
            .or_default()
            .connections
            .insert(id);
        if let Some(client) = self.processes.get_mut(&request.pid) {
            client.connections.push(id);
        }
        self.handles.entry(request.handle).or_default().push(id);
        self.connections.insert(
            id,
            ConnectionRecord {
                handle: request.handle,
                component: name.clone(),
                key: key.clone(),
                pid: request.pid,
                flags: request.flags,
                sink: Arc::clone(&request.sink),
                remote_dead: false,
            },
        );

        let delivered = if binding.is_bound() {
            binding.cached.clone()
        } else if binding.apps.is_empty() {
            None
        } else {
            binding.phase = BindingPhase::BindRequested;
            let created = instance
                .as_ref()
                .and_then(|instance| instance.create_binding(&binding.intent));
            binding.cached.clone_from(&created);
            binding.phase = BindingPhase::Bound;
            binding.episodes = binding.episodes.saturating_add(1);
            info!(
                target: REGISTRY_TARGET,
                component = %name,
                intent = %key,
                episode = binding.episodes,
                has_handle = created.is_some(),
                "binding created"
            );
            created
        };
        debug!(
            target: REGISTRY_TARGET,
            component = %name,
            connection = %id,
            handle = %request.handle,
            flags = %request.flags,
            "connection attached"
        );
        if let Some(handle) = delivered {
            request.sink.connected(&name, Some(handle));
        }
        true
    }

    /// Removes every connection registered under `handle`.
    ///
    /// Returns `false` and changes nothing when the handle is unknown.
    pub(crate) fn unbind(&mut self, handle: ConnectionHandle, anchor: &dyn ProcessAnchor) -> bool {
        let Some(ids) = self.handles.remove(&handle) else {
            return false;
        };
        for id in ids {
            self.detach(id, anchor);
        }
        true
    }

    /// Removes every connection of a dead client process.
    ///
    /// Returns the number of connections released.
    pub(crate) fn drop_client(&mut self, pid: ProcessId, anchor: &dyn ProcessAnchor) -> usize {
        let Some(client) = self.processes.remove(&pid) else {
            return 0;
        };
        for id in &client.connections {
            if let Some(handle) = self.connections.get(id).map(|record| record.handle) {
                self.forget_handle_entry(handle, *id);
            }
            self.detach(*id, anchor);
        }
        client.connections.len()
    }

    /// Tears the component down when nothing keeps it alive any more.
    ///
    /// A component survives while a start request is outstanding or any of
    /// its connections carries the auto-create flag. On recycle, remaining
    /// connections are told the component is gone and marked dead, the
    /// instance is destroyed, and its anchor released.
    pub(crate) fn recycle_if_idle(
        &mut self,
        name: &ComponentName,
        anchor: &dyn ProcessAnchor,
    ) -> bool {
        let Some(component) = self.components.get(name) else {
            return false;
        };
        if component.start_requested {
            return false;
        }
        let held = component.connection_ids().any(|id| {
            self.connections
                .get(&id)
                .is_some_and(|record| record.flags.auto_create())
        });
        if held {
            return false;
        }
        let Some(mut component) = self.components.remove(name) else {
            return false;
        };
        let previous = std::mem::replace(&mut component.state, ComponentState::Recycling);
        debug!(
            target: REGISTRY_TARGET,
            component = %name,
            from = previous.label(),
            to = component.state.label(),
            "recycling component"
        );
        for id in component.connection_ids() {
            if let Some(record) = self.connections.get_mut(&id) {
                record.remote_dead = true;
                record.sink.connected(name, None);
            }
        }
        if let ComponentState::Installed {
            instance,
            anchor: anchor_id,
        } = previous
        {
            instance.on_destroy();
            if let Some(anchor_id) = anchor_id {
                anchor.release(component.metadata.process(), &anchor_id);
            }
        }
        info!(
            target: REGISTRY_TARGET,
            component = %name,
            process = %component.metadata.process(),
            "component recycled"
        );
        true
    }

    pub(crate) fn snapshot(&self) -> RegistrySnapshot {
        let components = self
            .components
            .values()
            .filter(|component| matches!(component.state, ComponentState::Installed { .. }))
            .map(|component| ComponentSnapshot {
                name: component.name().clone(),
                process: component.metadata.process(),
                plugin: component.metadata.plugin().to_owned(),
                anchor: component.anchor().cloned(),
                started: component.start_requested,
                bound_bindings: component
                    .bindings
                    .values()
                    .filter(|binding| binding.is_bound())
                    .count(),
                connections: component.connection_count(),
            })
            .collect();
        RegistrySnapshot {
            components,
            client_processes: self.processes.len(),
        }
    }

    #[cfg(test)]
    pub(crate) fn table_sizes(&self) -> TableSizes {
        TableSizes {
            components: self.components.len(),
            processes: self.processes.len(),
            handles: self.handles.len(),
            connections: self.connections.len(),
        }
    }

    #[cfg(test)]
    pub(crate) fn episodes(&self, intent: &Intent) -> u64 {
        self.components
            .get(intent.component())
            .and_then(|component| component.bindings.get(&intent.key()))
            .map_or(0, |binding| binding.episodes)
    }

    fn allocate_id(&mut self) -> ConnectionId {
        self.next_connection = self.next_connection.saturating_add(1);
        ConnectionId::new(self.next_connection)
    }

    /// Removes one connection from every index except the handle table.
    fn detach(&mut self, id: ConnectionId, anchor: &dyn ProcessAnchor) {
        let Some(record) = self.connections.remove(&id) else {
            return;
        };
        self.forget_client_entry(record.pid, id);
        if record.remote_dead {
            return;
        }
        let Some(component) = self.components.get_mut(&record.component) else {
            return;
        };
        if let Some(ids) = component.connections.get_mut(&record.handle) {
            ids.retain(|candidate| *candidate != id);
            if ids.is_empty() {
                component.connections.remove(&record.handle);
            }
        }
        let instance = component.instance();
        if let Some(binding) = component.bindings.get_mut(&record.key) {
            if let Some(app) = binding.apps.get_mut(&record.pid) {
                app.connections.remove(&id);
                if app.connections.is_empty() {
                    binding.apps.remove(&record.pid);
                }
            }
            if binding.apps.is_empty() && binding.is_bound() {
                binding.phase = BindingPhase::Unbinding;
                if let Some(instance) = &instance {
                    instance.destroy_binding(&binding.intent);
                }
                binding.cached = None;
                binding.phase = BindingPhase::NotBound;
                info!(
                    target: REGISTRY_TARGET,
                    component = %record.component,
                    intent = %record.key,
                    episode = binding.episodes,
                    "binding destroyed"
                );
            }
        }
        debug!(
            target: REGISTRY_TARGET,
            component = %record.component,
            connection = %id,
            "connection detached"
        );
        if record.flags.auto_create() {
            self.recycle_if_idle(&record.component, anchor);
        }
    }

    fn forget_client_entry(&mut self, pid: ProcessId, id: ConnectionId) {
        let Some(client) = self.processes.get_mut(&pid) else {
            return;
        };
        client.connections.retain(|candidate| *candidate != id);
        if !client.connections.is_empty() {
            return;
        }
        if let Some(client) = self.processes.remove(&pid) {
            if let Some(token) = client.watch {
                client.channel.unwatch(token);
            }
            debug!(target: REGISTRY_TARGET, %pid, "client process released");
        }
    }

    fn forget_handle_entry(&mut self, handle: ConnectionHandle, id: ConnectionId) {
        if let Some(ids) = self.handles.get_mut(&handle) {
            ids.retain(|candidate| *candidate != id);
            if ids.is_empty() {
                self.handles.remove(&handle);
            }
        }
    }
}
