//! Record types owned by the registry.
//!
//! Records never point at each other. Connections live in one arena keyed by
//! [`ConnectionId`] and every other table refers to them by id.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::component::{BindFlags, ComponentMetadata, ComponentName, Intent, IntentKey};
use crate::host::Component;
use crate::process::{AnchorId, ConnectionHandle, ProcessId};
use crate::transport::{RemoteHandle, WatchToken};

use super::ConnectionSink;

/// Arena key of a [`ConnectionRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Lifecycle of a component record.
pub(crate) enum ComponentState {
    /// The factory is being asked for an instance.
    Installing,
    /// The instance is running.
    Installed {
        instance: Arc<dyn Component>,
        anchor: Option<AnchorId>,
    },
    /// The instance is being torn down.
    Recycling,
}

impl ComponentState {
    pub(crate) const fn label(&self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::Installed { .. } => "installed",
            Self::Recycling => "recycling",
        }
    }
}

/// One logical component instance.
pub(crate) struct ComponentRecord {
    pub(crate) metadata: ComponentMetadata,
    pub(crate) state: ComponentState,
    pub(crate) start_requested: bool,
    pub(crate) bindings: BTreeMap<IntentKey, IntentBindingRecord>,
    pub(crate) connections: HashMap<ConnectionHandle, Vec<ConnectionId>>,
}

impl ComponentRecord {
    pub(crate) fn installing(metadata: ComponentMetadata) -> Self {
        Self {
            metadata,
            state: ComponentState::Installing,
            start_requested: false,
            bindings: BTreeMap::new(),
            connections: HashMap::new(),
        }
    }

    pub(crate) const fn name(&self) -> &ComponentName {
        self.metadata.name()
    }

    pub(crate) fn instance(&self) -> Option<Arc<dyn Component>> {
        match &self.state {
            ComponentState::Installed { instance, .. } => Some(Arc::clone(instance)),
            ComponentState::Installing | ComponentState::Recycling => None,
        }
    }

    pub(crate) const fn anchor(&self) -> Option<&AnchorId> {
        match &self.state {
            ComponentState::Installed { anchor, .. } => anchor.as_ref(),
            ComponentState::Installing | ComponentState::Recycling => None,
        }
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connections.values().map(Vec::len).sum()
    }

    pub(crate) fn connection_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.values().flatten().copied()
    }
}

/// Phase of a binding episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindingPhase {
    NotBound,
    BindRequested,
    Bound,
    Unbinding,
}

/// All connections bound through one canonical intent.
pub(crate) struct IntentBindingRecord {
    pub(crate) intent: Intent,
    pub(crate) phase: BindingPhase,
    pub(crate) cached: Option<RemoteHandle>,
    pub(crate) apps: BTreeMap<ProcessId, ProcessBindingRecord>,
    pub(crate) episodes: u64,
}

impl IntentBindingRecord {
    pub(crate) const fn new(intent: Intent) -> Self {
        Self {
            intent,
            phase: BindingPhase::NotBound,
            cached: None,
            apps: BTreeMap::new(),
            episodes: 0,
        }
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.phase == BindingPhase::Bound
    }
}

/// Connections from one client process through one intent binding.
#[derive(Debug, Default)]
pub(crate) struct ProcessBindingRecord {
    pub(crate) connections: BTreeSet<ConnectionId>,
}

/// The atomic unit of one bind call.
pub(crate) struct ConnectionRecord {
    pub(crate) handle: ConnectionHandle,
    pub(crate) component: ComponentName,
    pub(crate) key: IntentKey,
    pub(crate) pid: ProcessId,
    pub(crate) flags: BindFlags,
    pub(crate) sink: Arc<dyn ConnectionSink>,
    pub(crate) remote_dead: bool,
}

/// A calling process with outstanding connections.
pub(crate) struct ClientProcessRecord {
    pub(crate) channel: RemoteHandle,
    pub(crate) watch: Option<WatchToken>,
    pub(crate) connections: Vec<ConnectionId>,
}

impl ClientProcessRecord {
    pub(crate) const fn new(channel: RemoteHandle, watch: Option<WatchToken>) -> Self {
        Self {
            channel,
            watch,
            connections: Vec::new(),
        }
    }
}
