//! In-process transport connecting clients to registries of the same
//! process.
//!
//! Each registered registry is fronted by a [`LocalObject`] that serves the
//! request verbs needing no callback channel and whose death stands in for
//! the death of the hosting process.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Value, json};
use tracing::info;

use crate::client::{RegistryConnector, RegistryHandle};
use crate::component::{ComponentName, Intent};
use crate::error::TransportError;
use crate::process::ProcessSlot;
use crate::registry::RegistryService;
use crate::transport::{LocalObject, RemoteHandle, RemoteObject};

const LOOPBACK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::loopback");

/// Fronting object and operations of one registered registry.
type Registered = (Arc<LocalObject>, Arc<dyn RegistryService>);

/// Connector resolving slots to registries registered in this process.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use rebind_registry::{
///     ComponentCatalog, HostCollaborators, KindedFactory, LoopbackConnector, ProcessSlot,
///     RegistryConnector, SerialQueue, ServiceRegistry, SlotAnchor,
/// };
/// use serde_json::json;
///
/// let main = Arc::new(SerialQueue::spawn("main").expect("spawn main context"));
/// let registry = ServiceRegistry::new(
///     HostCollaborators {
///         resolver: Arc::new(ComponentCatalog::new()),
///         factory: Arc::new(KindedFactory::new()),
///         anchor: Arc::new(SlotAnchor::new()),
///     },
///     main,
///     Duration::from_secs(6),
/// );
/// let connector = LoopbackConnector::new();
/// connector.register(ProcessSlot::Persistent, Arc::new(registry));
///
/// let handle = connector.connect(ProcessSlot::Persistent).expect("registered");
/// let reply = handle.remote().invoke(json!({ "verb": "dump" })).expect("dump");
/// assert_eq!(reply["client_processes"], 0);
/// ```
#[derive(Default)]
pub struct LoopbackConnector {
    registries: Mutex<HashMap<ProcessSlot, Registered>>,
}

impl LoopbackConnector {
    /// Creates a connector with no registries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `service` reachable as the registry of `slot`, replacing any
    /// earlier registration.
    ///
    /// Returns the object fronting the registry; killing it simulates the
    /// death of the hosting process.
    pub fn register(
        &self,
        slot: ProcessSlot,
        service: Arc<dyn RegistryService>,
    ) -> Arc<LocalObject> {
        let served = Arc::clone(&service);
        let object = Arc::new(LocalObject::with_handler(
            format!("registry:{slot}"),
            move |request| serve(served.as_ref(), &request),
        ));
        self.lock().insert(slot, (Arc::clone(&object), service));
        info!(target: LOOPBACK_TARGET, %slot, "registry registered");
        object
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProcessSlot, Registered>> {
        self.registries
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl RegistryConnector for LoopbackConnector {
    fn connect(&self, slot: ProcessSlot) -> Result<RegistryHandle, TransportError> {
        let registries = self.lock();
        let Some((object, service)) = registries.get(&slot) else {
            return Err(TransportError::Rejected {
                label: format!("registry:{slot}"),
                message: String::from("no registry serves this slot"),
            });
        };
        if !object.is_alive() {
            return Err(TransportError::Dead {
                label: object.label().to_owned(),
            });
        }
        Ok(RegistryHandle::new(
            RemoteHandle::new(Arc::clone(object) as Arc<dyn RemoteObject>),
            Arc::clone(service),
        ))
    }
}

impl fmt::Debug for LoopbackConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: Vec<String> = self.lock().keys().map(ToString::to_string).collect();
        f.debug_struct("LoopbackConnector")
            .field("slots", &slots)
            .finish()
    }
}

/// Answers `dump` and `stop` requests.
fn serve(service: &dyn RegistryService, request: &Value) -> Result<Value, TransportError> {
    let verb = request.get("verb").and_then(Value::as_str).unwrap_or_default();
    match verb {
        "dump" => {
            serde_json::to_value(service.dump()).map_err(|error| rejected(&error.to_string()))
        }
        "stop" => {
            let name: ComponentName = request
                .get("component")
                .and_then(Value::as_str)
                .ok_or_else(|| rejected("stop needs a component"))?
                .parse()
                .map_err(|error: crate::error::DescriptorError| rejected(&error.to_string()))?;
            Ok(json!({ "stopped": service.stop_component(&Intent::new(name)) }))
        }
        other => Err(rejected(&format!("unknown verb '{other}'"))),
    }
}

fn rejected(message: &str) -> TransportError {
    TransportError::Rejected {
        label: String::from("registry"),
        message: message.to_owned(),
    }
}
