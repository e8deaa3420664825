//! Host bootstrap orchestration.

use std::sync::Arc;

use thiserror::Error;

use rebind_config::{Config, ConfigLoadError};
use rebind_registry::{
    CatalogError, ComponentCatalog, ComponentFactory, DescriptorError, HostCollaborators,
    LocalObject, LoopbackConnector, ProcessSlot, RegistryService, RegistrySnapshot, RendezvousError,
    SerialQueue, ServiceRegistry, SlotAnchor,
};

use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

const MAIN_CONTEXT: &str = "rebind-main";

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the host configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError`] when a layer fails to parse or the merged
    /// values are invalid.
    fn load(&self) -> Result<Config, ConfigLoadError>;
}

/// Loader that delegates to [`Config::load_validated`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, ConfigLoadError> {
        Config::load_validated()
    }
}

/// Loader returning a configuration resolved earlier.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, ConfigLoadError> {
        self.config
            .validate()
            .map_err(ConfigLoadError::Invalid)?;
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: ConfigLoadError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The configured host process is not a known slot.
    #[error("invalid host process: {source}")]
    HostProcess {
        /// Underlying parse error.
        #[source]
        source: DescriptorError,
    },
    /// The component catalogue could not be loaded.
    #[error("failed to load component catalogue: {source}")]
    Catalog {
        /// Underlying catalogue error.
        #[source]
        source: CatalogError,
    },
    /// The registry's main execution context could not be started.
    #[error("failed to start main context: {source}")]
    MainContext {
        /// Underlying spawn error.
        #[source]
        source: RendezvousError,
    },
}

/// A bootstrapped host: one registry serving the configured process slot.
pub struct Host {
    config: Config,
    slot: ProcessSlot,
    catalog: Arc<ComponentCatalog>,
    registry: ServiceRegistry,
    connector: Arc<LoopbackConnector>,
    endpoint: Arc<LocalObject>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Host {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Process slot this host serves.
    #[must_use]
    pub const fn slot(&self) -> ProcessSlot {
        self.slot
    }

    /// Components this host can install.
    #[must_use]
    pub const fn catalog(&self) -> &Arc<ComponentCatalog> {
        &self.catalog
    }

    /// The host's registry.
    #[must_use]
    pub const fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Connector through which in-process clients reach the registry.
    #[must_use]
    pub const fn connector(&self) -> &Arc<LoopbackConnector> {
        &self.connector
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Current registry snapshot.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.dump()
    }

    /// Current registry snapshot rendered as JSON.
    ///
    /// # Errors
    ///
    /// Returns the serialisation error when the snapshot cannot be encoded.
    pub fn snapshot_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.snapshot())
    }

    /// Stops serving: clients see the registry die and the main context
    /// drains.
    pub fn shutdown(self) {
        let snapshot = self.snapshot();
        self.endpoint.kill();
        self.registry.main_context().shutdown();
        self.reporter.host_stopped(&snapshot);
    }
}

/// Bootstraps the host using the supplied collaborators.
///
/// # Errors
///
/// Returns [`BootstrapError`] when any stage fails; the failure is also
/// reported to `reporter`.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    factory: Arc<dyn ComponentFactory>,
) -> Result<Host, BootstrapError> {
    reporter.bootstrap_starting();
    match assemble(loader, &reporter, factory) {
        Ok(host) => {
            reporter.bootstrap_succeeded(&host.config, host.catalog.len());
            Ok(host)
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn assemble(
    loader: &dyn ConfigLoader,
    reporter: &Arc<dyn HealthReporter>,
    factory: Arc<dyn ComponentFactory>,
) -> Result<Host, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    let slot: ProcessSlot = config
        .host_process()
        .parse()
        .map_err(|source| BootstrapError::HostProcess { source })?;
    let catalog = match config.catalog_path() {
        Some(path) => ComponentCatalog::load(path.as_std_path())
            .map_err(|source| BootstrapError::Catalog { source })?,
        None => ComponentCatalog::new(),
    };
    let catalog = Arc::new(catalog);
    let main = SerialQueue::spawn(MAIN_CONTEXT)
        .map_err(|source| BootstrapError::MainContext { source })?;
    let registry = ServiceRegistry::new(
        HostCollaborators {
            resolver: Arc::clone(&catalog) as _,
            factory,
            anchor: Arc::new(SlotAnchor::new()),
        },
        Arc::new(main),
        config.install_timeout(),
    );
    let connector = Arc::new(LoopbackConnector::new());
    let endpoint = connector.register(slot, Arc::new(registry.clone()));
    Ok(Host {
        config,
        slot,
        catalog,
        registry,
        connector,
        endpoint,
        telemetry,
        reporter: Arc::clone(reporter),
    })
}
