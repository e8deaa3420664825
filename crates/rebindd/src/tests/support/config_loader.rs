//! Configuration loaders covering success and failure paths.

use std::ffi::OsString;
use std::fs;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use tempfile::TempDir;

use rebind_config::{Config, ConfigLoadError};
use rebind_registry::ComponentName;

use crate::bootstrap::ConfigLoader;

const CATALOG: &str = r#"[
  {
    "name": {"package": "demo.plugin", "class": "SyncService"},
    "plugin": "demo",
    "process": "p0",
    "kind": "plugin"
  }
]"#;

/// Name of the single component in the test catalogue.
pub fn sync_service() -> ComponentName {
    ComponentName::new("demo.plugin", "SyncService")
}

/// Loader that writes a one-entry catalogue under a temporary directory.
pub struct TestConfigLoader {
    _dir: TempDir,
    catalog: Utf8PathBuf,
    host_process: String,
}

impl TestConfigLoader {
    pub fn new() -> Self {
        Self::for_process("p0")
    }

    pub fn for_process(host_process: &str) -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory");
        let path = dir.path().join("catalog.json");
        fs::write(&path, CATALOG).expect("failed to write catalogue");
        let catalog = Utf8PathBuf::from_path_buf(path).expect("temporary path was not UTF-8");
        Self {
            _dir: dir,
            catalog,
            host_process: host_process.to_owned(),
        }
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, ConfigLoadError> {
        Ok(Config {
            host_process: self.host_process.clone(),
            catalog_path: Some(self.catalog.clone()),
            install_timeout_ms: 2_000,
            ..Config::default()
        })
    }
}

/// Loader that fails by passing an unparsable command-line flag.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, ConfigLoadError> {
        let args = vec![
            OsString::from("rebindd"),
            OsString::from("--install-timeout-ms"),
            OsString::from("soon"),
        ];
        Config::load_from_iter(args).map_err(ConfigLoadError::Load)
    }
}
