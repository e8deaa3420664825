/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default bound on the install rendezvous, in milliseconds.
pub const DEFAULT_INSTALL_TIMEOUT_MS: u64 = 6_000;

/// Default process slot hosted by the daemon.
pub const DEFAULT_HOST_PROCESS: &str = "persistent";

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default install rendezvous timeout in milliseconds.
pub fn default_install_timeout_ms() -> u64 {
    DEFAULT_INSTALL_TIMEOUT_MS
}

/// Owned default host process slot.
pub fn default_host_process() -> String {
    DEFAULT_HOST_PROCESS.to_string()
}
