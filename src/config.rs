use std::path::PathBuf;
use std::time::Duration;

/// Registry file used when no other path is configured
pub const DEFAULT_REGISTRY_PATH: &str = "soundtouch_devices.json";

/// Settings shared by the controller and the default network bindings
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Where the device registry is persisted
    pub registry_path: PathBuf,

    /// How long a discovery scan may take
    pub discovery_timeout: Duration,

    /// Delay between the end of one status poll and the start of the next
    pub poll_interval: Duration,

    /// Per-request timeout for device and artwork HTTP calls
    pub request_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            registry_path: PathBuf::from(DEFAULT_REGISTRY_PATH),
            discovery_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ControllerConfig {
    /// Set the registry file path
    pub fn with_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = path.into();
        self
    }

    /// Set the discovery timeout
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the status poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the HTTP request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
