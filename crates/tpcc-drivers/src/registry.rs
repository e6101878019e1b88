//! Driver registry and connector factory

use std::collections::HashMap;
use std::sync::Arc;
use tpcc_core::{Connection, ConnectionConfig, DatabaseDriver, DbProvider, Result, TpccError};

/// Registry of available database drivers
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DatabaseDriver>>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Create a registry with all built-in drivers registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        #[cfg(feature = "cockroach")]
        registry.register(Arc::new(crate::cockroach::CockroachDriver::new()));

        registry
    }

    /// Register a new driver
    pub fn register(&mut self, driver: Arc<dyn DatabaseDriver>) {
        let name = driver.name().to_string();
        tracing::debug!(driver = %name, "registering database driver");
        self.drivers.insert(name, driver);
    }

    /// Get a driver by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn DatabaseDriver>> {
        let driver = self.drivers.get(name).cloned();
        if driver.is_none() {
            tracing::warn!(driver = %name, "driver not found in registry");
        }
        driver
    }

    /// List all registered driver names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check if a driver is registered
    pub fn has(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// The driver serving `provider`
    pub fn driver_for(&self, provider: DbProvider) -> Result<Arc<dyn DatabaseDriver>> {
        self.get(provider.driver_name()).ok_or_else(|| {
            TpccError::Configuration(format!(
                "No driver available for provider '{}'. Registered drivers: [{}]",
                provider,
                self.list().join(", ")
            ))
        })
    }

    /// Open a connection with the driver selected by `config.provider`
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let driver = self.driver_for(config.provider)?;
        tracing::info!(
            driver = driver.name(),
            target = %config.masked_connection_string(),
            "creating connector"
        );
        driver.connect(config).await
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Create the driver for the provider named by `DB_PROVIDER` and friends.
///
/// Fails with a configuration error when the provider is absent, unknown or
/// not compiled in.
pub fn driver_from_config(config: &ConnectionConfig) -> Result<Arc<dyn DatabaseDriver>> {
    DriverRegistry::with_defaults().driver_for(config.provider)
}

/// Build the configuration from the environment and open a connection
pub async fn connect_from_env() -> Result<Arc<dyn Connection>> {
    let config = ConnectionConfig::from_env()?;
    DriverRegistry::with_defaults().connect(&config).await
}
