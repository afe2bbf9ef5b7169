//! Configuration management for the Crucible substrate

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use parking_lot::RwLock;
use crate::error::{CrucibleError, CrucibleResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Record no-interceptor fast-path decisions per keyed slot
    pub fast_path_cache: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            fast_path_cache: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasingConfig {
    /// Emit a trace event for every storage swap
    pub trace_swaps: bool,
}

impl Default for AliasingConfig {
    fn default() -> Self {
        Self { trace_swaps: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevelopmentConfig {
    pub debug_mode: bool,
    pub verbose_logging: bool,
}

impl Default for DevelopmentConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            verbose_logging: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrucibleConfig {
    pub dispatch: DispatchConfig,
    pub aliasing: AliasingConfig,
    pub development: DevelopmentConfig,
}

/// Configuration manager with JSON file persistence
pub struct ConfigManager {
    config: Arc<RwLock<CrucibleConfig>>,
    config_file: Option<PathBuf>,
    custom_settings: HashMap<String, serde_json::Value>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(CrucibleConfig::default())),
            config_file: None,
            custom_settings: HashMap::new(),
        }
    }

    pub fn load_from_file(&mut self, path: &PathBuf) -> CrucibleResult<()> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CrucibleError::ConfigurationError(format!("Failed to read config file: {}", e)))?;

        let config: CrucibleConfig = serde_json::from_str(&content)
            .map_err(|e| CrucibleError::ConfigurationError(format!("Failed to parse config file: {}", e)))?;

        *self.config.write() = config;
        self.config_file = Some(path.clone());

        tracing::info!("Configuration loaded from {:?}", path);
        Ok(())
    }

    pub fn save_to_file(&self, path: &PathBuf) -> CrucibleResult<()> {
        let config = self.config.read();
        let content = serde_json::to_string_pretty(&*config)
            .map_err(|e| CrucibleError::ConfigurationError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| CrucibleError::ConfigurationError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    pub fn get_config(&self) -> CrucibleConfig {
        self.config.read().clone()
    }

    pub fn update_config<F>(&mut self, f: F) -> CrucibleResult<()>
    where
        F: FnOnce(&mut CrucibleConfig),
    {
        {
            let mut config = self.config.write();
            f(&mut config);
        }

        if let Some(ref path) = self.config_file {
            self.save_to_file(path)?;
        }

        Ok(())
    }

    pub fn set_custom_setting(&mut self, key: &str, value: serde_json::Value) {
        self.custom_settings.insert(key.to_string(), value);
    }

    pub fn get_custom_setting(&self, key: &str) -> Option<&serde_json::Value> {
        self.custom_settings.get(key)
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Global configuration instance
lazy_static! {
    static ref CONFIG_MANAGER: Arc<RwLock<ConfigManager>> = Arc::new(RwLock::new(ConfigManager::new()));
}

/// Get the global configuration
pub fn get_config() -> CrucibleConfig {
    CONFIG_MANAGER.read().get_config()
}

/// Update the global configuration
pub fn update_config<F>(f: F) -> CrucibleResult<()>
where
    F: FnOnce(&mut CrucibleConfig),
{
    let mut manager = CONFIG_MANAGER.write();
    manager.update_config(f)
}

/// Load the global configuration from file
pub fn load_config_from_file(path: &PathBuf) -> CrucibleResult<()> {
    let mut manager = CONFIG_MANAGER.write();
    manager.load_from_file(path)
}

/// Create a configuration builder for easy setup
pub struct ConfigBuilder {
    config: CrucibleConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CrucibleConfig::default(),
        }
    }

    pub fn dispatch(mut self, f: impl FnOnce(&mut DispatchConfig)) -> Self {
        f(&mut self.config.dispatch);
        self
    }

    pub fn aliasing(mut self, f: impl FnOnce(&mut AliasingConfig)) -> Self {
        f(&mut self.config.aliasing);
        self
    }

    pub fn development(mut self, f: impl FnOnce(&mut DevelopmentConfig)) -> Self {
        f(&mut self.config.development);
        self
    }

    pub fn build(self) -> CrucibleConfig {
        self.config
    }

    pub fn apply(self) -> CrucibleResult<()> {
        update_config(|config| *config = self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
