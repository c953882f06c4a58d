// ConfigService - injectable configuration service

use crate::validation::Validate;
use crate::{ConfigManager, FileFormat, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;
use trellis_core::{ApplicationOptions, Provider, Token};

/// Read-only configuration handle for application components.
#[derive(Clone, Default)]
pub struct ConfigService {
    manager: ConfigManager,
}

impl ConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_manager(manager: ConfigManager) -> Self {
        Self { manager }
    }

    pub fn builder() -> ConfigServiceBuilder {
        ConfigServiceBuilder::new()
    }

    /// Value provider registering this service under its type token, for
    /// application or module providers.
    pub fn provider(&self) -> Provider {
        Provider::value(Token::of::<ConfigService>(), self.clone())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.manager.get(key)
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.manager.get_or(key, default)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.manager.get_string(key)
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.manager.get_int(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.manager.get_bool(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.manager.has(key)
    }

    pub fn section<T: DeserializeOwned + Validate>(&self, key: &str) -> Result<T> {
        self.manager.section(key)
    }

    pub fn application_options(&self) -> Result<ApplicationOptions> {
        self.manager.application_options()
    }

    pub fn manager(&self) -> &ConfigManager {
        &self.manager
    }
}

enum Source {
    File(String, Option<FileFormat>),
    Dotenv(Option<String>),
    Env,
}

/// Builder for ConfigService.
///
/// Sources are applied in the order they were added; later sources override
/// earlier ones key by key. Defaults always come first.
#[derive(Default)]
pub struct ConfigServiceBuilder {
    prefix: Option<String>,
    defaults: Vec<serde_json::Value>,
    sources: Vec<Source>,
    error: Option<crate::ConfigError>,
}

impl ConfigServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set environment variable prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Baseline values, e.g. a serialized options struct
    pub fn defaults<T: Serialize>(mut self, value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => self.defaults.push(value),
            Err(e) => {
                self.error
                    .get_or_insert(crate::ConfigError::SerializationError(e.to_string()));
            }
        }
        self
    }

    /// Read environment variables
    pub fn load_env(mut self) -> Self {
        self.sources.push(Source::Env);
        self
    }

    /// Read a `.env` file; `None` searches for `.env`
    pub fn load_dotenv(mut self, path: Option<String>) -> Self {
        self.sources.push(Source::Dotenv(path));
        self
    }

    /// Add configuration file to load
    pub fn add_file(mut self, path: impl Into<String>, format: FileFormat) -> Self {
        self.sources.push(Source::File(path.into(), Some(format)));
        self
    }

    /// Add a configuration file, format detected from its name
    pub fn add_file_auto(mut self, path: impl Into<String>) -> Self {
        self.sources.push(Source::File(path.into(), None));
        self
    }

    /// Build the configuration service
    pub fn build(self) -> Result<ConfigService> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let manager = match self.prefix {
            Some(prefix) => ConfigManager::with_prefix(prefix),
            None => ConfigManager::new(),
        };
        for value in self.defaults {
            manager.merge_value(value);
        }

        let sources = self.sources.len();
        for source in self.sources {
            match source {
                Source::File(path, Some(format)) => manager.load_file(&path, format)?,
                Source::File(path, None) => manager.load_file_auto(&path)?,
                Source::Dotenv(path) => manager.load_dotenv(path.as_deref())?,
                Source::Env => manager.load_env()?,
            }
        }

        info!(sources, keys = manager.keys().len(), "Configuration ready");
        Ok(ConfigService::from_manager(manager))
    }
}
