// Configuration management for the Trellis framework

pub mod config_service;
pub mod env;
pub mod error;
pub mod loader;
pub mod options;
pub mod validation;

pub use config_service::{ConfigService, ConfigServiceBuilder};
pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use validation::{ConfigValidator, Validate};

use loader::{coerce_scalar, get_path, merge_values, set_path};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Main configuration manager.
///
/// Values form one tree addressed by dotted keys (`log.level`). Later
/// loads override earlier ones key by key.
#[derive(Clone)]
pub struct ConfigManager {
    root: Arc<RwLock<Value>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Self {
        Self {
            root: Arc::new(RwLock::new(Value::Object(Map::new()))),
            env_prefix: None,
        }
    }

    /// Create with environment variable prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            env_prefix: Some(prefix.into()),
            ..Self::new()
        }
    }

    fn env_loader(&self) -> EnvLoader {
        EnvLoader::new(self.env_prefix.clone())
    }

    fn apply_vars<I>(&self, source: &'static str, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut root = self.root.write();
        let mut count = 0;
        for (key, raw) in vars {
            set_path(&mut root, &key, coerce_scalar(&raw));
            count += 1;
        }
        debug!(source, keys = count, "Configuration loaded");
        count
    }

    /// Load configuration from environment variables
    pub fn load_env(&self) -> Result<()> {
        let vars = self.env_loader().load()?;
        self.apply_vars("env", vars);
        Ok(())
    }

    /// Load a `.env` file without touching the process environment.
    ///
    /// Without a path, `.env` is searched from the current directory up;
    /// its absence is not an error.
    pub fn load_dotenv(&self, path: Option<&str>) -> Result<()> {
        let iter = match path {
            Some(path) => dotenvy::from_path_iter(path)
                .map_err(|e| ConfigError::LoadError(format!("{}: {}", path, e)))?,
            None => match dotenvy::dotenv_iter() {
                Ok(iter) => iter,
                Err(e) if e.not_found() => return Ok(()),
                Err(e) => return Err(ConfigError::LoadError(e.to_string())),
            },
        };

        let loader = self.env_loader();
        let mut vars = Vec::new();
        for item in iter {
            let (name, value) = item.map_err(|e| ConfigError::ParseError(e.to_string()))?;
            if let Some(key) = loader.key_for(&name) {
                vars.push((key, value));
            }
        }
        self.apply_vars("dotenv", vars);
        Ok(())
    }

    /// Load configuration from file
    pub fn load_file(&self, path: impl AsRef<Path>, format: FileFormat) -> Result<()> {
        let data = ConfigLoader::new(format).load_file(path.as_ref())?;
        debug!(path = %path.as_ref().display(), format = ?format, "Configuration file loaded");
        self.merge_value(data);
        Ok(())
    }

    /// Load a file, detecting the format from its name
    pub fn load_file_auto(&self, path: impl AsRef<Path>) -> Result<()> {
        let format = ConfigLoader::auto(path.as_ref())?.format();
        self.load_file(path, format)
    }

    /// Deep-merge a JSON object into the tree
    pub fn merge_value(&self, value: Value) {
        merge_values(&mut self.root.write(), value);
    }

    /// Set a configuration value
    pub fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;
        set_path(&mut self.root.write(), key, json_value);
        Ok(())
    }

    /// Get a configuration value.
    ///
    /// Scalars coerced from strings are retried as strings, so `"8080"`
    /// from the environment still reads as a `String`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = get_path(&self.root.read(), key)
            .cloned()
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        match serde_json::from_value::<T>(value.clone()) {
            Ok(typed) => Ok(typed),
            Err(err) => match value {
                Value::Bool(_) | Value::Number(_) => {
                    serde_json::from_value(Value::String(value.to_string())).map_err(|_| {
                        ConfigError::DeserializationError {
                            key: key.to_string(),
                            message: err.to_string(),
                        }
                    })
                }
                _ => Err(ConfigError::DeserializationError {
                    key: key.to_string(),
                    message: err.to_string(),
                }),
            },
        }
    }

    /// Get a configuration value with default
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
    }

    pub fn get_float(&self, key: &str) -> Result<f64> {
        self.get(key)
    }

    /// Check if a key exists
    pub fn has(&self, key: &str) -> bool {
        get_path(&self.root.read(), key).is_some()
    }

    /// Dotted keys of every leaf value, sorted
    pub fn keys(&self) -> Vec<String> {
        fn collect(prefix: &str, value: &Value, out: &mut Vec<String>) {
            match value {
                Value::Object(map) => {
                    for (key, child) in map {
                        let path = if prefix.is_empty() {
                            key.clone()
                        } else {
                            format!("{}.{}", prefix, key)
                        };
                        collect(&path, child, out);
                    }
                }
                _ if !prefix.is_empty() => out.push(prefix.to_string()),
                _ => {}
            }
        }

        let mut keys = Vec::new();
        collect("", &self.root.read(), &mut keys);
        keys.sort();
        keys
    }

    /// Merge configuration from another manager
    pub fn merge(&self, other: &ConfigManager) {
        if Arc::ptr_eq(&self.root, &other.root) {
            return;
        }
        let snapshot = other.snapshot();
        self.merge_value(snapshot);
    }

    /// Copy of the whole tree
    pub fn snapshot(&self) -> Value {
        self.root.read().clone()
    }

    /// Deserialize the section under `key` and validate it
    pub fn section<T: DeserializeOwned + Validate>(&self, key: &str) -> Result<T> {
        let value = get_path(&self.root.read(), key)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        Self::validated(key, value)
    }

    /// Deserialize the whole tree and validate it
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        Self::validated("<root>", self.snapshot())
    }

    fn validated<T: DeserializeOwned + Validate>(key: &str, value: Value) -> Result<T> {
        let typed: T = serde_json::from_value(value).map_err(|e| ConfigError::DeserializationError {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        typed.validate()?;
        Ok(typed)
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
