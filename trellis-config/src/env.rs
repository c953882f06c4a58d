// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Separator between nesting levels in variable names:
/// `APP_PIPELINE__RUN_FILTERS_AFTER_STOP` is `pipeline.run_filters_after_stop`.
pub const NESTING_SEPARATOR: &str = "__";

/// Environment variable loader.
///
/// With a prefix only `PREFIX_*` variables are read and the prefix is
/// stripped. Keys come back as lowercase dotted paths.
#[derive(Debug, Clone, Default)]
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix: prefix.map(|p| p.trim_end_matches('_').to_uppercase()),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Dotted key for a variable name, `None` when the prefix does not match.
    pub fn key_for(&self, name: &str) -> Option<String> {
        let rest = match &self.prefix {
            Some(prefix) => name.strip_prefix(prefix.as_str())?.strip_prefix('_')?,
            None => name,
        };
        if rest.is_empty() {
            return None;
        }
        Some(
            rest.split(NESTING_SEPARATOR)
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
                .join("."),
        )
    }

    /// Variable name for a dotted key.
    pub fn var_name(&self, key: &str) -> String {
        let name = key.split('.').collect::<Vec<_>>().join(NESTING_SEPARATOR).to_uppercase();
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, name),
            None => name,
        }
    }

    /// Filter and rename `vars`.
    pub fn load_from<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter_map(|(name, value)| self.key_for(&name).map(|key| (key, value)))
            .collect()
    }

    /// Load the process environment. Variables that are not valid unicode
    /// are skipped.
    pub fn load(&self) -> Result<HashMap<String, String>> {
        let vars = env::vars_os()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)));
        Ok(self.load_from(vars))
    }

    /// Load the variable for a dotted key.
    pub fn load_var(&self, key: &str) -> Result<String> {
        env::var(self.var_name(key)).map_err(ConfigError::EnvError)
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping_with_prefix() {
        let loader = EnvLoader::new(Some("TRELLIS".to_string()));
        assert_eq!(
            loader.key_for("TRELLIS_PIPELINE__RUN_FILTERS_AFTER_STOP").as_deref(),
            Some("pipeline.run_filters_after_stop")
        );
        assert_eq!(loader.key_for("TRELLIS_PORT").as_deref(), Some("port"));
        assert_eq!(loader.key_for("TRELLISX_PORT"), None);
        assert_eq!(loader.key_for("OTHER_PORT"), None);
        assert_eq!(loader.key_for("TRELLIS_"), None);
    }

    #[test]
    fn test_var_name_round_trip() {
        let loader = EnvLoader::new(Some("app_".to_string()));
        let name = loader.var_name("router.strip_query");
        assert_eq!(name, "APP_ROUTER__STRIP_QUERY");
        assert_eq!(loader.key_for(&name).as_deref(), Some("router.strip_query"));
    }

    #[test]
    fn test_load_from_filters_prefix() {
        let loader = EnvLoader::new(Some("APP".to_string()));
        let loaded = loader.load_from(vec![
            ("APP_LOG__LEVEL".to_string(), "debug".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ]);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["log.level"], "debug");
    }

    #[test]
    fn test_missing_var() {
        let loader = EnvLoader::new(Some("TRELLIS_TEST".to_string()));
        assert!(loader.load_var("missing_var_67890").is_err());
        assert_eq!(loader.load_var_or("missing_var_67890", "default"), "default");
    }
}
