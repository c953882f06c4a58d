// Typed application options loaded from configuration

use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigError, ConfigManager, Result};
use trellis_core::logging::{LogFormat, LogLevel};
use trellis_core::ApplicationOptions;

impl Validate for ApplicationOptions {
    fn validate(&self) -> Result<()> {
        if LogLevel::parse(&self.log.level).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "log.level `{}` is not a known level",
                self.log.level
            )));
        }
        if LogFormat::parse(&self.log.format).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "log.format `{}` is not a known format",
                self.log.format
            )));
        }
        if let Some(filter) = &self.log.filter {
            ConfigValidator::not_empty(filter, "log.filter")?;
        }
        Ok(())
    }
}

impl ConfigManager {
    /// [`ApplicationOptions`] from the `pipeline`, `router` and `log`
    /// sections; missing sections keep their defaults.
    pub fn application_options(&self) -> Result<ApplicationOptions> {
        self.load_validated()
    }
}
