// Configuration errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// No value under the dotted key
    #[error("no configuration value at `{0}`")]
    KeyNotFound(String),

    /// A source could not be opened or read
    #[error("cannot load configuration source: {0}")]
    LoadError(String),

    /// A source was read but is not valid for its format
    #[error("malformed configuration: {0}")]
    ParseError(String),

    #[error("invalid configuration: {0}")]
    ValidationError(String),

    #[error("cannot serialize configuration value: {0}")]
    SerializationError(String),

    #[error("configuration at `{key}` has the wrong shape: {message}")]
    DeserializationError { key: String, message: String },

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("environment variable: {0}")]
    EnvError(#[from] std::env::VarError),
}

impl ConfigError {
    /// The key was absent, as opposed to present but unusable
    pub fn is_missing(&self) -> bool {
        matches!(self, ConfigError::KeyNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration failures surface as 500s at request time.
impl From<ConfigError> for trellis_core::Error {
    fn from(err: ConfigError) -> Self {
        trellis_core::Error::internal(format!("configuration: {}", err))
    }
}
