//! Typed application options.
//!
//! Every section is defaulted so a partial document (or none at all) is
//! enough to configure an application:
//!
//! ```
//! use trellis_core::ApplicationOptions;
//!
//! let options: ApplicationOptions =
//!     serde_json::from_str(r#"{ "pipeline": { "run_filters_after_stop": true } }"#).unwrap();
//! assert!(options.pipeline.run_filters_after_stop);
//! assert!(options.router.strip_query);
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationOptions {
    pub pipeline: PipelineOptions,
    pub router: RouterOptions,
    pub log: LogOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Run the closing filter pass even after `stop_chain()`
    pub run_filters_after_stop: bool,
    /// Emit per-stage timing events
    pub stage_telemetry: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            run_filters_after_stop: false,
            stage_telemetry: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterOptions {
    /// Drop `?query` from the path before matching
    pub strip_query: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self { strip_query: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    pub level: String,
    pub format: String,
    pub filter: Option<String>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            filter: None,
        }
    }
}
