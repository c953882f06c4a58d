// Core library for the Trellis framework
// This crate contains the injector, the router, the controller pipeline and module assembly

pub mod application;
pub mod controller;
pub mod error;
pub mod filter;
pub mod http;
pub mod injector;
pub mod logging;
pub mod metadata;
pub mod module;
pub mod options;
pub mod pipeline;
pub mod provider;
pub mod render;
pub mod request;
pub mod route_matcher;
pub mod routing;
pub mod status;
pub mod token;

// Re-export commonly used types
pub use application::*;
pub use controller::*;
pub use error::*;
pub use filter::*;
pub use http::*;
pub use injector::*;
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput, Rotation};
pub use metadata::*;
pub use module::*;
pub use options::*;
pub use pipeline::*;
pub use provider::*;
pub use render::*;
pub use request::*;
pub use route_matcher::RouteParser; // Segment helpers stay under route_matcher::
pub use routing::*;
pub use status::*;
pub use token::*;
