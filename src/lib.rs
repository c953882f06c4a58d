//! Trellis: a request-processing framework built from a hierarchical
//! dependency injector, a declarative URL router and a controller pipeline
//! of hooks and filters.
//!
//! The core crate is re-exported at the top level; configuration and test
//! helpers are available behind the `config` and `testing` features.

pub use trellis_core::*;

#[cfg(feature = "config")]
pub use trellis_config;

#[cfg(feature = "testing")]
pub use trellis_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Application, ApplicationOptions, Arguments, Chain, ControllerDef, Error, Filter,
        FilterDef, HttpMethod, Injectable, Injector, ModuleDef, Provider, Request,
        RequestContext, RouteConfig, Router, Token, method,
    };
    pub use async_trait::async_trait;

    #[cfg(feature = "config")]
    pub use trellis_config::{ConfigService, ConfigServiceBuilder};
}
