//! Testing utilities for Trellis applications.
//!
//! Applications are driven in memory: [`TestApp`] assembles a module with its
//! routes, dispatches [`TestRequest`]s through the full pipeline and renderer,
//! and captures what was written in a [`TestResponse`].
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use trellis_core::{method, Arguments, ControllerDef, Error, Injectable, ModuleDef, RouteConfig};
//! use trellis_testing::*;
//!
//! struct Hello;
//!
//! impl Injectable for Hello {
//!     fn construct(_: &Arguments) -> Result<Self, Error> {
//!         Ok(Hello)
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let module = ModuleDef::new("app").controller(
//!     ControllerDef::<Hello>::new("hello")
//!         .action("index", method(|_: Arc<Hello>, _| async { Ok("Hello!") })),
//! );
//! let app = TestApp::builder(module)
//!     .route(RouteConfig::get("/hello", "hello/index"))
//!     .build()
//!     .unwrap();
//!
//! let response = app.get("/hello").await;
//! assert_status(&response, 200);
//! assert_eq!(response.body_string(), "Hello!");
//! # });
//! ```
//!
//! ## Mock Services
//!
//! ```
//! use trellis_testing::MockService;
//!
//! let mock = MockService::<String>::new();
//! mock.record_call("get_user");
//!
//! assert_eq!(mock.call_count(), 1);
//! assert!(mock.was_called("get_user"));
//! ```
//!
//! Register `mock.provider()` with [`TestAppBuilder::provider`] to hand the
//! same mock to the application.

mod assertions;
mod mock;
mod recording_sink;
mod test_app;
mod test_request;
mod test_response;

pub use assertions::{
    assert_body_contains, assert_client_error, assert_content_type, assert_header, assert_json,
    assert_redirect, assert_server_error, assert_status, assert_success,
};
pub use mock::{MockService, Spy};
pub use recording_sink::RecordingSink;
pub use test_app::{TestApp, TestAppBuilder};
pub use test_request::TestRequest;
pub use test_response::TestResponse;

// Re-export common testing utilities
pub use tokio::test as tokio_test;
