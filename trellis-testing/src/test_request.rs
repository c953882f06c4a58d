// Request builder for tests

use serde::Serialize;
use trellis_core::{HttpMethod, RequestContext};

/// Builds the [`RequestContext`] a transport would hand to the application.
#[derive(Debug, Clone)]
pub struct TestRequest {
    context: RequestContext,
}

impl TestRequest {
    pub fn new(method: impl AsRef<str>, path: impl Into<String>) -> Self {
        Self {
            context: RequestContext::new(method.as_ref(), path),
        }
    }

    pub fn method(method: HttpMethod, path: impl Into<String>) -> Self {
        Self::new(method.as_str(), path)
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::method(HttpMethod::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::method(HttpMethod::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::method(HttpMethod::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::method(HttpMethod::DELETE, path)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.context = self.context.with_header(name, value);
        self
    }

    /// `Authorization: Bearer <token>`
    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", format!("Bearer {}", token))
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.context = self.context.with_body(body.into());
        self
    }

    /// JSON body with a matching content type.
    ///
    /// # Panics
    ///
    /// When `value` cannot be serialized.
    pub fn json<T: Serialize>(self, value: &T) -> Self {
        let body = serde_json::to_vec(value).expect("serializable request body");
        self.header("content-type", "application/json").body(body)
    }

    pub fn build(self) -> RequestContext {
        self.context
    }
}

impl From<TestRequest> for RequestContext {
    fn from(request: TestRequest) -> Self {
        request.build()
    }
}
