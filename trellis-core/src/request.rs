//! Request-scoped service.
//!
//! Every request scope holds one [`Request`]. Controllers and filters that
//! declare it as a dependency read the incoming request through it and use
//! it to steer the response: status, content type, redirects and the
//! cooperative `stop_chain` short-circuit.

use crate::routing::{parse_query_string, split_query};
use crate::status::HttpStatus;
use crate::{HttpMethod, RequestContext, ResolvedRoute};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Response settings collected while the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseState {
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub redirect: Option<String>,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: HttpStatus::Ok.code(),
            content_type: None,
            headers: Vec::new(),
            redirect: None,
        }
    }
}

pub struct Request {
    id: Uuid,
    context: RequestContext,
    route: ResolvedRoute,
    query: HashMap<String, String>,
    stopped: AtomicBool,
    response: Mutex<ResponseState>,
}

impl Request {
    pub fn new(context: RequestContext, route: ResolvedRoute) -> Self {
        Self::with_id(Uuid::new_v4(), context, route)
    }

    /// Request carrying an id assigned before routing.
    pub fn with_id(id: Uuid, context: RequestContext, route: ResolvedRoute) -> Self {
        let query = split_query(&context.path)
            .1
            .map(parse_query_string)
            .unwrap_or_default();
        Self {
            id,
            context,
            route,
            query,
            stopped: AtomicBool::new(false),
            response: Mutex::new(ResponseState::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> HttpMethod {
        self.route.method
    }

    /// Raw path, query string included.
    pub fn path(&self) -> &str {
        &self.context.path
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.context.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.context.header(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.context.body
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.route.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.route.param(name)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Route name, e.g. `core/index`.
    pub fn route(&self) -> &str {
        &self.route.route
    }

    pub fn resolved_route(&self) -> &ResolvedRoute {
        &self.route
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Skip every remaining stage of this request's pipeline.
    pub fn stop_chain(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_chain_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn set_status_code(&self, status: u16) {
        self.response.lock().status = status;
    }

    pub fn set_content_type(&self, content_type: impl Into<String>) {
        self.response.lock().content_type = Some(content_type.into());
    }

    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.response.lock().headers.push((name.into(), value.into()));
    }

    /// Redirect to `url` with `status` and stop the chain.
    pub fn redirect_to(&self, url: impl Into<String>, status: u16) {
        {
            let mut response = self.response.lock();
            response.status = status;
            response.redirect = Some(url.into());
        }
        self.stop_chain();
    }

    pub fn response_state(&self) -> ResponseState {
        self.response.lock().clone()
    }
}
