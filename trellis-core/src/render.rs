// Rendering adapter between pipeline outcomes and the transport

use crate::logging::{error, warn};
use crate::pipeline::RequestOutcome;
use crate::status::reason_phrase;
use crate::{Chain, Error};
use uuid::Uuid;

/// Response header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Transport-side response writer.
pub trait ResponseSink: Send {
    fn write_header(&mut self, status: u16, headers: &[(String, String)]) -> Result<(), Error>;

    fn write(&mut self, chunk: &[u8]) -> Result<(), Error>;

    fn end(&mut self) -> Result<(), Error>;
}

/// What the error path knows about the failed request.
#[derive(Debug, Clone, Copy)]
pub struct ErrorContext<'a> {
    pub request_id: Option<Uuid>,
    /// Matched route name; unset when routing failed
    pub route: Option<&'a str>,
    pub method: &'a str,
    pub path: &'a str,
}

/// Writes outcomes and errors through a [`ResponseSink`].
pub trait Renderer: Send + Sync {
    fn render(&self, outcome: &RequestOutcome, sink: &mut dyn ResponseSink) -> Result<(), Error>;

    fn render_error(
        &self,
        error: &Error,
        context: ErrorContext<'_>,
        sink: &mut dyn ResponseSink,
    ) -> Result<(), Error>;
}

#[derive(Debug, Clone, Default)]
pub struct DefaultRenderer;

impl DefaultRenderer {
    fn default_content_type(chain: &Chain) -> Option<&'static str> {
        match chain {
            Chain::Empty => None,
            Chain::Text(_) => Some("text/html; charset=utf-8"),
            Chain::Bytes(_) => Some("application/octet-stream"),
        }
    }
}

impl Renderer for DefaultRenderer {
    fn render(&self, outcome: &RequestOutcome, sink: &mut dyn ResponseSink) -> Result<(), Error> {
        let state = &outcome.response;
        let body = outcome.chain.clone().into_bytes();

        let mut headers = Vec::new();
        if let Some(content_type) = state
            .content_type
            .as_deref()
            .or_else(|| Self::default_content_type(&outcome.chain))
        {
            headers.push(("content-type".to_string(), content_type.to_string()));
        }
        if let Some(location) = &state.redirect {
            headers.push(("location".to_string(), location.clone()));
        }
        headers.extend(state.headers.iter().cloned());
        headers.push((REQUEST_ID_HEADER.to_string(), outcome.request_id.to_string()));
        headers.push(("content-length".to_string(), body.len().to_string()));

        sink.write_header(state.status, &headers)?;
        if !body.is_empty() {
            sink.write(&body)?;
        }
        sink.end()
    }

    fn render_error(
        &self,
        err: &Error,
        context: ErrorContext<'_>,
        sink: &mut dyn ResponseSink,
    ) -> Result<(), Error> {
        let status = err.status_code();
        let request_id = context.request_id.map(|id| id.to_string()).unwrap_or_default();
        if status >= 500 {
            error!(
                request_id = %request_id,
                route = context.route.unwrap_or_default(),
                method = context.method,
                path = context.path,
                status,
                error = %err,
                "Request failed"
            );
        } else {
            warn!(
                request_id = %request_id,
                route = context.route.unwrap_or_default(),
                method = context.method,
                path = context.path,
                status,
                error = %err,
                "Request rejected"
            );
        }

        let body = format!("{} {}\n{}\n", status, reason_phrase(status), err);
        let mut headers = vec![(
            "content-type".to_string(),
            "text/plain; charset=utf-8".to_string(),
        )];
        if let Some(id) = context.request_id {
            headers.push((REQUEST_ID_HEADER.to_string(), id.to_string()));
        }
        headers.push(("content-length".to_string(), body.len().to_string()));
        sink.write_header(status, &headers)?;
        sink.write(body.as_bytes())?;
        sink.end()
    }
}
