// Request context, HTTP methods and the pipeline chain value

use crate::Error;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// HTTP methods the router accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    HEAD,
    DELETE,
    TRACE,
    OPTIONS,
    CONNECT,
    POST,
    PUT,
    PATCH,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 9] = [
        HttpMethod::GET,
        HttpMethod::HEAD,
        HttpMethod::DELETE,
        HttpMethod::TRACE,
        HttpMethod::OPTIONS,
        HttpMethod::CONNECT,
        HttpMethod::POST,
        HttpMethod::PUT,
        HttpMethod::PATCH,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::TRACE => "TRACE",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::CONNECT => "CONNECT",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::PATCH => "PATCH",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    /// Unrecognized methods are an error, never a default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .iter()
            .copied()
            .find(|method| method.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidMethod(s.to_string()))
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value threaded between pipeline stages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Chain {
    #[default]
    Empty,
    Text(String),
    Bytes(Bytes),
}

impl Chain {
    pub fn is_empty(&self) -> bool {
        matches!(self, Chain::Empty)
    }

    /// Text view of the value; bytes are decoded lossily.
    pub fn as_text(&self) -> String {
        match self {
            Chain::Empty => String::new(),
            Chain::Text(text) => text.clone(),
            Chain::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Chain::Empty => Bytes::new(),
            Chain::Text(text) => Bytes::from(text),
            Chain::Bytes(bytes) => bytes,
        }
    }
}

impl From<()> for Chain {
    fn from(_: ()) -> Self {
        Chain::Empty
    }
}

impl From<String> for Chain {
    fn from(value: String) -> Self {
        Chain::Text(value)
    }
}

impl From<&str> for Chain {
    fn from(value: &str) -> Self {
        Chain::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Chain {
    fn from(value: Vec<u8>) -> Self {
        Chain::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for Chain {
    fn from(value: Bytes) -> Self {
        Chain::Bytes(value)
    }
}

impl<T: Into<Chain>> From<Option<T>> for Chain {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// What the transport hands the core for each request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Header lookup, case-insensitive on the name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
