// Captured response

use crate::RecordingSink;
use serde::de::DeserializeOwned;

/// A response as the client would see it.
#[derive(Debug, Clone)]
pub struct TestResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl TestResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Header value, case-insensitive on the name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

impl TestResponse {
    pub(crate) fn failed(err: &trellis_core::Error) -> Self {
        Self {
            status: 0,
            headers: Vec::new(),
            body: err.to_string().into_bytes(),
        }
    }
}

impl From<RecordingSink> for TestResponse {
    /// A sink that never received headers reads as status 0.
    fn from(sink: RecordingSink) -> Self {
        Self {
            status: sink.status().unwrap_or(0),
            headers: sink.headers().to_vec(),
            body: sink.body().to_vec(),
        }
    }
}

#[cfg(test)]
impl TestResponse {
    pub(crate) fn fixture(status: u16, headers: &[(&str, &str)], body: &str) -> Self {
        Self {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.as_bytes().to_vec(),
        }
    }
}
