// In-memory response sink

use serde::de::DeserializeOwned;
use trellis_core::{Error, ResponseSink};

/// Captures everything written through it.
///
/// A failing sink rejects body writes, which is how tests simulate a
/// connection dropped mid-response.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    ended: bool,
    fail_writes: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn status(&self) -> Option<u16> {
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

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

impl ResponseSink for RecordingSink {
    fn write_header(&mut self, status: u16, headers: &[(String, String)]) -> Result<(), Error> {
        if self.status.is_some() {
            return Err(Error::internal("headers already written"));
        }
        self.status = Some(status);
        self.headers = headers.to_vec();
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if self.fail_writes {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection closed",
            )));
        }
        if self.ended {
            return Err(Error::internal("write after end"));
        }
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    fn end(&mut self) -> Result<(), Error> {
        self.ended = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_response() {
        let mut sink = RecordingSink::new();
        sink.write_header(201, &[("Content-Type".into(), "application/json".into())])
            .unwrap();
        sink.write(br#"{"id":1}"#).unwrap();
        sink.end().unwrap();

        assert_eq!(sink.status(), Some(201));
        assert_eq!(sink.header("content-type"), Some("application/json"));
        assert_eq!(sink.body_json::<serde_json::Value>().unwrap()["id"], 1);
        assert!(sink.is_ended());
        assert!(sink.write(b"late").is_err());
        assert!(sink.write_header(200, &[]).is_err());
    }

    #[test]
    fn test_failing_sink() {
        let mut sink = RecordingSink::failing();
        assert!(sink.write_header(200, &[]).is_ok());
        assert!(matches!(sink.write(b"x"), Err(Error::Io(_))));
    }
}
