// Test assertions for captured responses

use crate::TestResponse;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// Assert that a response has a specific status code
pub fn assert_status(response: &TestResponse, expected: u16) {
    let actual = response.status();
    assert_eq!(
        actual, expected,
        "Expected status {}, got {}",
        expected, actual
    );
}

/// Assert that a response body holds JSON equal to `expected`
pub fn assert_json<T>(response: &TestResponse, expected: &T)
where
    T: DeserializeOwned + PartialEq + Debug,
{
    let actual: T = response
        .body_json()
        .expect("Failed to deserialize response body");
    assert_eq!(actual, *expected, "JSON bodies do not match");
}

/// Assert that a response has a specific header
pub fn assert_header(response: &TestResponse, key: &str, expected: &str) {
    let actual = response.header(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected header '{}' to be '{}', got {:?}",
        key,
        expected,
        actual
    );
}

pub fn assert_body_contains(response: &TestResponse, expected: &str) {
    let body = response.body_string();
    assert!(
        body.contains(expected),
        "Expected body to contain '{}', but it didn't. Body: {}",
        expected,
        body
    );
}

fn assert_status_class(response: &TestResponse, class: u16) {
    let status = response.status();
    assert_eq!(
        status / 100,
        class,
        "expected a {}xx status, got {}",
        class,
        status
    );
}

/// 2xx
pub fn assert_success(response: &TestResponse) {
    assert_status_class(response, 2);
}

/// 4xx
pub fn assert_client_error(response: &TestResponse) {
    assert_status_class(response, 4);
}

/// 5xx
pub fn assert_server_error(response: &TestResponse) {
    assert_status_class(response, 5);
}

/// Assert that the content type starts with `expected`, ignoring parameters
pub fn assert_content_type(response: &TestResponse, expected: &str) {
    let content_type = response.content_type();
    assert!(
        content_type
            .map(|ct| ct.split(';').next().unwrap_or_default().trim() == expected)
            .unwrap_or(false),
        "Expected content type {}, got {:?}",
        expected,
        content_type
    );
}

/// Assert a redirect to `location`
pub fn assert_redirect(response: &TestResponse, location: &str) {
    assert_status_class(response, 3);
    assert_header(response, "location", location);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> TestResponse {
        TestResponse::fixture(status, &[], body)
    }

    #[test]
    fn test_assert_status_ranges() {
        assert_status(&response(200, "OK"), 200);
        for status in [200, 201, 204] {
            assert_success(&response(status, ""));
        }
        for status in [400, 401, 403, 404] {
            assert_client_error(&response(status, ""));
        }
        for status in [500, 502, 503] {
            assert_server_error(&response(status, ""));
        }
    }

    #[test]
    fn test_assert_body_contains() {
        let response = response(200, "Hello World from Trellis");
        assert_body_contains(&response, "Hello");
        assert_body_contains(&response, "Trellis");
        assert_body_contains(&response, "");
    }

    #[test]
    #[should_panic(expected = "Expected status 404")]
    fn test_assert_status_mismatch_panics() {
        assert_status(&response(200, "OK"), 404);
    }

    #[test]
    fn test_assert_headers() {
        let response = TestResponse::fixture(
            200,
            &[("Content-Type", "application/json; charset=utf-8"), ("X-Custom", "value")],
            r#"{"status":"ok"}"#,
        );
        assert_header(&response, "x-custom", "value");
        assert_content_type(&response, "application/json");
        assert_json(&response, &serde_json::json!({ "status": "ok" }));
    }

    #[test]
    fn test_assert_redirect() {
        let response = TestResponse::fixture(301, &[("Location", "/users/1")], "");
        assert_redirect(&response, "/users/1");
    }
}
