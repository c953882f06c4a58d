// Mock utilities for testing

use parking_lot::Mutex;
use std::sync::Arc;
use trellis_core::{Provider, Token};

/// Records calls and hands back a canned value.
///
/// Clones share their call log, so the copy registered with an application
/// and the copy kept by the test see the same calls.
#[derive(Clone)]
pub struct MockService<T> {
    calls: Arc<Mutex<Vec<String>>>,
    return_value: Arc<Mutex<Option<T>>>,
}

impl<T> MockService<T> {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            return_value: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_return(self, value: T) -> Self {
        *self.return_value.lock() = Some(value);
        self
    }

    pub fn record_call(&self, method: &str) {
        self.calls.lock().push(method.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.calls.lock().iter().any(|call| call == method)
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn get_return(&self) -> Option<T>
    where
        T: Clone,
    {
        self.return_value.lock().clone()
    }
}

impl<T: Clone + Send + 'static> MockService<T> {
    /// Value provider for this mock under its own type token
    pub fn provider(&self) -> Provider {
        self.provide_as(Token::of::<MockService<T>>())
    }

    /// Value provider for this mock under `token`
    pub fn provide_as(&self, token: impl Into<Token>) -> Provider {
        Provider::value(token, self.clone())
    }
}

impl<T> Default for MockService<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a real value and tracks how it was used.
#[derive(Clone)]
pub struct Spy<T> {
    inner: T,
    calls: Arc<Mutex<Vec<String>>>,
}

impl<T> Spy<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record(&self, method: &str) {
        self.calls.lock().push(method.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.calls.lock().iter().any(|call| call == method)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Clone + Send + Sync + 'static> Spy<T> {
    pub fn provider(&self) -> Provider {
        Provider::value(Token::of::<Spy<T>>(), self.clone())
    }
}
