mod http;

pub use self::http::{
    HttpError, HttpHeaders, HttpRequest, HttpResponse, HttpResult, HttpTransport, ValidatedUrl,
    DEFAULT_TIMEOUT_MS, MAX_RESPONSE_BODY_SIZE, MAX_TIMEOUT_MS, MAX_URL_LENGTH,
};

use std::sync::Arc;

/// Shared handle to the shell's network stack.
pub type AppHttp = Arc<dyn HttpTransport>;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    //! Scripted transport for unit tests and shell-less harnesses.

    use std::collections::VecDeque;
    use std::sync::{Mutex, PoisonError};

    use super::*;

    type Responder = Box<dyn Fn(&HttpRequest) -> HttpResult + Send + Sync>;

    /// Replays queued outcomes in order, then falls back to a responder.
    ///
    /// Every executed request is recorded so tests can inspect URLs and
    /// headers after the fact.
    pub struct StubTransport {
        queued: Mutex<VecDeque<Responder>>,
        fallback: Option<Responder>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl StubTransport {
        pub fn new() -> Self {
            Self {
                queued: Mutex::new(VecDeque::new()),
                fallback: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Answers every request not covered by the queue.
        pub fn with_fallback<F>(mut self, responder: F) -> Self
        where
            F: Fn(&HttpRequest) -> HttpResult + Send + Sync + 'static,
        {
            self.fallback = Some(Box::new(responder));
            self
        }

        pub fn push_json(&self, status: u16, body: serde_json::Value) {
            let bytes = serde_json::to_vec(&body).unwrap_or_default();
            self.push_response(status, bytes);
        }

        pub fn push_response(&self, status: u16, body: impl Into<bytes::Bytes>) {
            let body = body.into();
            self.push_with(move |req| {
                Ok(HttpResponse::new(
                    status,
                    HttpHeaders::new(),
                    body.clone(),
                    req.request_id(),
                    1,
                ))
            });
        }

        pub fn push_error(&self, error: HttpError) {
            self.push_with(move |_| Err(error.clone()));
        }

        pub fn push_with<F>(&self, responder: F)
        where
            F: Fn(&HttpRequest) -> HttpResult + Send + Sync + 'static,
        {
            self.queued
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(Box::new(responder));
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }
    }

    impl Default for StubTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for StubTransport {
        async fn execute(&self, request: HttpRequest) -> HttpResult {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());

            let next = self
                .queued
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();

            match (next, &self.fallback) {
                (Some(responder), _) => responder(&request),
                (None, Some(fallback)) => fallback(&request),
                (None, None) => Err(HttpError::ConnectionError {
                    host: request.url().host().to_string(),
                    message: "no scripted response".to_string(),
                }),
            }
        }
    }
}
