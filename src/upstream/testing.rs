//! Scripted transport used by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use axum::http::StatusCode;

use crate::upstream::transport::{BackendResponse, BackendTransport, OutboundRequest, TransportError};

/// Records every request and answers from a queue of scripted results.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<BackendResponse, TransportError>>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, status: StatusCode, body: &'static str) -> Self {
        self.push(Ok(BackendResponse::new(status, body)));
        self
    }

    pub fn respond_with(self, response: BackendResponse) -> Self {
        self.push(Ok(response));
        self
    }

    pub fn fail(self) -> Self {
        self.push(Err(TransportError::Request {
            url: "mock".into(),
            reason: "connection refused".into(),
        }));
        self
    }

    fn push(&self, result: Result<BackendResponse, TransportError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendTransport for MockTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<BackendResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::Request {
                    url: request.url.to_string(),
                    reason: "no scripted response".into(),
                })
            })
    }
}
