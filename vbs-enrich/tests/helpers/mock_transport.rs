//! Scripted in-memory HTTP transport

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use vbs_enrich::resilience::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// HTTP response with a status and body
    Status(u16, String),
    /// Connection-level failure
    NetworkError,
    /// Never answers within any sane timeout
    Hang,
}

impl MockReply {
    pub fn ok(body: &str) -> Self {
        MockReply::Status(200, body.to_string())
    }

    pub fn status(status: u16) -> Self {
        MockReply::Status(status, format!("{{\"status_code\": {}}}", status))
    }
}

struct Route {
    pattern: String,
    replies: VecDeque<MockReply>,
}

/// Transport answering from per-URL scripts.
///
/// A request is served by the first route whose pattern is a substring of
/// the URL. Each route pops its replies in order and repeats the last one
/// forever. Unrouted requests get a 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, pattern: &str, replies: Vec<MockReply>) -> Self {
        self.routes.lock().unwrap().push(Route {
            pattern: pattern.to_string(),
            replies: replies.into(),
        });
        self
    }

    /// Every request seen so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose URL contains `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(pattern))
            .count()
    }

    fn next_reply(&self, url: &str) -> MockReply {
        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes.iter_mut().find(|r| url.contains(&r.pattern)) else {
            return MockReply::status(404);
        };
        if route.replies.len() > 1 {
            route.replies.pop_front().unwrap()
        } else {
            route
                .replies
                .front()
                .cloned()
                .unwrap_or_else(|| MockReply::status(404))
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.next_reply(&request.url);
        match reply {
            MockReply::Status(status, body) => Ok(HttpResponse { status, body }),
            MockReply::NetworkError => Err(TransportError("connection refused".to_string())),
            MockReply::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(TransportError("hung request finished".to_string()))
            }
        }
    }
}
