//! Scripted transports shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::bus::EventBus;
use crate::net::api::ApiClient;
use crate::net::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::net::types::Method;

/// One canned answer for a route.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, Value),
    Raw(u16, Vec<u8>),
    Fail(String),
    Delayed(Duration, Box<Reply>),
    /// Never resolves.
    Hang,
}

impl Reply {
    pub fn ok(value: Value) -> Self {
        Self::Json(200, value)
    }

    pub fn status(status: u16) -> Self {
        Self::Raw(status, Vec::new())
    }

    pub fn after(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

/// Transport answering from per-route queues.
///
/// Each route pops its queue in order; the final reply repeats forever.
/// Unknown routes answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: Method, path: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_owned()))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub fn body_of(&self, method: Method, path: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.method == method && c.path == path)
            .and_then(|c| c.body.as_deref())
            .and_then(|b| serde_json::from_slice(b).ok())
    }

    fn next_reply(&self, method: Method, path: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&(method, path.to_owned())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Reply::Json(404, serde_json::json!({ "error": "no route" })),
        }
    }
}

async fn resolve(reply: Reply) -> Result<HttpResponse, TransportError> {
    let mut reply = reply;
    loop {
        match reply {
            Reply::Json(status, value) => {
                return Ok(HttpResponse { status, body: serde_json::to_vec(&value).unwrap() });
            }
            Reply::Raw(status, body) => return Ok(HttpResponse { status, body }),
            Reply::Fail(text) => return Err(TransportError(text)),
            Reply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
            Reply::Hang => std::future::pending::<()>().await,
        }
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let reply = self.next_reply(request.method, &request.path);
        self.calls.lock().unwrap().push(request);
        resolve(reply).await
    }
}

/// `ApiClient` over `transport`, announcing on `bus`.
pub fn api_with(transport: &Arc<ScriptedTransport>, bus: &EventBus) -> ApiClient {
    let transport: Arc<dyn HttpTransport> = Arc::clone(transport) as Arc<dyn HttpTransport>;
    ApiClient::new(transport).with_bus(bus.clone())
}
