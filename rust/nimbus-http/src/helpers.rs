//! A scripted in-memory transport for tests.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use parking_lot::Mutex;
use url::Url;

use crate::transport::{ConnectOptions, Connection, Incoming, Outgoing, Target, Transport};
use crate::{HeaderSet, HttpError};

/// A connection opened through a [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RecordedConnection {
    /// Where the connection was opened to
    pub target: Target,
    /// The proxy it was routed through
    pub proxy: Option<Url>,
    /// The user agent it was opened with
    pub user_agent: String,
}

/// A request sent through a [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RecordedExchange {
    /// The target the request was sent to
    pub target: Target,
    /// Request verb
    pub method: Method,
    /// Path with query
    pub path: String,
    /// Request headers
    pub headers: HeaderSet,
    /// Request body
    pub body: Option<Bytes>,
}

enum Scripted {
    Respond {
        status: StatusCode,
        headers: HeaderSet,
        body: Bytes,
    },
    Fail(HttpError),
}

#[derive(Default)]
struct Script {
    queue: VecDeque<Scripted>,
    connections: Vec<RecordedConnection>,
    exchanges: Vec<RecordedExchange>,
}

/// A [`Transport`] that answers requests from a queue of canned responses
/// and records what was sent. Clones share the same queue and records.
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    tls: bool,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// A transport with an empty queue that claims TLS support.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            tls: true,
        }
    }

    /// Makes the transport report that it cannot speak HTTPS.
    pub fn without_tls(mut self) -> Self {
        self.tls = false;
        self
    }

    /// Queues a response.
    pub fn respond(&self, status: u16, headers: &[(&str, &str)], body: impl Into<Bytes>) -> &Self {
        let mut set = HeaderSet::new();
        for (key, value) in headers {
            set.add(key, *value);
        }
        self.script.lock().queue.push_back(Scripted::Respond {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: set,
            body: body.into(),
        });
        self
    }

    /// Queues a transport failure.
    pub fn fail(&self, error: HttpError) -> &Self {
        self.script.lock().queue.push_back(Scripted::Fail(error));
        self
    }

    /// Number of queued responses not consumed yet.
    pub fn pending(&self) -> usize {
        self.script.lock().queue.len()
    }

    /// Every connection opened so far.
    pub fn connections(&self) -> Vec<RecordedConnection> {
        self.script.lock().connections.clone()
    }

    /// Every request sent so far, including ones that were answered with a
    /// failure.
    pub fn exchanges(&self) -> Vec<RecordedExchange> {
        self.script.lock().exchanges.clone()
    }
}

impl Transport for ScriptedTransport {
    fn supports_tls(&self) -> bool {
        self.tls
    }

    fn connect(
        &self,
        target: &Target,
        options: &ConnectOptions,
    ) -> Result<Box<dyn Connection>, HttpError> {
        self.script.lock().connections.push(RecordedConnection {
            target: target.clone(),
            proxy: options.proxy.clone(),
            user_agent: options.user_agent.clone(),
        });
        Ok(Box::new(ScriptedConnection {
            script: self.script.clone(),
            target: target.clone(),
        }))
    }
}

struct ScriptedConnection {
    script: Arc<Mutex<Script>>,
    target: Target,
}

impl Connection for ScriptedConnection {
    fn send(&mut self, outgoing: Outgoing<'_>) -> Result<Incoming, HttpError> {
        let mut script = self.script.lock();
        script.exchanges.push(RecordedExchange {
            target: self.target.clone(),
            method: outgoing.method.clone(),
            path: outgoing.path_and_query.to_string(),
            headers: outgoing.headers.clone(),
            body: outgoing.body.map(Bytes::copy_from_slice),
        });
        match script.queue.pop_front() {
            Some(Scripted::Respond {
                status,
                headers,
                body,
            }) => Ok(Incoming {
                status,
                headers,
                body: Box::new(Cursor::new(body)),
            }),
            Some(Scripted::Fail(error)) => Err(error),
            None => Err(HttpError::Transport(format!(
                "no scripted response for {} {}",
                outgoing.method, outgoing.path_and_query
            ))),
        }
    }
}
