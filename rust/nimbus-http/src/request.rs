//! A single HTTP exchange bound to a [`Session`].
//!
//! A [`Request`] is built from a verb, a path and a query, collects headers
//! and an optional body, and is submitted at most once. Authentication
//! schemes hook into submission through a [`Decorator`], which may add
//! headers right before the request goes out and inspect the response right
//! after it arrives.

use std::io::Read;

use http::{Method, StatusCode};

use crate::transport::{Incoming, Outgoing};
use crate::{HeaderSet, HttpError, Session};

/// How many times a request is resent after the server drops a reused
/// connection before answering.
pub const MAX_RETRIES: usize = 3;

/// Everything about a request that a [`Decorator`] may inspect or change
/// before it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    method: Method,
    path: String,
    query: String,
    headers: HeaderSet,
}

impl RequestHead {
    /// A head with no headers. The verb is upper-cased and the path gains a
    /// leading `/` when missing.
    pub fn new(method: Method, path: &str, query: &str) -> Self {
        let method = Method::from_bytes(method.as_str().to_ascii_uppercase().as_bytes())
            .unwrap_or(method);
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Self {
            method,
            path,
            query: query.trim_start_matches('?').to_string(),
            headers: HeaderSet::new(),
        }
    }

    /// The request verb.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The query string without the leading `?`; may be empty.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// `path?query`, or just the path when the query is empty.
    pub fn full_path(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    /// Adds or replaces a request header.
    pub fn set_header(&mut self, key: &str, value: impl Into<String>) {
        self.headers.add(key, value);
    }
}

/// Hooks an authentication scheme into request submission.
pub trait Decorator {
    /// Called right before the request is sent. Headers added here are
    /// included in the request. An error aborts submission.
    fn before_submit(&self, head: &mut RequestHead) -> Result<(), HttpError>;

    /// Called once the response head has arrived.
    fn after_submit(&self, _head: &RequestHead, _status: StatusCode, _headers: &HeaderSet) {}
}

/// Coarse classification of a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// 1xx
    Informational,
    /// 2xx
    Success,
    /// 3xx
    Redirection,
    /// 4xx
    ClientError,
    /// 5xx
    ServerError,
    /// Anything outside 100..600
    Unknown,
}

impl From<StatusCode> for StatusClass {
    fn from(status: StatusCode) -> Self {
        match status.as_u16() / 100 {
            1 => StatusClass::Informational,
            2 => StatusClass::Success,
            3 => StatusClass::Redirection,
            4 => StatusClass::ClientError,
            5 => StatusClass::ServerError,
            _ => StatusClass::Unknown,
        }
    }
}

struct Response {
    status: StatusCode,
    headers: HeaderSet,
    body: Box<dyn Read + Send>,
}

enum State {
    Pending,
    Submitted(Response),
    Failed(HttpError),
}

/// A request on a [`Session`]. Borrows the session mutably for its whole
/// life, so a session carries at most one request at a time.
pub struct Request<'s> {
    session: &'s mut Session,
    decorator: Option<&'s dyn Decorator>,
    head: RequestHead,
    body: Option<Vec<u8>>,
    state: State,
}

impl<'s> Request<'s> {
    pub(crate) fn new(session: &'s mut Session, method: Method, path: &str, query: &str) -> Self {
        Self {
            session,
            decorator: None,
            head: RequestHead::new(method, path, query),
            body: None,
            state: State::Pending,
        }
    }

    /// Attaches a decorator that runs around submission.
    pub fn with_decorator(mut self, decorator: &'s dyn Decorator) -> Self {
        self.decorator = Some(decorator);
        self
    }

    /// The request head as it will be (or was) sent.
    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    /// `path?query` of this request.
    pub fn full_path(&self) -> String {
        self.head.full_path()
    }

    /// Adds or replaces a request header.
    pub fn set_header(&mut self, key: &str, value: impl Into<String>) {
        self.head.set_header(key, value);
    }

    /// Sets the request body.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = Some(body.into());
    }

    /// Sends the request and waits for the response head.
    ///
    /// Submitting again returns the outcome of the first submission without
    /// touching the network. A dropped keep-alive connection is retried on a
    /// fresh connection up to [`MAX_RETRIES`] times.
    pub fn submit(&mut self) -> Result<(), HttpError> {
        match &self.state {
            State::Submitted(_) => return Ok(()),
            State::Failed(error) => return Err(error.clone()),
            State::Pending => {}
        }

        match self.exchange() {
            Ok(response) => {
                self.state = State::Submitted(response);
                Ok(())
            }
            Err(error) => {
                self.state = State::Failed(error.clone());
                Err(error)
            }
        }
    }

    fn exchange(&mut self) -> Result<Response, HttpError> {
        if let Some(decorator) = self.decorator {
            decorator.before_submit(&mut self.head)?;
        }

        let path_and_query = self.head.full_path();
        let mut attempt = 0;
        let incoming = loop {
            tracing::debug!(
                method = %self.head.method,
                server = %self.session.host_and_port(),
                path = %path_and_query,
                attempt,
                "Sending request"
            );
            tracing::trace!(
                "Request headers:\nHost: {}\n{}",
                self.session.host_and_port(),
                self.head.headers
            );

            let outgoing = Outgoing {
                method: &self.head.method,
                path_and_query: &path_and_query,
                headers: &self.head.headers,
                body: self.body.as_deref(),
            };
            match self.session.send(outgoing) {
                Ok(incoming) => break incoming,
                Err(error) if error.is_retryable() && attempt < MAX_RETRIES => {
                    tracing::debug!(%error, "Connection dropped, retrying");
                    self.session.terminate();
                    attempt += 1;
                }
                Err(error) if error.is_retryable() => {
                    self.session.terminate();
                    return Err(HttpError::Transport(format!(
                        "gave up after {MAX_RETRIES} retries: {error}"
                    )));
                }
                Err(error) => {
                    self.session.terminate();
                    return Err(error);
                }
            }
        };

        let Incoming {
            status,
            headers,
            body,
        } = incoming;
        tracing::debug!(
            status = status.as_u16(),
            class = ?StatusClass::from(status),
            "Received response"
        );
        tracing::trace!("Response headers:\n{}", headers);

        if let Some(decorator) = self.decorator {
            decorator.after_submit(&self.head, status, &headers);
        }

        Ok(Response {
            status,
            headers,
            body,
        })
    }

    fn response(&self) -> Option<&Response> {
        match &self.state {
            State::Submitted(response) => Some(response),
            _ => None,
        }
    }

    /// Whether the request has been submitted successfully.
    pub fn is_submitted(&self) -> bool {
        self.response().is_some()
    }

    /// The response status, once submitted.
    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(|response| response.status)
    }

    /// The response status class, once submitted.
    pub fn status_class(&self) -> Option<StatusClass> {
        self.status().map(StatusClass::from)
    }

    /// All response headers, or `None` before submission.
    pub fn response_headers(&self) -> Option<&HeaderSet> {
        self.response().map(|response| &response.headers)
    }

    /// Looks up a response header, ignoring case.
    pub fn response_header(&self, key: &str) -> Option<&str> {
        self.response()
            .and_then(|response| response.headers.value(key))
    }

    /// The declared `Content-Length` of the response, if present and numeric.
    pub fn response_body_length(&self) -> Option<u64> {
        self.response()
            .and_then(|response| response.headers.get("content-length"))
            .and_then(|header| header.value_as_u64())
    }

    /// Reads response body bytes into `buffer` until it is full or the body
    /// ends, and returns how many bytes were copied.
    pub fn read_body(&mut self, buffer: &mut [u8]) -> Result<usize, HttpError> {
        let State::Submitted(response) = &mut self.state else {
            return Ok(0);
        };
        let mut filled = 0;
        while filled < buffer.len() {
            match response.body.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(count) => filled += count,
                Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error.into()),
            }
        }
        Ok(filled)
    }

    /// Reads the whole remaining response body.
    pub fn read_body_to_end(&mut self) -> Result<Vec<u8>, HttpError> {
        let State::Submitted(response) = &mut self.state else {
            return Ok(Vec::new());
        };
        let mut body = Vec::new();
        response.body.read_to_end(&mut body)?;
        Ok(body)
    }
}
