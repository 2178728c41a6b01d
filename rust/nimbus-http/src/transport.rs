//! The transport seam: how a [`Session`](crate::Session) reaches a server.
//!
//! A [`Transport`] opens a [`Connection`] to a [`Target`]; a connection sends
//! one [`Outgoing`] request at a time and hands back an [`Incoming`]
//! response whose body is streamed. The production implementation is
//! [`ReqwestTransport`]; tests substitute a scripted transport.

use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};
use url::Url;

use crate::{HeaderSet, HttpError, TrustPolicy};

mod client;
pub use client::*;

/// The scheme, host and port a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    scheme: String,
    host: String,
    port: u16,
}

impl Target {
    /// Derives the target of a server URL. Only `http` and `https` are
    /// accepted; the port defaults to 80 or 443.
    pub fn from_url(url: &Url) -> Result<Self, HttpError> {
        let scheme = url.scheme().to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(HttpError::UnsupportedScheme(scheme));
        }
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| HttpError::Connect(format!("URL has no host: {url}")))?
            .to_string();
        let port = url
            .port_or_known_default()
            .unwrap_or(if scheme == "https" { 443 } else { 80 });

        Ok(Self { scheme, host, port })
    }

    /// `http` or `https`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The host name or address literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port, defaulted from the scheme when the URL omitted it.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether this target requires TLS.
    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    /// `host:port`, as sent in the `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Joins this target with a path-and-query into a full URL string.
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}://{}{}", self.scheme, self.authority(), path_and_query)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority())
    }
}

/// Settings applied when a transport opens a connection.
#[derive(Clone)]
pub struct ConnectOptions {
    /// User-Agent sent with every request
    pub user_agent: String,
    /// Upper bound on establishing the connection. There is no overall
    /// request timeout.
    pub connect_timeout: Duration,
    /// Forward proxy every request is routed through
    pub proxy: Option<Url>,
    /// Decides which certificate verification failures are tolerated
    pub trust: Arc<dyn TrustPolicy>,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("user_agent", &self.user_agent)
            .field("connect_timeout", &self.connect_timeout)
            .field("proxy", &self.proxy.as_ref().map(Url::as_str))
            .finish_non_exhaustive()
    }
}

/// A request as handed to a connection.
#[derive(Debug)]
pub struct Outgoing<'a> {
    /// Upper-case verb
    pub method: &'a Method,
    /// Path with the query appended, always starting with `/`
    pub path_and_query: &'a str,
    /// Request headers
    pub headers: &'a HeaderSet,
    /// Optional request body
    pub body: Option<&'a [u8]>,
}

/// A response as produced by a connection. The body is read lazily.
pub struct Incoming {
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderSet,
    /// Streamed response body
    pub body: Box<dyn Read + Send>,
}

impl fmt::Debug for Incoming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Incoming")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// An established connection to one target.
pub trait Connection: Send {
    /// Sends a request and waits for the response head.
    fn send(&mut self, outgoing: Outgoing<'_>) -> Result<Incoming, HttpError>;
}

/// Opens connections to servers.
pub trait Transport: Send + Sync {
    /// Whether this transport can speak HTTPS.
    fn supports_tls(&self) -> bool;

    /// Opens a connection to `target` with the given options.
    fn connect(
        &self,
        target: &Target,
        options: &ConnectOptions,
    ) -> Result<Box<dyn Connection>, HttpError>;
}
