use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use url::Url;

use crate::transport::{ConnectOptions, Connection, Incoming, Outgoing, Target, Transport};
use crate::{DefaultTrustPolicy, HttpError, Request, TrustPolicy};

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("nimbus/", env!("CARGO_PKG_VERSION"));

/// Connection establishment timeout used when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings that apply to every connection a session opens.
#[derive(Clone)]
pub struct SessionSettings {
    /// User-Agent header value
    pub user_agent: String,
    /// Bound on connection establishment
    pub connect_timeout: Duration,
    /// Certificate trust decisions for HTTPS
    pub trust: Arc<dyn TrustPolicy>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            trust: Arc::new(DefaultTrustPolicy),
        }
    }
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("user_agent", &self.user_agent)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

/// A logical connection to one server.
///
/// The session remembers the server URL and optional proxy, and opens the
/// underlying connection lazily on the first request. Pointing the session
/// at a URL with the same scheme, host and port keeps the connection;
/// anything else tears it down.
pub struct Session {
    transport: Arc<dyn Transport>,
    settings: SessionSettings,
    server: Option<Url>,
    target: Option<Target>,
    proxy: Option<Url>,
    connection: Option<Box<dyn Connection>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("server", &self.server.as_ref().map(Url::as_str))
            .field("proxy", &self.proxy.as_ref().map(Url::as_str))
            .field("connected", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session with no server.
    pub fn new(transport: Arc<dyn Transport>, settings: SessionSettings) -> Self {
        Self {
            transport,
            settings,
            server: None,
            target: None,
            proxy: None,
            connection: None,
        }
    }

    /// Creates a session bound to `url`.
    pub fn connect(
        transport: Arc<dyn Transport>,
        settings: SessionSettings,
        url: &Url,
    ) -> Result<Self, HttpError> {
        let mut session = Self::new(transport, settings);
        session.set_server_url(url)?;
        Ok(session)
    }

    /// Points the session at `url`.
    ///
    /// When the scheme, host and port match the current target only the
    /// stored URL changes and any open connection is kept.
    pub fn set_server_url(&mut self, url: &Url) -> Result<(), HttpError> {
        let target = Target::from_url(url)?;
        if target.is_https() && !self.transport.supports_tls() {
            return Err(HttpError::TlsUnavailable(target.to_string()));
        }

        if self.target.as_ref() == Some(&target) {
            tracing::trace!(%target, "Reusing session target");
        } else {
            tracing::debug!(%target, "Binding session to new target");
            self.terminate();
            self.target = Some(target);
        }
        self.server = Some(url.clone());
        Ok(())
    }

    /// Routes subsequent requests through `proxy`, which must be an `http`
    /// URL. Any open connection is closed.
    pub fn set_proxy_url(&mut self, proxy: &Url) -> Result<(), HttpError> {
        if proxy.scheme() != "http" || proxy.host_str().is_none() {
            return Err(HttpError::InvalidProxy(proxy.to_string()));
        }
        if self.proxy.as_ref() != Some(proxy) {
            self.terminate();
            self.proxy = Some(proxy.clone());
        }
        Ok(())
    }

    /// Stops using a proxy. Any open connection is closed.
    pub fn clear_proxy(&mut self) {
        if self.proxy.take().is_some() {
            self.terminate();
        }
    }

    /// The current server URL.
    pub fn server_url(&self) -> Option<&Url> {
        self.server.as_ref()
    }

    /// The current proxy URL.
    pub fn proxy_url(&self) -> Option<&Url> {
        self.proxy.as_ref()
    }

    /// The bound scheme, host and port.
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// The scheme of the current target.
    pub fn scheme(&self) -> Option<&str> {
        self.target.as_ref().map(Target::scheme)
    }

    /// The host of the current target.
    pub fn host(&self) -> Option<&str> {
        self.target.as_ref().map(Target::host)
    }

    /// The port of the current target.
    pub fn port(&self) -> Option<u16> {
        self.target.as_ref().map(Target::port)
    }

    /// `host:port` of the current target, or `<none>:<0000>` when unbound.
    pub fn host_and_port(&self) -> String {
        match &self.target {
            Some(target) => target.authority(),
            None => "<none>:<0000>".to_string(),
        }
    }

    /// Whether the transport can serve `https` URLs.
    pub fn can_use_https(&self) -> bool {
        self.transport.supports_tls()
    }

    /// Whether an underlying connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Closes the underlying connection. The next request reopens it.
    pub fn terminate(&mut self) {
        if self.connection.take().is_some() {
            tracing::trace!(server = %self.host_and_port(), "Closed connection");
        }
    }

    /// Starts a request on this session.
    pub fn request(&mut self, method: Method, path: &str, query: &str) -> Request<'_> {
        Request::new(self, method, path, query)
    }

    pub(crate) fn send(&mut self, outgoing: Outgoing<'_>) -> Result<Incoming, HttpError> {
        let target = self.target.as_ref().ok_or(HttpError::MissingServer)?;
        if self.connection.is_none() {
            let options = ConnectOptions {
                user_agent: self.settings.user_agent.clone(),
                connect_timeout: self.settings.connect_timeout,
                proxy: self.proxy.clone(),
                trust: self.settings.trust.clone(),
            };
            self.connection = Some(self.transport.connect(target, &options)?);
        }
        let connection = self.connection.as_mut().ok_or(HttpError::MissingServer)?;
        connection.send(outgoing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::ScriptedTransport;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    fn new_session(transport: &ScriptedTransport) -> Session {
        Session::new(Arc::new(transport.clone()), SessionSettings::default())
    }

    fn get(session: &mut Session, path: &str) -> Result<(), HttpError> {
        session.request(Method::GET, path, "").submit()
    }

    #[test]
    fn it_connects_lazily() -> TestResult {
        let transport = ScriptedTransport::new();
        transport.respond(200, &[], "");
        let mut session = new_session(&transport);

        session.set_server_url(&Url::parse("http://example.com/a")?)?;
        assert!(!session.is_connected());
        assert!(transport.connections().is_empty());

        get(&mut session, "/a")?;
        assert!(session.is_connected());
        assert_eq!(transport.connections().len(), 1);
        Ok(())
    }

    #[test]
    fn it_reuses_the_connection_for_the_same_target() -> TestResult {
        let transport = ScriptedTransport::new();
        transport.respond(200, &[], "");
        transport.respond(200, &[], "");
        let mut session = new_session(&transport);

        session.set_server_url(&Url::parse("http://example.com/a")?)?;
        get(&mut session, "/a")?;
        session.set_server_url(&Url::parse("http://EXAMPLE.com:80/other/path")?)?;
        get(&mut session, "/b")?;

        assert_eq!(transport.connections().len(), 1);
        assert_eq!(
            session.server_url().map(Url::as_str),
            Some("http://example.com/other/path")
        );
        Ok(())
    }

    #[test]
    fn it_reconnects_when_the_target_changes() -> TestResult {
        let transport = ScriptedTransport::new();
        transport.respond(200, &[], "");
        transport.respond(200, &[], "");
        let mut session = new_session(&transport);

        session.set_server_url(&Url::parse("http://example.com/a")?)?;
        get(&mut session, "/a")?;
        session.set_server_url(&Url::parse("http://example.com:8080/a")?)?;
        assert!(!session.is_connected());
        get(&mut session, "/a")?;

        let connections = transport.connections();
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[1].target.port(), 8080);
        Ok(())
    }

    #[test]
    fn it_rejects_https_without_tls() -> TestResult {
        let transport = ScriptedTransport::new().without_tls();
        let mut session = new_session(&transport);

        assert!(!session.can_use_https());
        let result = session.set_server_url(&Url::parse("https://example.com/a")?);
        assert_eq!(
            result,
            Err(HttpError::TlsUnavailable("https://example.com:443".into()))
        );
        assert_eq!(session.server_url(), None);
        Ok(())
    }

    #[test]
    fn it_only_accepts_http_proxies() -> TestResult {
        let transport = ScriptedTransport::new();
        let mut session = new_session(&transport);

        let result = session.set_proxy_url(&Url::parse("https://proxy:3128")?);
        assert!(matches!(result, Err(HttpError::InvalidProxy(_))));
        assert_eq!(session.proxy_url(), None);

        session.set_proxy_url(&Url::parse("http://proxy:3128")?)?;
        assert_eq!(session.proxy_url().map(Url::as_str), Some("http://proxy:3128/"));
        Ok(())
    }

    #[test]
    fn it_routes_through_the_proxy() -> TestResult {
        let transport = ScriptedTransport::new();
        transport.respond(200, &[], "");
        transport.respond(200, &[], "");
        let mut session = new_session(&transport);

        session.set_server_url(&Url::parse("http://example.com/a")?)?;
        get(&mut session, "/a")?;
        session.set_proxy_url(&Url::parse("http://proxy:3128")?)?;
        assert!(!session.is_connected());
        get(&mut session, "/a")?;

        let connections = transport.connections();
        assert_eq!(connections[0].proxy, None);
        assert_eq!(
            connections[1].proxy.as_ref().map(Url::as_str),
            Some("http://proxy:3128/")
        );
        Ok(())
    }

    #[test]
    fn it_requires_a_server() {
        let transport = ScriptedTransport::new();
        let mut session = new_session(&transport);

        assert_eq!(session.host_and_port(), "<none>:<0000>");
        assert_eq!(get(&mut session, "/a"), Err(HttpError::MissingServer));
    }

    #[test]
    fn it_terminates_idempotently() -> TestResult {
        let transport = ScriptedTransport::new();
        transport.respond(200, &[], "");
        let mut session = new_session(&transport);
        session.set_server_url(&Url::parse("http://example.com/")?)?;
        get(&mut session, "/")?;

        session.terminate();
        session.terminate();
        assert!(!session.is_connected());
        assert_eq!(session.host(), Some("example.com"));
        Ok(())
    }
}
