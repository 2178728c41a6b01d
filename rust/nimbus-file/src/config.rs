use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use nimbus_auth::{AccessKeys, Environment, Options};
use nimbus_http::{ReqwestTransport, SessionSettings, Transport, TrustPolicy};
use url::Url;

use crate::FileError;

/// Environment variable consulted for a proxy when none is configured.
pub const HTTP_PROXY: &str = "http_proxy";

/// Process-wide settings shared by every [`RemoteFile`](crate::RemoteFile)
/// opened with them.
#[derive(Clone)]
pub struct Config {
    transport: Arc<dyn Transport>,
    environment: Environment,
    proxy: Option<Url>,
    default_keys: Option<AccessKeys>,
    settings: SessionSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: Arc::new(ReqwestTransport),
            environment: Environment::process(),
            proxy: None,
            default_keys: None,
            settings: SessionSettings::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("proxy", &self.proxy.as_ref().map(Url::as_str))
            .field("default_keys", &self.default_keys)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Uses `transport` for every connection.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Reads credentials and the fallback proxy from `environment`.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Routes connections through an `http` proxy unless a file is opened
    /// with `NOPROXY`.
    pub fn with_proxy(mut self, proxy: &str) -> Result<Self, FileError> {
        self.proxy = Some(parse_proxy(proxy)?);
        Ok(self)
    }

    /// S3 keys used when neither the options nor the environment have any.
    pub fn with_default_keys(mut self, keys: AccessKeys) -> Self {
        self.default_keys = Some(keys);
        self
    }

    /// Sets the User-Agent header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.settings.user_agent = user_agent.into();
        self
    }

    /// Bounds connection establishment.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout = timeout;
        self
    }

    /// Decides which certificate failures are tolerated.
    pub fn with_trust_policy(mut self, trust: Arc<dyn TrustPolicy>) -> Self {
        self.settings.trust = trust;
        self
    }

    /// The transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The environment.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// The configured default S3 keys.
    pub fn default_keys(&self) -> Option<&AccessKeys> {
        self.default_keys.as_ref()
    }

    /// Connection settings.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// The proxy a file opened with `options` should use: none under
    /// `NOPROXY`, otherwise the configured proxy, otherwise `http_proxy`
    /// from the environment.
    pub fn resolve_proxy(&self, options: &Options) -> Option<Url> {
        if options.no_proxy() {
            return None;
        }
        if let Some(proxy) = &self.proxy {
            return Some(proxy.clone());
        }
        let value = self.environment.get(HTTP_PROXY)?;
        match parse_proxy(&value) {
            Ok(proxy) => Some(proxy),
            Err(error) => {
                tracing::warn!(%error, "Ignoring {HTTP_PROXY}");
                None
            }
        }
    }
}

fn parse_proxy(proxy: &str) -> Result<Url, FileError> {
    let url =
        Url::parse(proxy).map_err(|error| FileError::InvalidConfig(format!("proxy {proxy}: {error}")))?;
    if url.scheme() != "http" || url.host_str().is_none() {
        return Err(FileError::InvalidConfig(format!(
            "proxy {proxy}: only http:// proxies are supported"
        )));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    #[test]
    fn it_rejects_non_http_proxies() {
        assert!(matches!(
            Config::default().with_proxy("https://proxy:3128"),
            Err(FileError::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::default().with_proxy("not a url"),
            Err(FileError::InvalidConfig(_))
        ));
    }

    #[test]
    fn it_prefers_the_configured_proxy() -> TestResult {
        let config = Config::default()
            .with_environment(Environment::fixed([(HTTP_PROXY, "http://env-proxy:8080")]))
            .with_proxy("http://proxy:3128")?;
        let proxy = config.resolve_proxy(&Options::default());
        assert_eq!(proxy.as_ref().map(Url::as_str), Some("http://proxy:3128/"));
        Ok(())
    }

    #[test]
    fn it_falls_back_to_the_environment_proxy() -> TestResult {
        let config = Config::default()
            .with_environment(Environment::fixed([(HTTP_PROXY, "http://env-proxy:8080")]));
        let proxy = config.resolve_proxy(&Options::default());
        assert_eq!(proxy.as_ref().map(Url::as_str), Some("http://env-proxy:8080/"));

        let config = Config::default()
            .with_environment(Environment::fixed([(HTTP_PROXY, "socks5://env-proxy:1080")]));
        assert_eq!(config.resolve_proxy(&Options::default()), None);
        Ok(())
    }

    #[test]
    fn it_skips_the_proxy_under_noproxy() -> TestResult {
        let config = Config::default().with_proxy("http://proxy:3128")?;
        assert_eq!(config.resolve_proxy(&Options::parse("NOPROXY")?), None);
        Ok(())
    }
}
