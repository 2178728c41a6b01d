use reqwest::blocking::Client;
use reqwest::header::{HeaderName, HeaderValue};

use super::{ConnectOptions, Connection, Incoming, Outgoing, Target, Transport};
use crate::{HeaderSet, HttpError, tls};

/// A [`Transport`] backed by a blocking reqwest client with rustls.
///
/// Each connection owns its own client so that proxy and trust settings are
/// fixed for the lifetime of the connection, while keep-alive reuse happens
/// inside the client's pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    /// Creates the transport.
    pub fn new() -> Self {
        Self
    }
}

impl Transport for ReqwestTransport {
    fn supports_tls(&self) -> bool {
        true
    }

    fn connect(
        &self,
        target: &Target,
        options: &ConnectOptions,
    ) -> Result<Box<dyn Connection>, HttpError> {
        let mut builder = Client::builder()
            .user_agent(options.user_agent.clone())
            .connect_timeout(options.connect_timeout)
            .timeout(None)
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(1);

        builder = match &options.proxy {
            Some(proxy) => builder.proxy(
                reqwest::Proxy::all(proxy.as_str())
                    .map_err(|error| HttpError::InvalidProxy(error.to_string()))?,
            ),
            None => builder.no_proxy(),
        };

        if target.is_https() {
            builder = builder.use_preconfigured_tls(tls::client_config(options.trust.clone())?);
        }

        let client = builder.build().map_err(HttpError::from)?;
        tracing::debug!(%target, proxy = ?options.proxy.as_ref().map(|p| p.as_str()), "Opened connection");

        Ok(Box::new(ReqwestConnection {
            client,
            target: target.clone(),
        }))
    }
}

struct ReqwestConnection {
    client: Client,
    target: Target,
}

impl Connection for ReqwestConnection {
    fn send(&mut self, outgoing: Outgoing<'_>) -> Result<Incoming, HttpError> {
        let url = self.target.url_for(outgoing.path_and_query);
        let mut request = self.client.request(outgoing.method.clone(), url);

        for header in outgoing.headers {
            let name = HeaderName::from_bytes(header.key().as_bytes()).map_err(|error| {
                HttpError::InvalidHeader {
                    name: header.key().to_string(),
                    reason: error.to_string(),
                }
            })?;
            let value = HeaderValue::from_str(header.value()).map_err(|error| {
                HttpError::InvalidHeader {
                    name: header.key().to_string(),
                    reason: error.to_string(),
                }
            })?;
            request = request.header(name, value);
        }

        if let Some(body) = outgoing.body {
            request = request.body(body.to_vec());
        }

        let response = request.send()?;

        let mut headers = HeaderSet::new();
        for (name, value) in response.headers() {
            headers.add(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }

        Ok(Incoming {
            status: response.status(),
            headers,
            body: Box::new(response),
        })
    }
}
