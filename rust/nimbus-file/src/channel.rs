use nimbus_auth::{IdentityClient, Options, S3Session, S3Signer, SwiftSession, resolve_s3, resolve_swift};
use nimbus_http::{Method, Request, Session};
use url::Url;

use crate::{Config, FileError, Location};

/// How requests for one file reach the server, chosen once at open time.
#[derive(Debug)]
pub(crate) enum Channel {
    Plain(Session),
    S3(S3Session),
    Swift(SwiftSession),
}

impl Channel {
    /// Resolves credentials for `location` and builds the matching session,
    /// routed through `proxy` when one is given.
    pub(crate) fn open(
        location: &Location,
        options: &Options,
        config: &Config,
        proxy: Option<&Url>,
    ) -> Result<Self, FileError> {
        let transport = config.transport().clone();
        let settings = config.settings().clone();

        let mut channel = match location {
            Location::Http { url } => Channel::Plain(Session::connect(transport, settings, url)?),
            Location::S3 { url, flavor, .. } => {
                let keys = match resolve_s3(options, config.environment(), config.default_keys()) {
                    Some((keys, source)) => {
                        tracing::debug!(?source, access_key = keys.access_key(), "Signing S3 requests");
                        Some(keys)
                    }
                    None => {
                        tracing::debug!("No S3 credentials found, sending unsigned requests");
                        None
                    }
                };
                let session = Session::connect(transport, settings, url)?;
                Channel::S3(S3Session::new(session, S3Signer::new(*flavor, keys)))
            }
            Location::Swift { .. } => {
                let account = resolve_swift(options, config.environment())?;
                tracing::debug!(
                    auth_url = %account.auth_url,
                    user = account.credentials.user(),
                    source = ?account.source,
                    "Using Swift identity service"
                );
                let identity = IdentityClient::new(account, transport.clone(), settings.clone())
                    .with_proxy(proxy.cloned());
                Channel::Swift(SwiftSession::new(Session::new(transport, settings), identity))
            }
        };

        if let Some(proxy) = proxy {
            channel.session_mut().set_proxy_url(proxy)?;
        }
        Ok(channel)
    }

    /// Starts an authenticated request for `path`.
    pub(crate) fn request(
        &mut self,
        method: Method,
        path: &str,
        query: &str,
    ) -> Result<Request<'_>, FileError> {
        Ok(match self {
            Channel::Plain(session) => session.request(method, path, query),
            Channel::S3(session) => session.make_request(method, path, query),
            Channel::Swift(session) => session.make_request(method, path, query)?,
        })
    }

    /// Whether this is an S3 channel without credentials.
    pub(crate) fn is_anonymous_s3(&self) -> bool {
        matches!(self, Channel::S3(session) if !session.signer().is_signed())
    }

    pub(crate) fn session(&self) -> &Session {
        match self {
            Channel::Plain(session) => session,
            Channel::S3(session) => session.session(),
            Channel::Swift(session) => session.session(),
        }
    }

    pub(crate) fn session_mut(&mut self) -> &mut Session {
        match self {
            Channel::Plain(session) => session,
            Channel::S3(session) => session.session_mut(),
            Channel::Swift(session) => session.session_mut(),
        }
    }
}
