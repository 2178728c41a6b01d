use nimbus_http::{Method, Request, Session};
use secrecy::ExposeSecret;

use super::IdentityClient;
use crate::AuthError;

/// A [`Session`] that talks to a Swift storage URL obtained from an
/// [`IdentityClient`], attaching the storage token to every request.
#[derive(Debug)]
pub struct SwiftSession {
    session: Session,
    identity: IdentityClient,
}

impl SwiftSession {
    /// Pairs a (possibly unbound) session with an identity client.
    pub fn new(session: Session, identity: IdentityClient) -> Self {
        Self { session, identity }
    }

    /// Authenticates if the current token is missing or about to expire.
    pub fn ensure_authenticated(&mut self) -> Result<(), AuthError> {
        if self.identity.is_authenticated() {
            return Ok(());
        }
        self.identity
            .authenticate()
            .map_err(|error| AuthError::NotAuthenticated(error.to_string()))?;
        Ok(())
    }

    /// Starts a request for `path` below the storage URL.
    ///
    /// Authenticates first when needed, then points the session at the
    /// storage URL (keeping the connection when the host is unchanged) and
    /// sets `X-Auth-Token`.
    pub fn make_request(
        &mut self,
        method: Method,
        path: &str,
        query: &str,
    ) -> Result<Request<'_>, AuthError> {
        self.ensure_authenticated()?;
        let token = self
            .identity
            .token()
            .ok_or_else(|| AuthError::NotAuthenticated("no token after authentication".into()))?;

        let storage_url = token.storage_url();
        if self.session.server_url() != Some(storage_url) {
            self.session.set_server_url(storage_url)?;
        }

        let full_path = join_path(storage_url.path(), path);
        let mut request = self.session.request(method, &full_path, query);
        request.set_header("X-Auth-Token", token.token().expose_secret());
        Ok(request)
    }

    /// The identity client.
    pub fn identity(&self) -> &IdentityClient {
        &self.identity
    }

    /// The identity client, e.g. to force re-authentication.
    pub fn identity_mut(&mut self) -> &mut IdentityClient {
        &mut self.identity
    }

    /// The underlying session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The underlying session, for proxy changes.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

/// Appends an object path to the storage URL's path prefix.
fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{prefix}{path}")
    } else {
        format!("{prefix}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CredentialSource, SwiftAccount, SwiftCredentials};
    use nimbus_http::SessionSettings;
    use nimbus_http::helpers::ScriptedTransport;
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;
    use std::sync::Arc;
    use testresult::TestResult;
    use url::Url;

    fn swift_session(transport: &ScriptedTransport) -> TestResult<SwiftSession> {
        let account = SwiftAccount {
            auth_url: Url::parse("http://identity.example.com/auth/v1.0")?,
            credentials: SwiftCredentials::ApiKey {
                user: "user".into(),
                key: SecretString::from("key"),
            },
            source: CredentialSource::Environment,
        };
        let transport: Arc<ScriptedTransport> = Arc::new(transport.clone());
        let identity = IdentityClient::new(account, transport.clone(), SessionSettings::default());
        let session = Session::new(transport, SessionSettings::default());
        Ok(SwiftSession::new(session, identity))
    }

    #[test]
    fn it_joins_storage_prefix_and_object_path() {
        assert_eq!(join_path("/v1/AUTH_t", "/c/k"), "/v1/AUTH_t/c/k");
        assert_eq!(join_path("/v1/AUTH_t/", "c/k"), "/v1/AUTH_t/c/k");
        assert_eq!(join_path("/", "/c/k"), "/c/k");
    }

    #[test]
    fn it_authenticates_before_the_first_request() -> TestResult {
        let transport = ScriptedTransport::new();
        transport.respond(
            200,
            &[
                ("X-Storage-Url", "http://store.example.com:8080/v1/AUTH_user"),
                ("X-Storage-Token", "tok"),
            ],
            "",
        );
        transport.respond(200, &[("Content-Length", "10")], "");
        transport.respond(200, &[("Content-Length", "10")], "");
        let mut session = swift_session(&transport)?;

        session.make_request(Method::HEAD, "/container/obj", "")?.submit()?;
        session.make_request(Method::HEAD, "/container/obj", "")?.submit()?;

        let exchanges = transport.exchanges();
        assert_eq!(exchanges.len(), 3);
        assert_eq!(exchanges[0].target.host(), "identity.example.com");
        assert_eq!(exchanges[1].target.authority(), "store.example.com:8080");
        assert_eq!(exchanges[1].path, "/v1/AUTH_user/container/obj");
        assert_eq!(exchanges[1].headers.value("x-auth-token"), Some("tok"));
        assert_eq!(exchanges[2].headers.value("x-auth-token"), Some("tok"));
        // Object requests reuse one connection.
        assert_eq!(transport.connections().len(), 2);
        Ok(())
    }

    #[test]
    fn it_reports_failed_authentication() -> TestResult {
        let transport = ScriptedTransport::new();
        transport.respond(401, &[], "");
        transport.respond(401, &[], "");
        let mut session = swift_session(&transport)?;

        let result = session.make_request(Method::HEAD, "/container/obj", "").map(|_| ());
        assert!(matches!(result, Err(AuthError::NotAuthenticated(_))));
        Ok(())
    }

    #[test]
    fn it_reauthenticates_after_reset() -> TestResult {
        let transport = ScriptedTransport::new();
        for token in ["first", "second"] {
            transport.respond(
                200,
                &[("X-Storage-Url", "http://store/v1/AUTH_u"), ("X-Storage-Token", token)],
                "",
            );
            transport.respond(200, &[], "");
        }
        let mut session = swift_session(&transport)?;

        session.make_request(Method::GET, "/c/o", "")?.submit()?;
        session.identity_mut().reset();
        session.make_request(Method::GET, "/c/o", "")?.submit()?;

        let exchanges = transport.exchanges();
        assert_eq!(exchanges[3].headers.value("x-auth-token"), Some("second"));
        Ok(())
    }
}
