use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use nimbus_http::{Method, Session, SessionSettings, StatusClass, Transport};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{AuthError, SwiftAccount, SwiftCredentials};

/// How long a token is assumed valid when the service gives no expiry.
pub fn default_token_lifetime() -> TimeDelta {
    TimeDelta::days(3 * 365)
}

/// A token is treated as expired this long before its actual expiry.
pub fn grace_period() -> TimeDelta {
    TimeDelta::minutes(5)
}

/// Request paths tried, in order, for v1 authentication.
const V1_PATHS: [&str; 2] = ["/auth/v1.0", "/v1.0"];

/// Format used when rendering expiry timestamps.
const EXPIRY_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// The identity API generation selected by the identity URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityVersion {
    /// Header based authentication
    V1,
    /// JSON token API
    V2,
    /// Keystone v3, recognized but not supported
    V3,
}

impl IdentityVersion {
    /// Picks the API version from the path of the identity URL.
    pub fn detect(auth_url: &Url) -> Result<Self, AuthError> {
        let path = auth_url.path().trim_start_matches('/');
        if path.starts_with("v2.0") {
            Ok(IdentityVersion::V2)
        } else if path.starts_with("v3") {
            Ok(IdentityVersion::V3)
        } else if path.starts_with("v1.0") || path.starts_with("auth/v1.0") {
            Ok(IdentityVersion::V1)
        } else {
            Err(AuthError::UnsupportedVersion(auth_url.to_string()))
        }
    }
}

/// The result of a successful identity exchange.
#[derive(Clone)]
pub struct IdentityToken {
    storage_url: Url,
    token: SecretString,
    expires: DateTime<Utc>,
}

impl IdentityToken {
    /// The object storage endpoint, without a trailing `/`.
    pub fn storage_url(&self) -> &Url {
        &self.storage_url
    }

    /// The token to present as `X-Auth-Token`.
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// When the token expires.
    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    /// The expiry rendered as `YYYY-MM-DDTHH:MM:SSZ`.
    pub fn expiry_string(&self) -> String {
        self.expires.format(EXPIRY_FORMAT).to_string()
    }

    /// Whether the token can still be used at `now`, allowing for the
    /// [`grace_period`].
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.token.expose_secret().is_empty() && now + grace_period() < self.expires
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityToken")
            .field("storage_url", &self.storage_url.as_str())
            .field("expires", &self.expiry_string())
            .finish_non_exhaustive()
    }
}

/// Exchanges credentials with a Swift identity service.
pub struct IdentityClient {
    account: SwiftAccount,
    transport: Arc<dyn Transport>,
    settings: SessionSettings,
    proxy: Option<Url>,
    token: Option<IdentityToken>,
}

impl fmt::Debug for IdentityClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityClient")
            .field("auth_url", &self.account.auth_url.as_str())
            .field("credentials", &self.account.credentials)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl IdentityClient {
    /// A client for `account` that has not authenticated yet.
    pub fn new(
        account: SwiftAccount,
        transport: Arc<dyn Transport>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            account,
            transport,
            settings,
            proxy: None,
            token: None,
        }
    }

    /// Routes identity exchanges through an HTTP proxy.
    pub fn with_proxy(mut self, proxy: Option<Url>) -> Self {
        self.proxy = proxy;
        self
    }

    /// The identity service URL.
    pub fn auth_url(&self) -> &Url {
        &self.account.auth_url
    }

    /// The credentials presented to the service.
    pub fn credentials(&self) -> &SwiftCredentials {
        &self.account.credentials
    }

    /// The tenant, for password credentials.
    pub fn tenant(&self) -> Option<&str> {
        self.account.credentials.tenant()
    }

    /// The user name.
    pub fn user(&self) -> &str {
        self.account.credentials.user()
    }

    /// The current token, if any.
    pub fn token(&self) -> Option<&IdentityToken> {
        self.token.as_ref()
    }

    /// Forgets the current token.
    pub fn reset(&mut self) {
        self.token = None;
    }

    /// Whether a token is held that stays valid past the grace period.
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(Utc::now())
    }

    /// [`is_authenticated`](Self::is_authenticated) as of `now`.
    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        self.token
            .as_ref()
            .is_some_and(|token| token.is_valid_at(now))
    }

    /// Performs a fresh identity exchange, replacing any previous token.
    pub fn authenticate(&mut self) -> Result<&IdentityToken, AuthError> {
        self.reset();
        let now = Utc::now();
        let token = match IdentityVersion::detect(&self.account.auth_url)? {
            IdentityVersion::V1 => self.authenticate_v1(now)?,
            IdentityVersion::V2 => self.authenticate_v2(now)?,
            IdentityVersion::V3 => {
                return Err(AuthError::UnsupportedVersion(
                    self.account.auth_url.to_string(),
                ));
            }
        };
        tracing::info!(
            auth_url = %self.account.auth_url,
            user = %self.user(),
            "Authenticated with identity service"
        );
        tracing::debug!(
            storage_url = %token.storage_url,
            expires = %token.expiry_string(),
            "Received storage token"
        );
        Ok(&*self.token.insert(token))
    }

    fn identity_session(&self) -> Result<Session, AuthError> {
        let mut session = Session::connect(
            self.transport.clone(),
            self.settings.clone(),
            &self.account.auth_url,
        )?;
        if let Some(proxy) = &self.proxy {
            session.set_proxy_url(proxy)?;
        }
        Ok(session)
    }

    fn authenticate_v1(&self, now: DateTime<Utc>) -> Result<IdentityToken, AuthError> {
        let mut session = self.identity_session()?;
        let credentials = &self.account.credentials;
        let mut failure = None;

        for path in V1_PATHS {
            let mut request = session.request(Method::GET, path, "");
            request.set_header("X-Auth-User", credentials.user());
            request.set_header("X-Auth-Key", credentials.secret().expose_secret());
            request.submit()?;

            let status = request.status().map(|status| status.as_u16()).unwrap_or(0);
            if request.status_class() != Some(StatusClass::Success) {
                tracing::debug!(path, status, "Identity request refused");
                failure = Some(format!("{path} answered with status {status}"));
                continue;
            }

            let storage_url = request.response_header("x-storage-url");
            let token = request.response_header("x-storage-token");
            let (Some(storage_url), Some(token)) = (storage_url, token) else {
                failure = Some(format!(
                    "{path} response lacks X-Storage-Url or X-Storage-Token"
                ));
                continue;
            };

            return Ok(IdentityToken {
                storage_url: parse_storage_url(storage_url)?,
                token: SecretString::from(token.to_string()),
                expires: now + default_token_lifetime(),
            });
        }

        Err(AuthError::Rejected(
            failure.unwrap_or_else(|| "no identity endpoint answered".into()),
        ))
    }

    fn authenticate_v2(&self, now: DateTime<Utc>) -> Result<IdentityToken, AuthError> {
        let SwiftCredentials::Password {
            tenant,
            user,
            password,
        } = &self.account.credentials
        else {
            return Err(AuthError::MissingCredentials(
                "v2 authentication needs a tenant name, user name and password".into(),
            ));
        };

        let body = serde_json::to_vec(&TokenRequest {
            auth: AuthRequest {
                tenant_name: tenant,
                password_credentials: PasswordCredentials {
                    username: user,
                    password: password.expose_secret(),
                },
            },
        })
        .map_err(|error| AuthError::MalformedResponse(error.to_string()))?;

        let mut path = self.account.auth_url.path().to_string();
        if !path.ends_with('/') {
            path.push('/');
        }
        path.push_str("tokens");

        let mut session = self.identity_session()?;
        let mut request = session.request(Method::POST, &path, "");
        request.set_header("Content-Type", "application/json");
        request.set_header("Accept", "application/json");
        request.set_body(body);
        request.submit()?;

        if request.status_class() != Some(StatusClass::Success) {
            let status = request.status().map(|status| status.as_u16()).unwrap_or(0);
            return Err(AuthError::Rejected(format!(
                "{path} answered with status {status}"
            )));
        }

        let content_type = request.response_header("content-type").unwrap_or_default();
        if !is_json(content_type) {
            return Err(AuthError::MalformedResponse(format!(
                "expected application/json, got {content_type:?}"
            )));
        }

        let body = match request.response_body_length() {
            Some(length) => {
                let mut body = vec![0; usize::try_from(length).unwrap_or(usize::MAX).min(MAX_BODY)];
                let read = request.read_body(&mut body)?;
                body.truncate(read);
                body
            }
            None => request.read_body_to_end()?,
        };

        let response: TokenResponse = serde_json::from_slice(&body)
            .map_err(|error| AuthError::MalformedResponse(error.to_string()))?;
        response.into_token(now)
    }
}

/// Upper bound on identity response bodies read into memory.
const MAX_BODY: usize = 16 * 1024 * 1024;

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
}

fn parse_storage_url(storage_url: &str) -> Result<Url, AuthError> {
    let trimmed = storage_url.trim().trim_end_matches('/');
    Url::parse(trimmed)
        .map_err(|error| AuthError::MalformedResponse(format!("storage URL {trimmed:?}: {error}")))
}

/// Parses a token expiry such as `2014-10-24T13:48:28.095790`,
/// `2014-10-24T13:48:28Z` or an RFC 3339 timestamp with an offset. Times
/// without a zone are UTC.
pub fn parse_expiry(expires: &str) -> Result<DateTime<Utc>, AuthError> {
    if let Ok(time) = DateTime::parse_from_rfc3339(expires) {
        return Ok(time.with_timezone(&Utc));
    }
    let naive = expires.strip_suffix('Z').unwrap_or(expires);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|time| time.and_utc())
        .map_err(|_| AuthError::InvalidExpiry(expires.to_string()))
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    auth: AuthRequest<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthRequest<'a> {
    tenant_name: &'a str,
    password_credentials: PasswordCredentials<'a>,
}

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access: Access,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Access {
    #[serde(default)]
    service_catalog: Vec<CatalogEntry>,
    token: TokenInfo,
}

#[derive(Deserialize)]
struct CatalogEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Deserialize)]
struct Endpoint {
    #[serde(rename = "publicURL", default)]
    public_url: Option<String>,
}

#[derive(Deserialize)]
struct TokenInfo {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    expires: Option<String>,
}

impl TokenResponse {
    fn into_token(self, now: DateTime<Utc>) -> Result<IdentityToken, AuthError> {
        let public_url = self
            .access
            .service_catalog
            .iter()
            .filter(|entry| {
                entry.name.as_deref() == Some("swift")
                    && entry.kind.as_deref() == Some("object-store")
            })
            .flat_map(|entry| entry.endpoints.iter())
            .find_map(|endpoint| endpoint.public_url.as_deref())
            .ok_or_else(|| {
                AuthError::MalformedResponse(
                    "service catalog has no swift object-store endpoint".into(),
                )
            })?;

        let token = self
            .access
            .token
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::MalformedResponse("token has no id".into()))?;

        let expires = match self.access.token.expires.as_deref() {
            Some(expires) => parse_expiry(expires)?,
            None => now + default_token_lifetime(),
        };

        Ok(IdentityToken {
            storage_url: parse_storage_url(public_url)?,
            token: SecretString::from(token),
            expires,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CredentialSource;
    use chrono::TimeZone;
    use nimbus_http::helpers::ScriptedTransport;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    const V2_RESPONSE: &str = r#"{
        "access": {
            "token": {"id": "tok-123", "expires": "2030-01-02T03:04:05Z"},
            "serviceCatalog": [
                {"name": "nova", "type": "compute",
                 "endpoints": [{"publicURL": "https://compute.example.com/v2"}]},
                {"name": "swift", "type": "object-store",
                 "endpoints": [{"publicURL": "https://store.example.com/v1/AUTH_t/"}]}
            ]
        }
    }"#;

    fn client(transport: &ScriptedTransport, auth_url: &str, credentials: SwiftCredentials) -> TestResult<IdentityClient> {
        let account = SwiftAccount {
            auth_url: Url::parse(auth_url)?,
            credentials,
            source: CredentialSource::Options,
        };
        Ok(IdentityClient::new(
            account,
            Arc::new(transport.clone()),
            SessionSettings::default(),
        ))
    }

    fn api_key() -> SwiftCredentials {
        SwiftCredentials::ApiKey {
            user: "user".into(),
            key: SecretString::from("key"),
        }
    }

    fn password() -> SwiftCredentials {
        SwiftCredentials::Password {
            tenant: "tenant".into(),
            user: "user".into(),
            password: SecretString::from("pw"),
        }
    }

    #[test]
    fn it_detects_identity_versions() -> TestResult {
        let detect = |url: &str| -> TestResult<Result<IdentityVersion, AuthError>> {
            Ok(IdentityVersion::detect(&Url::parse(url)?))
        };
        assert_eq!(detect("http://id/v2.0")?, Ok(IdentityVersion::V2));
        assert_eq!(detect("http://id/v2.0/")?, Ok(IdentityVersion::V2));
        assert_eq!(detect("http://id/v3")?, Ok(IdentityVersion::V3));
        assert_eq!(detect("http://id/v1.0")?, Ok(IdentityVersion::V1));
        assert_eq!(detect("http://id/auth/v1.0")?, Ok(IdentityVersion::V1));
        assert!(matches!(
            detect("http://id/v9")?,
            Err(AuthError::UnsupportedVersion(_))
        ));
        Ok(())
    }

    #[test]
    fn it_authenticates_with_v1_headers() -> TestResult {
        let transport = ScriptedTransport::new();
        transport.respond(
            200,
            &[
                ("X-Storage-Url", "https://store.example.com/v1/AUTH_user/"),
                ("X-Storage-Token", "tok-v1"),
            ],
            "",
        );
        let mut client = client(&transport, "http://id.example.com/auth/v1.0", api_key())?;

        let token = client.authenticate()?;
        assert_eq!(token.storage_url().as_str(), "https://store.example.com/v1/AUTH_user");
        assert_eq!(token.token().expose_secret(), "tok-v1");
        assert!(client.is_authenticated());

        let exchanges = transport.exchanges();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].path, "/auth/v1.0");
        assert_eq!(exchanges[0].headers.value("x-auth-user"), Some("user"));
        assert_eq!(exchanges[0].headers.value("x-auth-key"), Some("key"));
        Ok(())
    }

    #[test]
    fn it_falls_back_to_the_short_v1_path() -> TestResult {
        let transport = ScriptedTransport::new();
        transport.respond(404, &[], "");
        transport.respond(
            204,
            &[
                ("X-Storage-Url", "http://store.example.com/v1/AUTH_user"),
                ("X-Storage-Token", "tok"),
            ],
            "",
        );
        let mut client = client(&transport, "http://id.example.com/v1.0", api_key())?;

        client.authenticate()?;
        let paths: Vec<_> = transport.exchanges().into_iter().map(|e| e.path).collect();
        assert_eq!(paths, vec!["/auth/v1.0", "/v1.0"]);
        Ok(())
    }

    #[test]
    fn it_rejects_v1_responses_without_a_token() -> TestResult {
        let transport = ScriptedTransport::new();
        transport.respond(200, &[("X-Storage-Url", "http://store/v1")], "");
        transport.respond(401, &[], "");
        let mut client = client(&transport, "http://id.example.com/auth/v1.0", api_key())?;

        assert!(matches!(client.authenticate(), Err(AuthError::Rejected(_))));
        assert!(!client.is_authenticated());
        Ok(())
    }

    #[test]
    fn it_authenticates_with_the_v2_token_api() -> TestResult {
        let transport = ScriptedTransport::new();
        transport.respond(
            200,
            &[("Content-Type", "application/json; charset=utf-8")],
            V2_RESPONSE,
        );
        let mut client = client(&transport, "http://id.example.com:5000/v2.0", password())?;

        let token = client.authenticate()?;
        assert_eq!(token.storage_url().as_str(), "https://store.example.com/v1/AUTH_t");
        assert_eq!(token.token().expose_secret(), "tok-123");
        assert_eq!(token.expiry_string(), "2030-01-02T03:04:05Z");

        let exchanges = transport.exchanges();
        assert_eq!(exchanges[0].method, Method::POST);
        assert_eq!(exchanges[0].path, "/v2.0/tokens");
        assert_eq!(exchanges[0].headers.value("content-type"), Some("application/json"));
        assert_eq!(exchanges[0].headers.value("accept"), Some("application/json"));

        let body: serde_json::Value = serde_json::from_slice(exchanges[0].body.as_deref().ok_or("no body")?)?;
        assert_eq!(
            body,
            serde_json::json!({
                "auth": {
                    "tenantName": "tenant",
                    "passwordCredentials": {"username": "user", "password": "pw"}
                }
            })
        );
        Ok(())
    }

    #[test]
    fn it_defaults_the_expiry_when_absent() -> TestResult {
        let transport = ScriptedTransport::new();
        transport.respond(
            200,
            &[("Content-Type", "application/json")],
            r#"{"access":{"token":{"id":"t"},"serviceCatalog":[{"name":"swift","type":"object-store","endpoints":[{"publicURL":"http://store/v1"}]}]}}"#,
        );
        let mut client = client(&transport, "http://id/v2.0/", password())?;

        let before = Utc::now();
        let expires = client.authenticate()?.expires();
        assert!(expires >= before + default_token_lifetime());
        assert_eq!(transport.exchanges()[0].path, "/v2.0/tokens");
        Ok(())
    }

    #[test]
    fn it_rejects_malformed_v2_responses() -> TestResult {
        let cases = [
            ("text/html", V2_RESPONSE),
            ("application/json", "not json"),
            ("application/json", r#"{"access":{"token":{"id":"t"},"serviceCatalog":[]}}"#),
            (
                "application/json",
                r#"{"access":{"token":{},"serviceCatalog":[{"name":"swift","type":"object-store","endpoints":[{"publicURL":"http://s/v1"}]}]}}"#,
            ),
        ];
        for (content_type, body) in cases {
            let transport = ScriptedTransport::new();
            transport.respond(200, &[("Content-Type", content_type)], body);
            let mut client = client(&transport, "http://id/v2.0", password())?;
            assert!(
                matches!(client.authenticate(), Err(AuthError::MalformedResponse(_))),
                "accepted {body}"
            );
        }
        Ok(())
    }

    #[test]
    fn it_requires_password_credentials_for_v2() -> TestResult {
        let transport = ScriptedTransport::new();
        let mut client = client(&transport, "http://id/v2.0", api_key())?;
        assert!(matches!(
            client.authenticate(),
            Err(AuthError::MissingCredentials(_))
        ));
        assert!(transport.exchanges().is_empty());
        Ok(())
    }

    #[test]
    fn it_refuses_v3() -> TestResult {
        let transport = ScriptedTransport::new();
        let mut client = client(&transport, "http://id/v3", password())?;
        assert!(matches!(
            client.authenticate(),
            Err(AuthError::UnsupportedVersion(_))
        ));
        assert!(transport.exchanges().is_empty());
        Ok(())
    }

    #[test]
    fn it_applies_the_grace_period() -> TestResult {
        let expires = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();
        let token = IdentityToken {
            storage_url: Url::parse("http://store/v1")?,
            token: SecretString::from("t"),
            expires,
        };
        assert!(token.is_valid_at(expires - TimeDelta::minutes(6)));
        assert!(!token.is_valid_at(expires - TimeDelta::minutes(5)));
        assert!(!token.is_valid_at(expires - TimeDelta::minutes(4)));

        let empty = IdentityToken {
            token: SecretString::from(""),
            ..token
        };
        assert!(!empty.is_valid_at(expires - TimeDelta::days(1)));
        Ok(())
    }

    #[test]
    fn it_parses_expiry_formats() -> TestResult {
        let expected = Utc.with_ymd_and_hms(2014, 10, 24, 13, 48, 28).unwrap();
        assert_eq!(parse_expiry("2014-10-24T13:48:28Z")?, expected);
        assert_eq!(parse_expiry("2014-10-24T13:48:28")?, expected);
        assert_eq!(
            parse_expiry("2014-10-24T13:48:28.095790")?,
            expected + TimeDelta::microseconds(95790)
        );
        assert_eq!(parse_expiry("2014-10-24T15:48:28+02:00")?, expected);
        assert!(matches!(
            parse_expiry("tomorrow"),
            Err(AuthError::InvalidExpiry(_))
        ));
        Ok(())
    }

    #[test]
    fn it_resets_state_before_authenticating() -> TestResult {
        let transport = ScriptedTransport::new();
        transport.respond(
            200,
            &[("X-Storage-Url", "http://store/v1"), ("X-Storage-Token", "t")],
            "",
        );
        transport.respond(401, &[], "");
        transport.respond(401, &[], "");
        let mut client = client(&transport, "http://id/auth/v1.0", api_key())?;

        client.authenticate()?;
        assert!(client.is_authenticated());
        assert!(client.authenticate().is_err());
        assert!(client.token().is_none());
        Ok(())
    }
}
