//! Credential resolution.
//!
//! Credentials come, in order of precedence, from the options string, from
//! environment variables, and from a configured default. The first complete
//! set wins; partial sets are skipped.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::{AuthError, Environment, Options};

/// Environment variable holding the S3 access key.
pub const S3_ACCESS_KEY: &str = "S3_ACCESS_KEY";
/// Environment variable holding the S3 secret key.
pub const S3_SECRET_KEY: &str = "S3_SECRET_KEY";
/// Environment variable holding the Swift API user.
pub const SWIFT_API_USER: &str = "SWIFT_API_USER";
/// Environment variable holding the Swift API key.
pub const SWIFT_API_KEY: &str = "SWIFT_API_KEY";
/// Environment variable holding the identity service URL.
pub const OS_AUTH_URL: &str = "OS_AUTH_URL";
/// Environment variable holding the tenant name.
pub const OS_TENANT_NAME: &str = "OS_TENANT_NAME";
/// Environment variable holding the identity user name.
pub const OS_USERNAME: &str = "OS_USERNAME";
/// Environment variable holding the identity password.
pub const OS_PASSWORD: &str = "OS_PASSWORD";

/// An access key identifier paired with its secret.
#[derive(Clone)]
pub struct AccessKeys {
    access_key: String,
    secret_key: SecretString,
}

impl AccessKeys {
    /// Pairs an access key with its secret.
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<SecretString>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// The public half.
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// The secret half.
    pub fn secret_key(&self) -> &SecretString {
        &self.secret_key
    }

    fn is_complete(&self) -> bool {
        !self.access_key.is_empty() && !self.secret_key.expose_secret().is_empty()
    }
}

impl fmt::Debug for AccessKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeys")
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Where a set of credentials was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// The options string
    Options,
    /// Environment variables
    Environment,
    /// The configured default
    Configured,
}

/// Resolves S3 access keys: `AUTH=` then `S3_ACCESS_KEY`/`S3_SECRET_KEY`
/// in the options, then the same variables in the environment, then
/// `default`. Returns `None` for anonymous access.
pub fn resolve_s3(
    options: &Options,
    environment: &Environment,
    default: Option<&AccessKeys>,
) -> Option<(AccessKeys, CredentialSource)> {
    if let Some(keys) = options.auth().cloned().or_else(|| options.s3_keys()) {
        return Some((keys, CredentialSource::Options));
    }
    if let (Some(access), Some(secret)) = (
        environment.get(S3_ACCESS_KEY),
        environment.get(S3_SECRET_KEY),
    ) {
        return Some((
            AccessKeys::new(access, SecretString::from(secret)),
            CredentialSource::Environment,
        ));
    }
    default
        .filter(|keys| keys.is_complete())
        .map(|keys| (keys.clone(), CredentialSource::Configured))
}

/// Credentials presented to a Swift identity service.
#[derive(Clone)]
pub enum SwiftCredentials {
    /// A user and API key, as used by the v1 identity API
    ApiKey {
        /// User name
        user: String,
        /// API key
        key: SecretString,
    },
    /// A tenant, user and password, as used by the v2 identity API
    Password {
        /// Tenant (project) name
        tenant: String,
        /// User name
        user: String,
        /// Password
        password: SecretString,
    },
}

impl SwiftCredentials {
    /// The user name.
    pub fn user(&self) -> &str {
        match self {
            SwiftCredentials::ApiKey { user, .. } | SwiftCredentials::Password { user, .. } => {
                user
            }
        }
    }

    /// The tenant, if these are password credentials.
    pub fn tenant(&self) -> Option<&str> {
        match self {
            SwiftCredentials::ApiKey { .. } => None,
            SwiftCredentials::Password { tenant, .. } => Some(tenant),
        }
    }

    /// The API key or password.
    pub fn secret(&self) -> &SecretString {
        match self {
            SwiftCredentials::ApiKey { key, .. } => key,
            SwiftCredentials::Password { password, .. } => password,
        }
    }
}

impl fmt::Debug for SwiftCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwiftCredentials::ApiKey { user, .. } => f
                .debug_struct("ApiKey")
                .field("user", user)
                .finish_non_exhaustive(),
            SwiftCredentials::Password { tenant, user, .. } => f
                .debug_struct("Password")
                .field("tenant", tenant)
                .field("user", user)
                .finish_non_exhaustive(),
        }
    }
}

/// Everything needed to authenticate against a Swift identity service.
#[derive(Debug, Clone)]
pub struct SwiftAccount {
    /// The identity service URL, whose path selects the API version
    pub auth_url: Url,
    /// The credentials to present
    pub credentials: SwiftCredentials,
    /// Where the credentials were found
    pub source: CredentialSource,
}

/// Resolves Swift credentials.
///
/// The identity URL comes from `OS_AUTH_URL` in the options or the
/// environment. Credentials are taken from the first complete set among:
/// `OS_TENANT_NAME`/`OS_USERNAME`/`OS_PASSWORD` options, `AUTH=` option,
/// the same `OS_*` variables in the environment, `SWIFT_API_USER`/
/// `SWIFT_API_KEY`, and finally `S3_ACCESS_KEY`/`S3_SECRET_KEY`.
pub fn resolve_swift(options: &Options, environment: &Environment) -> Result<SwiftAccount, AuthError> {
    let auth_url = options
        .os_auth_url()
        .map(String::from)
        .or_else(|| environment.get(OS_AUTH_URL))
        .ok_or_else(|| {
            AuthError::MissingCredentials(format!("{OS_AUTH_URL} is not set"))
        })?;
    let auth_url =
        Url::parse(&auth_url).map_err(|error| AuthError::InvalidIdentityUrl(format!("{auth_url}: {error}")))?;

    let found = |credentials, source| {
        Ok(SwiftAccount {
            auth_url: auth_url.clone(),
            credentials,
            source,
        })
    };

    if let (Some(tenant), Some(user), Some(password)) = (
        options.os_tenant_name(),
        options.os_username(),
        options.os_password(),
    ) {
        return found(
            SwiftCredentials::Password {
                tenant: tenant.to_string(),
                user: user.to_string(),
                password: password.clone(),
            },
            CredentialSource::Options,
        );
    }

    if let Some(keys) = options.auth() {
        return found(
            SwiftCredentials::ApiKey {
                user: keys.access_key().to_string(),
                key: keys.secret_key().clone(),
            },
            CredentialSource::Options,
        );
    }

    if let (Some(tenant), Some(user), Some(password)) = (
        environment.get(OS_TENANT_NAME),
        environment.get(OS_USERNAME),
        environment.get(OS_PASSWORD),
    ) {
        return found(
            SwiftCredentials::Password {
                tenant,
                user,
                password: SecretString::from(password),
            },
            CredentialSource::Environment,
        );
    }

    let api_user = environment.first_of(&[SWIFT_API_USER, S3_ACCESS_KEY]);
    let api_key = environment.first_of(&[SWIFT_API_KEY, S3_SECRET_KEY]);
    if let (Some(user), Some(key)) = (api_user, api_key) {
        return found(
            SwiftCredentials::ApiKey {
                user,
                key: SecretString::from(key),
            },
            CredentialSource::Environment,
        );
    }

    Err(AuthError::MissingCredentials(format!(
        "set {OS_TENANT_NAME}, {OS_USERNAME} and {OS_PASSWORD}, or {SWIFT_API_USER} and {SWIFT_API_KEY}"
    )))
}
