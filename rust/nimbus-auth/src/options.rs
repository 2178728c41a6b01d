//! The options string passed alongside a URL when opening a file.
//!
//! Options are whitespace separated `KEY=VALUE` pairs or bare flags. Keys are
//! matched case-insensitively and values may be wrapped in double quotes,
//! which allows them to contain spaces. Unknown tokens are kept but ignored.

use std::str::FromStr;

use secrecy::SecretString;

use crate::{AccessKeys, AuthError};

/// The typed form of an options string.
#[derive(Debug, Clone, Default)]
pub struct Options {
    no_proxy: bool,
    auth: Option<AccessKeys>,
    s3_access_key: Option<String>,
    s3_secret_key: Option<SecretString>,
    os_auth_url: Option<String>,
    os_tenant_name: Option<String>,
    os_username: Option<String>,
    os_password: Option<SecretString>,
    unrecognized: Vec<String>,
}

impl Options {
    /// Parses an options string.
    pub fn parse(options: &str) -> Result<Self, AuthError> {
        let mut parsed = Options::default();
        for token in tokenize(options) {
            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (key, Some(unquote(value))),
                None => (token.as_str(), None),
            };
            let value = value.filter(|value| !value.is_empty());

            match (key.to_ascii_uppercase().as_str(), value) {
                ("NOPROXY", None) => parsed.no_proxy = true,
                ("AUTH", Some(value)) => parsed.auth = Some(parse_auth(&token, value)?),
                ("AUTH", None) => {
                    return Err(AuthError::InvalidOption {
                        option: token.clone(),
                        reason: "expected AUTH=<access>:<secret>".into(),
                    });
                }
                ("S3_ACCESS_KEY", value) => parsed.s3_access_key = value.map(String::from),
                ("S3_SECRET_KEY", value) => {
                    parsed.s3_secret_key = value.map(SecretString::from)
                }
                ("OS_AUTH_URL" | "OS_AUTHURL", value) => {
                    parsed.os_auth_url = value.map(String::from)
                }
                ("OS_TENANT_NAME", value) => parsed.os_tenant_name = value.map(String::from),
                ("OS_USERNAME", value) => parsed.os_username = value.map(String::from),
                ("OS_PASSWORD", value) => parsed.os_password = value.map(SecretString::from),
                _ => parsed.unrecognized.push(token.clone()),
            }
        }
        Ok(parsed)
    }

    /// Whether `NOPROXY` was given.
    pub fn no_proxy(&self) -> bool {
        self.no_proxy
    }

    /// Keys given as `AUTH=<access>:<secret>`.
    pub fn auth(&self) -> Option<&AccessKeys> {
        self.auth.as_ref()
    }

    /// Keys given as `S3_ACCESS_KEY` together with `S3_SECRET_KEY`. Either
    /// one alone is ignored.
    pub fn s3_keys(&self) -> Option<AccessKeys> {
        match (&self.s3_access_key, &self.s3_secret_key) {
            (Some(access), Some(secret)) => Some(AccessKeys::new(access.clone(), secret.clone())),
            _ => None,
        }
    }

    /// `OS_AUTH_URL`.
    pub fn os_auth_url(&self) -> Option<&str> {
        self.os_auth_url.as_deref()
    }

    /// `OS_TENANT_NAME`.
    pub fn os_tenant_name(&self) -> Option<&str> {
        self.os_tenant_name.as_deref()
    }

    /// `OS_USERNAME`.
    pub fn os_username(&self) -> Option<&str> {
        self.os_username.as_deref()
    }

    /// `OS_PASSWORD`.
    pub fn os_password(&self) -> Option<&SecretString> {
        self.os_password.as_ref()
    }

    /// Tokens that were not recognized.
    pub fn unrecognized(&self) -> &[String] {
        &self.unrecognized
    }
}

impl FromStr for Options {
    type Err = AuthError;

    fn from_str(options: &str) -> Result<Self, Self::Err> {
        Options::parse(options)
    }
}

fn parse_auth(token: &str, value: &str) -> Result<AccessKeys, AuthError> {
    match value.split_once(':') {
        Some((access, secret)) if !access.is_empty() && !secret.is_empty() => {
            Ok(AccessKeys::new(access, SecretString::from(secret)))
        }
        _ => Err(AuthError::InvalidOption {
            option: token.split_once('=').map_or(token, |(key, _)| key).to_string(),
            reason: "expected AUTH=<access>:<secret>".into(),
        }),
    }
}

/// Splits on whitespace, keeping double-quoted runs together.
fn tokenize(options: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in options.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn unquote(value: &str) -> &str {
    value.trim_matches('"')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;
    use testresult::TestResult;

    #[test]
    fn it_parses_an_empty_string() -> TestResult {
        let options = Options::parse("   ")?;
        assert!(!options.no_proxy());
        assert!(options.auth().is_none());
        assert!(options.s3_keys().is_none());
        Ok(())
    }

    #[test]
    fn it_recognizes_noproxy_in_any_case() -> TestResult {
        assert!(Options::parse("NOPROXY")?.no_proxy());
        assert!(Options::parse("foo noProxy")?.no_proxy());
        Ok(())
    }

    #[test]
    fn it_strips_quotes_from_values() -> TestResult {
        let options = Options::parse(r#"S3_ACCESS_KEY="AKID" s3_secret_key="se cret""#)?;
        let keys = options.s3_keys().ok_or("missing keys")?;
        assert_eq!(keys.access_key(), "AKID");
        assert_eq!(keys.secret_key().expose_secret(), "se cret");
        Ok(())
    }

    #[test]
    fn it_ignores_half_a_key_pair() -> TestResult {
        let options = Options::parse("S3_ACCESS_KEY=AKID")?;
        assert!(options.s3_keys().is_none());
        Ok(())
    }

    #[test]
    fn it_parses_auth_pairs() -> TestResult {
        let options = Options::parse("AUTH=user:pass:word")?;
        let keys = options.auth().ok_or("missing auth")?;
        assert_eq!(keys.access_key(), "user");
        assert_eq!(keys.secret_key().expose_secret(), "pass:word");
        Ok(())
    }

    #[test]
    fn it_rejects_malformed_auth() {
        for options in ["AUTH=nocolon", "AUTH=:secret", "AUTH=access:", "AUTH"] {
            assert!(
                matches!(Options::parse(options), Err(AuthError::InvalidOption { .. })),
                "{options} was accepted"
            );
        }
    }

    #[test]
    fn it_parses_swift_options() -> TestResult {
        let options = Options::parse(
            "OS_AUTHURL=https://identity.example.com/v2.0 OS_TENANT_NAME=t OS_USERNAME=u OS_PASSWORD=p NOINIT",
        )?;
        assert_eq!(options.os_auth_url(), Some("https://identity.example.com/v2.0"));
        assert_eq!(options.os_tenant_name(), Some("t"));
        assert_eq!(options.os_username(), Some("u"));
        assert_eq!(options.os_password().map(|p| p.expose_secret()), Some("p"));
        assert_eq!(options.unrecognized(), &["NOINIT".to_string()]);
        Ok(())
    }
}
