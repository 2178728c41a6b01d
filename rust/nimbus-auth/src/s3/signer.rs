use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use nimbus_http::{Decorator, HttpError, RequestHead};
use secrecy::ExposeSecret;
use sha1::Sha1;

use super::Flavor;
use crate::AccessKeys;

/// Format of the `Date` header, always in GMT.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Header Google requires alongside GOOG1 signatures.
pub const GOOG_API_VERSION: &str = "x-goog-api-version";

/// Formats a timestamp for the `Date` header.
pub fn http_date(time: &DateTime<Utc>) -> String {
    time.format(DATE_FORMAT).to_string()
}

/// The string that gets signed for a request.
pub fn canonical_string(method: &str, date: &str, path: &str, flavor: Flavor) -> String {
    let mut canonical = format!("{method}\n\n\n{date}\n");
    if flavor == Flavor::Google {
        canonical.push_str(GOOG_API_VERSION);
        canonical.push_str(":1\n");
    }
    canonical.push_str(path);
    canonical
}

/// Base64 of the HMAC-SHA1 of `canonical` keyed with `secret`.
pub fn signature(secret: &[u8], canonical: &str) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(canonical.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Adds `Date` and, when keys are present, `Authorization` to requests.
#[derive(Debug, Clone)]
pub enum S3Signer {
    /// Unsigned requests for public objects
    Anonymous,
    /// Requests signed with access keys
    Signed {
        /// Signing dialect
        flavor: Flavor,
        /// Keys to sign with
        keys: AccessKeys,
    },
}

impl S3Signer {
    /// A signer for `keys` in the given dialect, or an anonymous one.
    pub fn new(flavor: Flavor, keys: Option<AccessKeys>) -> Self {
        match keys {
            Some(keys) => S3Signer::Signed { flavor, keys },
            None => S3Signer::Anonymous,
        }
    }

    /// Whether requests are signed.
    pub fn is_signed(&self) -> bool {
        matches!(self, S3Signer::Signed { .. })
    }

    /// The signing dialect, if signing.
    pub fn flavor(&self) -> Option<Flavor> {
        match self {
            S3Signer::Anonymous => None,
            S3Signer::Signed { flavor, .. } => Some(*flavor),
        }
    }

    /// Signs `head` as of `now`.
    pub fn sign_at(&self, head: &mut RequestHead, now: &DateTime<Utc>) {
        let date = http_date(now);
        head.set_header("Date", date.as_str());

        let S3Signer::Signed { flavor, keys } = self else {
            return;
        };
        if *flavor == Flavor::Google {
            head.set_header(GOOG_API_VERSION, "1");
        }

        let canonical = canonical_string(head.method().as_str(), &date, head.path(), *flavor);
        let signature = signature(keys.secret_key().expose_secret().as_bytes(), &canonical);
        head.set_header(
            "Authorization",
            format!("{} {}:{}", flavor.prefix(), keys.access_key(), signature),
        );
    }
}

impl Decorator for S3Signer {
    fn before_submit(&self, head: &mut RequestHead) -> Result<(), HttpError> {
        self.sign_at(head, &Utc::now());
        Ok(())
    }
}
