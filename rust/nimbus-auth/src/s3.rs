//! Signed access to S3-compatible object stores.
//!
//! Requests are signed with the legacy HMAC-SHA1 scheme understood by Amazon
//! S3 and Google Cloud Storage's interoperability endpoint. Each request
//! carries a `Date` header and, when credentials are available, an
//! `Authorization: <prefix> <access>:<signature>` header where the signature
//! is the base64 HMAC-SHA1 over the canonical string
//!
//! ```text
//! VERB \n \n \n DATE \n [x-goog-api-version:1 \n] /bucket/key
//! ```

mod session;
pub use session::*;

mod signer;
pub use signer::*;

/// Which storage service's signing dialect to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    /// Amazon S3 and compatible stores
    Amazon,
    /// Google Cloud Storage interoperability API
    Google,
}

impl Flavor {
    /// The scheme prefix in the `Authorization` header.
    pub fn prefix(&self) -> &'static str {
        match self {
            Flavor::Amazon => "AWS",
            Flavor::Google => "GOOG1",
        }
    }
}
