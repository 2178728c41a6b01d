#![warn(missing_docs)]

//! Authentication for remote object access.
//!
//! This crate turns an options string and the environment into credentials
//! and provides the two authenticated session flavors built on
//! [`nimbus_http::Session`]:
//!
//! - [`S3Session`] signs each request with HMAC-SHA1 in the Amazon (`AWS`)
//!   or Google (`GOOG1`) dialect, or sends it unsigned for public buckets.
//! - [`SwiftSession`] obtains a storage URL and token from a Swift identity
//!   service (v1 or v2) and attaches the token to each request.

mod credentials;
pub use credentials::*;

mod environment;
pub use environment::*;

mod error;
pub use error::*;

mod options;
pub use options::*;

pub mod s3;
pub use s3::{Flavor, S3Session, S3Signer};

pub mod swift;
pub use swift::{IdentityClient, IdentityToken, IdentityVersion, SwiftSession};
