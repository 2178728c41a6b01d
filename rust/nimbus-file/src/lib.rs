#![warn(missing_docs)]

//! Random-access reads of remote files.
//!
//! A [`RemoteFile`] is opened from a location URL and an options string. It
//! learns the object size with a `HEAD` request and serves every read with a
//! single ranged `GET`. The location scheme selects how requests are
//! authenticated:
//!
//! - `http://`, `https://`: anonymous
//! - `s3://`, `s3http://`, `s3https://`, `gs://`, `gshttp://`, `gshttps://`:
//!   HMAC-SHA1 signed when credentials are found, anonymous otherwise
//! - `swift://`: a token obtained from a Swift identity service
//!
//! Everything that would otherwise be process-wide (transport, proxy,
//! default keys, environment) lives in a [`Config`] passed to
//! [`RemoteFile::open`].

mod channel;

mod config;
pub use config::*;

mod error;
pub use error::*;

mod file;
pub use file::*;

mod location;
pub use location::*;

#[cfg(any(test, feature = "helpers"))]
pub mod helpers;

pub use nimbus_auth::{AccessKeys, Environment, Options};
