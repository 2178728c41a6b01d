#![warn(missing_docs)]

//! Session-oriented HTTP for random-access reads of remote objects.
//!
//! A [`Session`] binds to one server (scheme, host and port), optionally
//! through an HTTP proxy, and opens its connection lazily. [`Request`]s are
//! built on a session, carry a case-insensitive [`HeaderSet`], and are
//! submitted at most once. Authentication schemes plug in as a
//! [`Decorator`] that adjusts each request right before it is sent.
//!
//! The wire itself sits behind the [`Transport`] trait; [`ReqwestTransport`]
//! is the production implementation, using rustls with a configurable
//! certificate [`TrustPolicy`].

mod error;
pub use error::*;

mod header;
pub use header::*;

pub mod range;

mod request;
pub use request::*;

mod session;
pub use session::*;

mod tls;
pub use tls::*;

mod transport;
pub use transport::*;

#[cfg(any(test, feature = "helpers"))]
pub mod helpers;

pub use http::{Method, StatusCode};
