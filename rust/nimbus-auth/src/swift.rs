//! Token-authenticated access to OpenStack Swift object stores.
//!
//! Before any object request, an [`IdentityClient`] exchanges credentials
//! with the identity service for a storage URL and a token. The API version
//! is chosen from the path of the identity URL: `/auth/v1.0` or `/v1.0` use
//! header-based v1 authentication, `/v2.0` uses the JSON token API, and
//! `/v3` is recognized but not supported. A [`SwiftSession`] then points its
//! session at the storage URL and attaches the token to every request,
//! re-authenticating when the token is about to expire.

mod identity;
pub use identity::*;

mod session;
pub use session::*;
