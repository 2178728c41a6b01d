use nimbus_http::{Method, Request, Session};

use super::S3Signer;

/// A [`Session`] whose requests are signed for an S3-compatible store.
#[derive(Debug)]
pub struct S3Session {
    session: Session,
    signer: S3Signer,
}

impl S3Session {
    /// Wraps `session` so that every request goes through `signer`.
    pub fn new(session: Session, signer: S3Signer) -> Self {
        Self { session, signer }
    }

    /// Starts a signed request. The signature is computed at submission
    /// time.
    pub fn make_request(&mut self, method: Method, path: &str, query: &str) -> Request<'_> {
        self.session
            .request(method, path, query)
            .with_decorator(&self.signer)
    }

    /// The signer in use.
    pub fn signer(&self) -> &S3Signer {
        &self.signer
    }

    /// The underlying session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The underlying session, for proxy and server changes.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}
