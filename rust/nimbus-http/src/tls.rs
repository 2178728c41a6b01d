//! Server certificate trust.
//!
//! Certificates are verified against the bundled web PKI roots. When
//! verification fails, the failure is classified and handed to a
//! [`TrustPolicy`], which decides whether the connection may proceed.
//! [`DefaultTrustPolicy`] tolerates exactly one class of failure: a chain
//! that does not end in a known root. Every other failure aborts the
//! handshake.

use std::fmt;
use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::HttpError;

/// Why a server certificate failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateFailure {
    /// The chain does not lead to a trusted root
    Untrusted,
    /// The certificate is not valid yet
    NotYetValid,
    /// The certificate has expired
    Expired,
    /// The certificate was issued for a different host
    IdentityMismatch,
    /// The certificate has been revoked
    Revoked,
    /// Anything else wrong with the chain
    BadChain,
}

impl CertificateFailure {
    fn classify(error: &rustls::Error) -> Self {
        match error {
            rustls::Error::InvalidCertificate(certificate) => match certificate {
                CertificateError::UnknownIssuer => CertificateFailure::Untrusted,
                CertificateError::NotValidYet => CertificateFailure::NotYetValid,
                CertificateError::Expired => CertificateFailure::Expired,
                CertificateError::NotValidForName => CertificateFailure::IdentityMismatch,
                CertificateError::Revoked => CertificateFailure::Revoked,
                _ => CertificateFailure::BadChain,
            },
            _ => CertificateFailure::BadChain,
        }
    }
}

impl fmt::Display for CertificateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CertificateFailure::Untrusted => "signed by an untrusted authority",
            CertificateFailure::NotYetValid => "not yet valid",
            CertificateFailure::Expired => "expired",
            CertificateFailure::IdentityMismatch => "issued for a different host",
            CertificateFailure::Revoked => "revoked",
            CertificateFailure::BadChain => "invalid certificate chain",
        };
        f.write_str(text)
    }
}

/// Decides whether a certificate verification failure is acceptable.
pub trait TrustPolicy: Send + Sync {
    /// Returns true to let the handshake continue despite `failure`.
    fn accept(&self, host: &str, failure: CertificateFailure) -> bool;
}

/// Accepts certificates from untrusted issuers and rejects every other
/// verification failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTrustPolicy;

impl TrustPolicy for DefaultTrustPolicy {
    fn accept(&self, _host: &str, failure: CertificateFailure) -> bool {
        failure == CertificateFailure::Untrusted
    }
}

/// Accepts only fully verified certificates.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictTrustPolicy;

impl TrustPolicy for StrictTrustPolicy {
    fn accept(&self, _host: &str, _failure: CertificateFailure) -> bool {
        false
    }
}

struct PolicyVerifier {
    inner: Arc<WebPkiServerVerifier>,
    policy: Arc<dyn TrustPolicy>,
}

impl fmt::Debug for PolicyVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyVerifier").finish_non_exhaustive()
    }
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Ok(verified) => Ok(verified),
            Err(error) => {
                let failure = CertificateFailure::classify(&error);
                let host = server_name.to_str();
                if self.policy.accept(&host, failure) {
                    tracing::warn!(%host, %failure, "Accepting server certificate");
                    Ok(ServerCertVerified::assertion())
                } else {
                    tracing::debug!(%host, %failure, "Rejecting server certificate");
                    Err(error)
                }
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Builds a rustls client configuration that routes verification failures
/// through `policy`.
pub fn client_config(policy: Arc<dyn TrustPolicy>) -> Result<ClientConfig, HttpError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(|error| HttpError::Tls(error.to_string()))?;

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|error| HttpError::Tls(error.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(PolicyVerifier { inner, policy }))
        .with_no_client_auth();

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_accepts_only_untrusted_issuers_by_default() {
        let policy = DefaultTrustPolicy;
        assert!(policy.accept("example.com", CertificateFailure::Untrusted));
        for failure in [
            CertificateFailure::NotYetValid,
            CertificateFailure::Expired,
            CertificateFailure::IdentityMismatch,
            CertificateFailure::Revoked,
            CertificateFailure::BadChain,
        ] {
            assert!(!policy.accept("example.com", failure), "{failure} accepted");
        }
    }

    #[test]
    fn it_classifies_verification_errors() {
        let classify = |error: CertificateError| {
            CertificateFailure::classify(&rustls::Error::InvalidCertificate(error))
        };
        assert_eq!(classify(CertificateError::UnknownIssuer), CertificateFailure::Untrusted);
        assert_eq!(classify(CertificateError::Expired), CertificateFailure::Expired);
        assert_eq!(classify(CertificateError::NotValidYet), CertificateFailure::NotYetValid);
        assert_eq!(classify(CertificateError::Revoked), CertificateFailure::Revoked);
        assert_eq!(
            classify(CertificateError::NotValidForName),
            CertificateFailure::IdentityMismatch
        );
        assert_eq!(classify(CertificateError::BadSignature), CertificateFailure::BadChain);
        assert_eq!(
            CertificateFailure::classify(&rustls::Error::DecryptError),
            CertificateFailure::BadChain
        );
    }

    #[test]
    fn it_builds_a_client_config() {
        assert!(client_config(Arc::new(DefaultTrustPolicy)).is_ok());
    }
}
