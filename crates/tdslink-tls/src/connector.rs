//! rustls-based TLS connector.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector as TokioTlsConnector;
use tokio_rustls::client::TlsStream;

use crate::error::TlsError;
use crate::prelogin_wrapper::PreloginFramedTls;

/// A certificate verifier that accepts any server certificate.
///
/// Used only when `check_certificate` is off; the connection is then open
/// to man-in-the-middle interception.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

/// TLS connector for TDS connections.
pub struct TlsConnector {
    inner: TokioTlsConnector,
}

impl TlsConnector {
    /// Build a connector.
    ///
    /// With `check_certificate` the server certificate chains to the
    /// Mozilla root store; without it any certificate is accepted.
    pub fn new(check_certificate: bool) -> Result<Self, TlsError> {
        let config = if check_certificate {
            let root_store = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth()
        } else {
            tracing::warn!(
                "certificate verification disabled; the connection is vulnerable \
                 to man-in-the-middle attacks"
            );
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
                .with_no_client_auth()
        };

        Ok(Self {
            inner: TokioTlsConnector::from(Arc::new(config)),
        })
    }

    /// Perform the TLS handshake over `stream` for `server_name`.
    pub async fn connect<S>(&self, stream: S, server_name: &str) -> Result<TlsStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let dns_name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TlsError::InvalidServerName(server_name.to_string()))?;

        tracing::debug!(server_name, "starting TLS handshake");

        let tls_stream = self
            .inner
            .connect(dns_name, stream)
            .await
            .map_err(|e| TlsError::HandshakeFailed(e.to_string()))?;

        tracing::debug!("TLS handshake complete");
        Ok(tls_stream)
    }

    /// Perform the handshake with the TDS 7.x prelogin-packet wrapping, and
    /// switch the wrapper to passthrough once established.
    pub async fn connect_wrapped<S>(
        &self,
        stream: S,
        server_name: &str,
    ) -> Result<TlsStream<PreloginFramedTls<S>>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let wrapped = PreloginFramedTls::new(stream);
        let mut tls_stream = self.connect(wrapped, server_name).await?;
        tls_stream.get_mut().0.handshake_done();
        Ok(tls_stream)
    }
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install_provider() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    #[test]
    fn builds_with_verification() {
        install_provider();
        assert!(TlsConnector::new(true).is_ok());
    }

    #[test]
    fn builds_without_verification() {
        install_provider();
        assert!(TlsConnector::new(false).is_ok());
    }
}
