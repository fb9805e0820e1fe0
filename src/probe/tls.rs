use super::{TlsSession, Verification};
use crate::error::{FetchError, FetchResult};
use openssl::ssl::{SslConnector, SslMethod, SslRef, SslVerifyMode, SslVersion};
use openssl::x509::X509VerifyResult;
use std::pin::Pin;
use std::sync::OnceLock;
use tokio::net::TcpStream;
use tokio_openssl::SslStream;
use tracing::debug;

fn verifying_connector() -> FetchResult<&'static SslConnector> {
    static CONNECTOR: OnceLock<Result<SslConnector, openssl::error::ErrorStack>> =
        OnceLock::new();

    CONNECTOR
        .get_or_init(|| Ok(SslConnector::builder(SslMethod::tls())?.build()))
        .as_ref()
        .map_err(|err| FetchError::TlsSetup(err.clone()))
}

fn insecure_connector() -> FetchResult<&'static SslConnector> {
    static CONNECTOR: OnceLock<Result<SslConnector, openssl::error::ErrorStack>> =
        OnceLock::new();

    CONNECTOR
        .get_or_init(|| {
            let mut builder = SslConnector::builder(SslMethod::tls())?;
            builder.set_verify(SslVerifyMode::NONE);
            Ok(builder.build())
        })
        .as_ref()
        .map_err(|err| FetchError::TlsSetup(err.clone()))
}

/// Runs the client handshake over `stream`. With verification enabled the
/// chain and the hostname are checked; a failure of either is reported as
/// [`FetchError::CertificateVerification`], every other failure as
/// [`FetchError::Handshake`].
pub async fn handshake(
    stream: TcpStream,
    host: &str,
    verification: Verification,
) -> FetchResult<SslStream<TcpStream>> {
    let ssl = match verification {
        Verification::Enabled => verifying_connector()?.configure()?.into_ssl(host)?,
        Verification::Disabled => insecure_connector()?
            .configure()?
            .verify_hostname(false)
            .into_ssl(host)?,
    };

    let mut tls_stream = SslStream::new(ssl, stream)?;
    if let Err(err) = Pin::new(&mut tls_stream).connect().await {
        let verify = tls_stream.ssl().verify_result();
        if verification == Verification::Enabled && verify != X509VerifyResult::OK {
            debug!(host, reason = verify.error_string(), "certificate rejected");
            return Err(FetchError::CertificateVerification {
                host: host.to_string(),
                reason: verify.error_string().to_string(),
            });
        }
        return Err(FetchError::Handshake {
            host: host.to_string(),
            reason: err.to_string(),
        });
    }

    Ok(tls_stream)
}

/// Snapshot of the negotiated parameters and the peer's chain, leaf first.
pub fn capture_session(ssl: &SslRef) -> TlsSession {
    let peer_chain = ssl
        .peer_cert_chain()
        .map(|chain| chain.iter().filter_map(|cert| cert.to_der().ok()).collect())
        .unwrap_or_default();

    TlsSession {
        cipher_suite: ssl
            .current_cipher()
            .map(|cipher| u16::from_be_bytes(cipher.protocol_id())),
        protocol_version: ssl.version2().and_then(version_id),
        peer_chain,
    }
}

fn version_id(version: SslVersion) -> Option<u16> {
    let known = [
        (SslVersion::SSL3, 0x0300),
        (SslVersion::TLS1, 0x0301),
        (SslVersion::TLS1_1, 0x0302),
        (SslVersion::TLS1_2, 0x0303),
        (SslVersion::TLS1_3, 0x0304),
    ];
    known
        .into_iter()
        .find(|(candidate, _)| *candidate == version)
        .map(|(_, id)| id)
}
