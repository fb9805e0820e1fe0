use std::time::Duration;
use thiserror::Error;

/// Why a single attempt failed to produce a response.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("certificate verification failed for {host}: {reason}")]
    CertificateVerification { host: String, reason: String },

    #[error("TLS handshake failed for {host}: {reason}")]
    Handshake { host: String, reason: String },

    #[error("TLS setup failed: {0}")]
    TlsSetup(#[from] openssl::error::ErrorStack),

    #[error("malformed HTTP response: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("probe cancelled")]
    Cancelled,
}

impl FetchError {
    /// The peer's certificate chain could not be verified. This is the only
    /// failure that earns a retry with verification disabled.
    pub fn is_certificate_verification(&self) -> bool {
        matches!(self, FetchError::CertificateVerification { .. })
    }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;
