use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONCURRENCY: usize = 16;
pub const DEFAULT_MAX_HEAD_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub hosts: Vec<String>,
    pub input: Option<PathBuf>,
    pub records: Option<PathBuf>,
    pub concurrency: usize,
    pub deadline: Option<Duration>,
    pub probe: ProbeConfig,
    pub output: OutputConfig,
}

/// Knobs shared by every attempt of every probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub request_timeout: Duration,
    pub max_head_bytes: usize,
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_head_bytes: DEFAULT_MAX_HEAD_BYTES,
            user_agent: concat!("site-prober/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputFormat {
    Json,
    Jsonl,
    Pretty,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Jsonl => write!(f, "jsonl"),
            OutputFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Outcome of probing one hostname.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub site: String,
    pub http_status: HttpStatus,
    pub redirected: bool,
    pub redirected_to_secure: bool,
    pub insecure_retry_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_info: Option<TlsInfo>,
    #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    /// A result for a host that never produced a response.
    pub fn unreachable(site: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            http_status: HttpStatus::Unreachable,
            redirected: false,
            redirected_to_secure: false,
            insecure_retry_used: false,
            tls_info: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    Observed(u16),
    Unreachable,
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpStatus::Observed(code) => write!(f, "{code}"),
            HttpStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl Serialize for HttpStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HttpStatus::Observed(code) => serializer.serialize_u16(*code),
            HttpStatus::Unreachable => serializer.serialize_str("unreachable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsInfo {
    pub cipher_suite_name: String,
    pub protocol_version_name: String,
    pub cert_issuer: String,
    pub cert_subject: String,
    pub cert_expiration: DateTime<Utc>,
    pub cert_fingerprint: String,
}
