//! Deterministic fixtures for unit tests: a scripted transport and
//! throwaway certificates.

use crate::error::{FetchError, FetchResult};
use crate::probe::{Response, TlsSession, Transport, Verification};
use async_trait::async_trait;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::extension::BasicConstraints;
use openssl::x509::{X509NameBuilder, X509};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

type Reply = Arc<dyn Fn() -> FetchResult<Response> + Send + Sync>;

#[derive(Clone)]
struct Step {
    delay: Option<Duration>,
    reply: Option<Reply>,
}

/// Answers fetches from a table keyed by URL and verification mode and
/// records every call. Unscripted fetches fail with a refused connection.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    steps: Arc<Mutex<HashMap<(String, Verification), Step>>>,
    calls: Arc<Mutex<Vec<(String, Verification)>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, url: &str, verification: Verification, step: Step) -> Self {
        let key = (normalize(url), verification);
        self.steps.lock().unwrap().insert(key, step);
        self
    }

    fn reply(
        self,
        url: &str,
        verification: Verification,
        status: u16,
        location: Option<&str>,
        tls: Option<TlsSession>,
        delay: Option<Duration>,
    ) -> Self {
        let response = Response {
            url: Url::parse(url).unwrap(),
            status,
            location: location.map(str::to_string),
            tls,
        };
        let reply: Reply = Arc::new(move || Ok(response.clone()));
        self.script(
            url,
            verification,
            Step {
                delay,
                reply: Some(reply),
            },
        )
    }

    pub fn respond(self, url: &str, status: u16, location: Option<&str>) -> Self {
        self.reply(url, Verification::Enabled, status, location, None, None)
    }

    pub fn respond_after(self, url: &str, status: u16, delay: Duration) -> Self {
        self.reply(url, Verification::Enabled, status, None, None, Some(delay))
    }

    pub fn respond_tls(self, url: &str, status: u16, session: TlsSession) -> Self {
        self.reply(url, Verification::Enabled, status, None, Some(session), None)
    }

    pub fn respond_tls_insecure(self, url: &str, status: u16, session: TlsSession) -> Self {
        self.reply(url, Verification::Disabled, status, None, Some(session), None)
    }

    pub fn fail<F>(self, url: &str, verification: Verification, err: F) -> Self
    where
        F: Fn() -> FetchError + Send + Sync + 'static,
    {
        let reply: Reply = Arc::new(move || Err(err()));
        self.script(
            url,
            verification,
            Step {
                delay: None,
                reply: Some(reply),
            },
        )
    }

    /// The fetch never completes.
    pub fn stall(self, url: &str) -> Self {
        self.script(
            url,
            Verification::Enabled,
            Step {
                delay: None,
                reply: None,
            },
        )
    }

    pub fn calls(&self) -> Vec<(String, Verification)> {
        self.calls.lock().unwrap().clone()
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, url: &Url, verification: Verification) -> FetchResult<Response> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), verification));
        let step = self
            .steps
            .lock()
            .unwrap()
            .get(&(url.to_string(), verification))
            .cloned();

        let Some(step) = step else {
            return Err(FetchError::Connect {
                addr: url.to_string(),
                source: std::io::ErrorKind::ConnectionRefused.into(),
            });
        };
        if let Some(delay) = step.delay {
            tokio::time::sleep(delay).await;
        }
        match step.reply {
            Some(reply) => reply(),
            None => std::future::pending().await,
        }
    }
}

pub struct CertSpec {
    pub common_name: String,
    pub organization: Option<String>,
    pub ca: bool,
}

impl CertSpec {
    pub fn leaf(common_name: &str) -> Self {
        Self {
            common_name: common_name.to_string(),
            organization: None,
            ca: false,
        }
    }

    pub fn ca(common_name: &str) -> Self {
        Self {
            common_name: common_name.to_string(),
            organization: None,
            ca: true,
        }
    }
}

/// DER of a fresh self-signed certificate described by `spec`.
pub fn certificate(spec: &CertSpec) -> Vec<u8> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    if let Some(org) = &spec.organization {
        name.append_entry_by_text("O", org).unwrap();
    }
    name.append_entry_by_text("CN", &spec.common_name).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();

    let mut constraints = BasicConstraints::new();
    if spec.ca {
        constraints.critical().ca();
    }
    builder.append_extension(constraints.build().unwrap()).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    builder.build().to_der().unwrap()
}

/// DER of a name holding a single CN stored as a UniversalString, which has no
/// text decoding on the parsing side.
pub fn universal_string_name(raw: &str) -> Vec<u8> {
    // Encoded by hand: OpenSSL refuses to build a name whose UniversalString
    // bytes are not valid UCS-4. Short-form lengths only.
    fn tlv(tag: u8, body: &[u8]) -> Vec<u8> {
        assert!(body.len() < 0x80);
        let mut out = vec![tag, body.len() as u8];
        out.extend_from_slice(body);
        out
    }
    let mut atv = tlv(0x06, &[0x55, 0x04, 0x03]);
    atv.extend(tlv(0x1c, raw.as_bytes()));
    tlv(0x30, &tlv(0x31, &tlv(0x30, &atv)))
}
