//! Turns a captured TLS session into the telemetry reported for a site.

use crate::model::TlsInfo;
use crate::probe::TlsSession;
use crate::registry::{cipher_suite_name, protocol_version_name};
use chrono::{DateTime, Utc};
use x509_parser::certificate::X509Certificate;
use x509_parser::der_parser::asn1_rs::{Any, Class};
use x509_parser::objects::{oid2abbrev, oid_registry};
use x509_parser::parse_x509_certificate;
use x509_parser::x509::X509Name;

/// Telemetry for the session, or `None` when the chain holds no end-entity
/// certificate to report on.
pub fn extract(session: &TlsSession) -> Option<TlsInfo> {
    let (der, leaf) = select_leaf(&session.peer_chain)?;
    let not_after = leaf.validity().not_after.timestamp();
    let cert_expiration = DateTime::<Utc>::from_timestamp(not_after, 0)?;

    Some(TlsInfo {
        cipher_suite_name: session
            .cipher_suite
            .and_then(cipher_suite_name)
            .unwrap_or_default()
            .to_string(),
        protocol_version_name: session
            .protocol_version
            .and_then(protocol_version_name)
            .unwrap_or_default()
            .to_string(),
        cert_issuer: format_name(leaf.issuer()),
        cert_subject: format_name(leaf.subject()),
        cert_expiration,
        cert_fingerprint: fingerprint(der),
    })
}

/// First certificate, walking from the leaf toward the root, that is not
/// flagged as a CA. Entries that fail to parse are skipped.
pub fn select_leaf(chain: &[Vec<u8>]) -> Option<(&[u8], X509Certificate<'_>)> {
    chain.iter().find_map(|der| {
        let (_, cert) = parse_x509_certificate(der).ok()?;
        (!cert.is_ca()).then_some((der.as_slice(), cert))
    })
}

/// SHA-1 over the DER bytes, as colon separated lowercase hex.
pub fn fingerprint(der: &[u8]) -> String {
    crate::util::hex::to_hex(&openssl::sha::sha1(der), ":")
}

/// RFC 4514 string form: RDNs last to first, separated by `,`, with the
/// members of a multi-valued RDN joined by `+`.
fn format_name(name: &X509Name<'_>) -> String {
    let registry = oid_registry();
    let rdns: Vec<String> = name
        .iter_rdn()
        .map(|rdn| {
            rdn.iter()
                .map(|attr| {
                    let key = oid2abbrev(attr.attr_type(), registry)
                        .map(str::to_string)
                        .unwrap_or_else(|_| attr.attr_type().to_id_string());
                    let value = match attr.as_str() {
                        Ok(text) => escape_dn_value(text),
                        Err(_) => format!("#{}", hex_value(attr.attr_value())),
                    };
                    format!("{key}={value}")
                })
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect();
    rdns.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// BER encoding of a value with a low-numbered tag, as lowercase hex.
fn hex_value(value: &Any<'_>) -> String {
    let data = value.as_bytes();
    let class = match value.header.class() {
        Class::Universal => 0x00,
        Class::Application => 0x40,
        Class::ContextSpecific => 0x80,
        Class::Private => 0xc0,
    };
    let constructed = if value.header.is_constructed() { 0x20 } else { 0 };
    let tag = (value.header.tag().0 & 0x1f) as u8;

    let mut ber = Vec::with_capacity(data.len() + 6);
    ber.push(class | constructed | tag);
    if data.len() < 0x80 {
        ber.push(data.len() as u8);
    } else {
        let len = (data.len() as u32).to_be_bytes();
        let skip = len.iter().take_while(|b| **b == 0).count();
        ber.push(0x80 | (len.len() - skip) as u8);
        ber.extend_from_slice(&len[skip..]);
    }
    ber.extend_from_slice(data);
    crate::util::hex::to_hex(&ber, "")
}

/// RFC 4514 escaping for an attribute value.
pub fn escape_dn_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut out = String::with_capacity(value.len());
    for (idx, ch) in value.chars().enumerate() {
        match ch {
            '\\' | ',' | '+' | '"' | '<' | '>' | ';' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            '#' if idx == 0 => out.push_str("\\#"),
            ' ' if idx == 0 || idx == last => out.push_str("\\ "),
            _ => out.push(ch),
        }
    }
    out
}
