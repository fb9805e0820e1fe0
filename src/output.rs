use crate::model::{OutputConfig, OutputFormat, ProbeResult};
use serde::Serialize;
use std::io::Write;

/// Wrapper for reports covering more than one site.
#[derive(Debug, Serialize)]
pub struct BulkReport<'a> {
    pub sites: &'a [ProbeResult],
}

/// Writes the whole report and flushes. `bulk` forces the `{"sites": [..]}`
/// envelope for JSON even when only one result is present.
pub fn write_report<W: Write>(
    writer: &mut W,
    cfg: &OutputConfig,
    results: &[ProbeResult],
    bulk: bool,
) -> anyhow::Result<()> {
    match cfg.format {
        OutputFormat::Json => match results {
            [single] if !bulk => {
                serde_json::to_writer_pretty(&mut *writer, single)?;
                writeln!(writer)?;
            }
            _ => {
                serde_json::to_writer_pretty(&mut *writer, &BulkReport { sites: results })?;
                writeln!(writer)?;
            }
        },
        OutputFormat::Jsonl => {
            for result in results {
                let line = serde_json::to_string(result)?;
                writeln!(writer, "{line}")?;
            }
        }
        OutputFormat::Pretty => {
            for result in results {
                write_pretty(writer, result)?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

fn write_pretty<W: Write>(writer: &mut W, result: &ProbeResult) -> anyhow::Result<()> {
    writeln!(writer, "{} -> {}", result.site, result.http_status)?;
    writeln!(
        writer,
        "  redirect: {}",
        match (result.redirected, result.redirected_to_secure) {
            (true, true) => "https",
            (true, false) => "http",
            _ => "none",
        }
    )?;
    if result.insecure_retry_used {
        writeln!(writer, "  certificate: untrusted (verification disabled)")?;
    }
    if let Some(tls) = &result.tls_info {
        writeln!(
            writer,
            "  tls: {} {}",
            tls.protocol_version_name, tls.cipher_suite_name
        )?;
        writeln!(writer, "  subject: {}", tls.cert_subject)?;
        writeln!(writer, "  issuer: {}", tls.cert_issuer)?;
        writeln!(writer, "  expires: {}", tls.cert_expiration.to_rfc3339())?;
        writeln!(writer, "  sha1: {}", tls.cert_fingerprint)?;
    }
    if let Some(err) = &result.error {
        writeln!(writer, "  error: {err}")?;
    }
    Ok(())
}
