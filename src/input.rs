use crate::error::{FetchError, FetchResult};
use crate::model::Config;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

/// URL for the first attempt: the input as given, or `http://` prepended when
/// it carries no scheme.
pub fn first_hop_url(host: &str) -> FetchResult<Url> {
    let host = host.trim();
    if host.is_empty() {
        return Err(FetchError::InvalidTarget("empty hostname".into()));
    }

    let candidate = if has_scheme(host) {
        host.to_string()
    } else {
        format!("http://{host}")
    };
    let url = Url::parse(&candidate)
        .map_err(|err| FetchError::InvalidTarget(format!("{host}: {err}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(FetchError::InvalidTarget(format!(
                "{host}: unsupported scheme {other}"
            )))
        }
    }

    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(FetchError::InvalidTarget(format!("{host}: missing host")));
    }

    Ok(url)
}

/// A `scheme://` prefix, as opposed to `://` appearing later in a path or
/// query of a bare hostname.
fn has_scheme(host: &str) -> bool {
    host.split_once("://")
        .map(|(prefix, _)| !prefix.is_empty() && !prefix.contains(['/', '?', '#']))
        .unwrap_or(false)
}

/// The same target with its scheme forced to `https` or `http`.
pub fn format_url(host: &str, secure: bool) -> Option<Url> {
    let mut url = first_hop_url(host).ok()?;
    let scheme = if secure { "https" } else { "http" };
    url.set_scheme(scheme).ok()?;
    Some(url)
}

/// Hostnames named on the command line followed by those from the input and
/// records files, in that order.
pub async fn collect_hosts(cfg: &Config) -> anyhow::Result<Vec<String>> {
    let mut hosts = cfg.hosts.clone();

    if let Some(path) = &cfg.input {
        hosts.extend(read_hosts_file(path).await?);
    }

    if let Some(path) = &cfg.records {
        hosts.extend(read_records_file(path).await?);
    }

    Ok(hosts)
}

pub async fn read_hosts_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("cannot open input {}", path.display()))?;
    let mut reader = BufReader::new(file).lines();
    let mut hosts = Vec::new();
    while let Some(line) = reader.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        hosts.push(trimmed.to_string());
    }
    Ok(hosts)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordSetDocument {
    resource_records: Vec<RecordSet>,
}

#[derive(Debug, Deserialize)]
struct RecordSet {
    name: String,
}

/// Record names from a resource-record listing such as
/// `{"resourceRecords":[{"name":"www.example.com.","values":["192.0.2.1"]}]}`.
pub async fn read_records_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot open records {}", path.display()))?;
    parse_record_names(&raw).with_context(|| format!("invalid records file {}", path.display()))
}

fn parse_record_names(raw: &str) -> anyhow::Result<Vec<String>> {
    let doc: RecordSetDocument = serde_json::from_str(raw)?;
    Ok(doc
        .resource_records
        .into_iter()
        .map(|record| record.name.trim().trim_end_matches('.').to_string())
        .filter(|name| !name.is_empty())
        .collect())
}
