use crate::model::{
    Config, OutputConfig, OutputFormat, ProbeConfig, DEFAULT_CONCURRENCY, DEFAULT_MAX_HEAD_BYTES,
};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(author, version, about = "Probe websites for redirect and TLS posture", long_about = None)]
pub struct Cli {
    /// Hostnames (or http/https URLs) to probe
    #[arg(value_name = "HOST")]
    pub hosts: Vec<String>,

    /// File containing hostnames (one per line)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Resource-record JSON whose record names are probed
    #[arg(short = 'r', long = "records", value_name = "FILE")]
    pub records: Option<PathBuf>,

    /// Concurrency limit
    #[arg(long = "concurrency", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long = "timeout", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Cancel every outstanding probe after this many seconds
    #[arg(long = "deadline", value_name = "SECS")]
    pub deadline_secs: Option<u64>,

    /// Max bytes accepted for a response head
    #[arg(long = "max-head-bytes", default_value_t = DEFAULT_MAX_HEAD_BYTES)]
    pub max_head_bytes: usize,

    /// Output format
    #[arg(long = "output", default_value_t = OutputFormat::Json)]
    pub output: OutputFormat,

    /// Human readable output, same as --output pretty
    #[arg(long = "pretty", action = ArgAction::SetTrue)]
    pub pretty: bool,
}

impl Cli {
    pub fn into_config(self) -> anyhow::Result<Config> {
        if self.hosts.is_empty() && self.input.is_none() && self.records.is_none() {
            anyhow::bail!("at least one HOST, --input or --records is required");
        }

        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be greater than zero");
        }

        if self.timeout_secs == 0 {
            anyhow::bail!("timeout must be greater than zero");
        }

        if self.deadline_secs == Some(0) {
            anyhow::bail!("deadline must be greater than zero");
        }

        Ok(Config {
            hosts: self.hosts,
            input: self.input,
            records: self.records,
            concurrency: self.concurrency,
            deadline: self.deadline_secs.map(Duration::from_secs),
            probe: ProbeConfig {
                request_timeout: Duration::from_secs(self.timeout_secs),
                max_head_bytes: self.max_head_bytes.max(1),
                ..ProbeConfig::default()
            },
            output: OutputConfig {
                format: if self.pretty {
                    OutputFormat::Pretty
                } else {
                    self.output
                },
            },
        })
    }
}
