use clap::Parser;
use site_prober::cli::Cli;
use site_prober::engine::Engine;
use site_prober::input;
use site_prober::output;
use site_prober::probe::{CancelHandle, CancelSignal, NetTransport, SiteProber};
use std::io::BufWriter;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let cfg = cli.into_config()?;

    let hosts = input::collect_hosts(&cfg).await?;
    let bulk = cfg.input.is_some() || cfg.records.is_some() || hosts.len() != 1;

    let (handle, cancel) = CancelSignal::new();
    spawn_cancel_triggers(Arc::new(handle), cfg.deadline);

    let prober = SiteProber::new(NetTransport::new(cfg.probe.clone()), cfg.probe.clone());
    let engine = Engine::new(prober, cfg.concurrency)?;
    let results = engine.run(hosts, cancel).await?;

    let mut writer = BufWriter::new(std::io::stdout().lock());
    output::write_report(&mut writer, &cfg.output, &results, bulk)?;

    Ok(())
}

fn spawn_cancel_triggers(handle: Arc<CancelHandle>, deadline: Option<Duration>) {
    tokio::spawn({
        let handle = handle.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling outstanding probes");
                handle.cancel();
            }
        }
    });

    if let Some(deadline) = deadline {
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            warn!(?deadline, "deadline reached, cancelling outstanding probes");
            handle.cancel();
        });
    }
}
