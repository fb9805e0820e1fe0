use crate::model::ProbeResult;
use crate::probe::{CancelSignal, SiteProber, Transport};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

/// Runs one probe per host with a cap on how many are in flight.
pub struct Engine<T> {
    prober: Arc<SiteProber<T>>,
    sem: Arc<Semaphore>,
}

impl<T: Transport + 'static> Engine<T> {
    pub fn new(prober: SiteProber<T>, concurrency: usize) -> anyhow::Result<Self> {
        if concurrency == 0 {
            anyhow::bail!("concurrency must be greater than zero");
        }
        Ok(Self {
            prober: Arc::new(prober),
            sem: Arc::new(Semaphore::new(concurrency)),
        })
    }

    /// Probes every host and returns the results in input order. Returns
    /// only after every spawned probe has finished.
    #[instrument(skip_all, fields(hosts = hosts.len()))]
    pub async fn run(
        &self,
        hosts: Vec<String>,
        cancel: CancelSignal,
    ) -> anyhow::Result<Vec<ProbeResult>> {
        let mut slots: Vec<Option<ProbeResult>> = vec![None; hosts.len()];
        let mut tasks = FuturesUnordered::new();

        for (idx, host) in hosts.into_iter().enumerate() {
            let permit = self.sem.clone().acquire_owned().await?;
            let prober = self.prober.clone();
            let cancel = cancel.clone();
            let task_host = host.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                prober.probe_with(&task_host, &cancel).await
            });
            tasks.push(async move { (idx, host, handle.await) });
        }

        while let Some((idx, host, joined)) = tasks.next().await {
            let result = match joined {
                Ok(result) => result,
                Err(err) => {
                    warn!(%host, error = %err, "probe task failed");
                    ProbeResult::unreachable(host, "probe task aborted")
                }
            };
            debug!(idx, site = %result.site, status = %result.http_status, "probe finished");
            slots[idx] = Some(result);
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchResult;
    use crate::model::{HttpStatus, ProbeConfig};
    use crate::probe::{Response, Verification};
    use crate::test_support::ScriptedTransport;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::Instant;
    use url::Url;

    fn delayed(hosts: &[(&str, u64)]) -> ScriptedTransport {
        hosts.iter().fold(ScriptedTransport::new(), |t, (host, secs)| {
            t.respond_after(&format!("http://{host}/"), 200, Duration::from_secs(*secs))
                .respond_after(&format!("https://{host}/"), 200, Duration::from_secs(*secs))
        })
    }

    fn engine<T: Transport + 'static>(transport: T, concurrency: usize) -> Engine<T> {
        Engine::new(SiteProber::new(transport, ProbeConfig::default()), concurrency).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn results_follow_input_order() {
        let transport = delayed(&[("slow.test", 3), ("fast.test", 1), ("mid.test", 2)]);
        let hosts = vec!["slow.test".to_string(), "fast.test".into(), "mid.test".into()];

        let started = Instant::now();
        let results = engine(transport, 16)
            .run(hosts, CancelSignal::never())
            .await
            .unwrap();

        let sites: Vec<&str> = results.iter().map(|r| r.site.as_str()).collect();
        assert_eq!(
            sites,
            vec!["https://slow.test/", "https://fast.test/", "https://mid.test/"]
        );
        assert!(started.elapsed() < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_limit_serializes_probes() {
        let transport = delayed(&[("a.test", 1), ("b.test", 1), ("c.test", 1)]);
        let hosts = vec!["a.test".to_string(), "b.test".into(), "c.test".into()];

        let started = Instant::now();
        let results = engine(transport, 1)
            .run(hosts, CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    struct Explosive(ScriptedTransport);

    #[async_trait]
    impl Transport for Explosive {
        async fn fetch(&self, url: &Url, verification: Verification) -> FetchResult<Response> {
            if url.host_str() == Some("boom.test") {
                panic!("transport exploded");
            }
            self.0.fetch(url, verification).await
        }
    }

    #[tokio::test]
    async fn a_panicking_probe_does_not_take_down_its_siblings() {
        let transport = Explosive(
            ScriptedTransport::new()
                .respond("http://ok.test/", 200, None)
                .respond("https://ok.test/", 200, None),
        );
        let hosts = vec!["boom.test".to_string(), "ok.test".into()];

        let results = engine(transport, 2)
            .run(hosts, CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(results[0].site, "boom.test");
        assert_eq!(results[0].http_status, HttpStatus::Unreachable);
        assert_eq!(results[0].error.as_deref(), Some("probe task aborted"));
        assert_eq!(results[1].http_status, HttpStatus::Observed(200));
        assert!(results[1].error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_reaches_every_outstanding_probe() {
        let transport = ScriptedTransport::new()
            .stall("http://one.test/")
            .stall("http://two.test/");
        let hosts = vec!["one.test".to_string(), "two.test".into()];
        let (handle, signal) = CancelSignal::new();

        let engine = engine(transport, 4);
        let cancel_later = async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            handle.cancel();
        };
        let (results, _) = tokio::join!(engine.run(hosts, signal), cancel_later);

        let results = results.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| r.error.as_deref() == Some("probe cancelled")));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let prober = SiteProber::new(ScriptedTransport::new(), ProbeConfig::default());
        assert!(Engine::new(prober, 0).is_err());
    }
}
