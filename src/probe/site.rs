use super::{CancelSignal, Response, Transport, Verification};
use crate::error::{FetchError, FetchResult};
use crate::input::{first_hop_url, format_url};
use crate::model::{HttpStatus, ProbeConfig, ProbeResult};
use crate::telemetry;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};
use url::Url;

/// Where a probe currently is in its attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    FirstAttempted,
    Redirected,
    SecondAttempted,
    RetriedInsecure,
    Finalized,
}

/// How the first hop's response points onward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectHop {
    None,
    Insecure(Url),
    Secure(Url),
}

/// Reads a 301/302 `Location` that names an absolute http(s) URL. Anything
/// else, including an unparsable header, is not a usable redirect.
pub fn inspect_redirect(status: u16, location: Option<&str>) -> RedirectHop {
    if !matches!(status, 301 | 302) {
        return RedirectHop::None;
    }
    let Some(location) = location.map(str::trim) else {
        return RedirectHop::None;
    };
    if !location
        .get(..4)
        .map(|prefix| prefix.eq_ignore_ascii_case("http"))
        .unwrap_or(false)
    {
        return RedirectHop::None;
    }

    match Url::parse(location) {
        Ok(url) if url.scheme() == "https" => RedirectHop::Secure(url),
        Ok(url) if url.scheme() == "http" => RedirectHop::Insecure(url),
        _ => RedirectHop::None,
    }
}

/// Characterizes one site's HTTP/TLS posture with at most three requests.
pub struct SiteProber<T> {
    transport: T,
    cfg: ProbeConfig,
}

impl<T: Transport> SiteProber<T> {
    pub fn new(transport: T, cfg: ProbeConfig) -> Self {
        Self { transport, cfg }
    }

    pub async fn probe(&self, host: &str) -> ProbeResult {
        self.probe_with(host, &CancelSignal::never()).await
    }

    #[instrument(skip(self, cancel))]
    pub async fn probe_with(&self, host: &str, cancel: &CancelSignal) -> ProbeResult {
        let mut record = ProbeRecord::new(host);

        let first_url = match first_hop_url(host) {
            Ok(url) => url,
            Err(err) => return record.finish(Err(err)),
        };
        let secure_url = format_url(host, true).unwrap_or_else(|| first_url.clone());

        let mut current = first_url;
        record.site = current.to_string();
        let first = self.attempt(&current, Verification::Enabled, cancel).await;
        record.advance(Stage::FirstAttempted);

        let mut outcome = match first {
            Ok(response) => {
                record.observe(&response);
                current = match inspect_redirect(response.status, response.location.as_deref()) {
                    RedirectHop::Secure(url) => {
                        record.redirected = true;
                        record.redirected_to_secure = true;
                        record.advance(Stage::Redirected);
                        url
                    }
                    RedirectHop::Insecure(url) => {
                        debug!(location = %url, "redirect stays on plain http");
                        record.redirected = true;
                        record.advance(Stage::Redirected);
                        secure_url
                    }
                    RedirectHop::None => secure_url,
                };

                record.site = current.to_string();
                let second = self.attempt(&current, Verification::Enabled, cancel).await;
                record.advance(Stage::SecondAttempted);
                second
            }
            Err(err) => Err(err),
        };

        if let Err(err) = &outcome {
            if err.is_certificate_verification() {
                warn!(site = %current, error = %err, "retrying without certificate verification");
                outcome = self.attempt(&current, Verification::Disabled, cancel).await;
                record.insecure_retry_used = true;
                record.advance(Stage::RetriedInsecure);
            }
        }

        record.finish(outcome)
    }

    async fn attempt(
        &self,
        url: &Url,
        verification: Verification,
        cancel: &CancelSignal,
    ) -> FetchResult<Response> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let limit = self.cfg.request_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            res = timeout(limit, self.transport.fetch(url, verification)) => {
                res.unwrap_or(Err(FetchError::Timeout(limit)))
            }
        }
    }
}

/// Mutable state accumulated across attempts; converted once into a
/// [`ProbeResult`].
#[derive(Debug)]
struct ProbeRecord {
    stage: Stage,
    site: String,
    last_status: Option<u16>,
    redirected: bool,
    redirected_to_secure: bool,
    insecure_retry_used: bool,
}

impl ProbeRecord {
    fn new(host: &str) -> Self {
        Self {
            stage: Stage::Init,
            site: host.trim().to_string(),
            last_status: None,
            redirected: false,
            redirected_to_secure: false,
            insecure_retry_used: false,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.stage, "{:?} -> {:?}", self.stage, next);
        debug!(from = ?self.stage, to = ?next, "probe stage");
        self.stage = next;
    }

    fn observe(&mut self, response: &Response) {
        self.site = response.url.to_string();
        self.last_status = Some(response.status);
    }

    fn finish(mut self, outcome: FetchResult<Response>) -> ProbeResult {
        self.advance(Stage::Finalized);
        let (tls_info, error) = match outcome {
            Ok(response) => {
                self.observe(&response);
                (response.tls.as_ref().and_then(telemetry::extract), None)
            }
            Err(err) => (None, Some(err.to_string())),
        };

        ProbeResult {
            site: self.site,
            http_status: self
                .last_status
                .map(HttpStatus::Observed)
                .unwrap_or(HttpStatus::Unreachable),
            redirected: self.redirected,
            redirected_to_secure: self.redirected_to_secure,
            insecure_retry_used: self.insecure_retry_used,
            tls_info,
            error,
        }
    }
}
