pub mod http;
pub mod net;
pub mod site;
pub mod tls;

pub use net::NetTransport;
pub use site::{inspect_redirect, RedirectHop, SiteProber, Stage};

use crate::error::FetchResult;
use async_trait::async_trait;
use tokio::sync::watch;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verification {
    Enabled,
    Disabled,
}

/// What one attempt brought back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub url: Url,
    pub status: u16,
    pub location: Option<String>,
    pub tls: Option<TlsSession>,
}

/// Parameters of an established TLS session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSession {
    pub cipher_suite: Option<u16>,
    pub protocol_version: Option<u16>,
    /// DER encoded certificates as presented by the peer, leaf first.
    pub peer_chain: Vec<Vec<u8>>,
}

/// Issues a single GET and returns the first response as-is.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &Url, verification: Verification) -> FetchResult<Response>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn fetch(&self, url: &Url, verification: Verification) -> FetchResult<Response> {
        (**self).fetch(url, verification).await
    }
}

/// Cooperative cancellation shared between the engine and running probes.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    pub fn new() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
    }

    /// A signal that never fires.
    pub fn never() -> CancelSignal {
        CancelSignal { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolves once cancellation is requested. Pends forever if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&self) {
        if let Some(mut rx) = self.rx.clone() {
            if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}
