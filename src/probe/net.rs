use super::http::exchange;
use super::tls::{capture_session, handshake};
use super::{Response, Transport, Verification};
use crate::error::{FetchError, FetchResult};
use crate::model::ProbeConfig;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, instrument};
use url::{Host, Url};

/// Talks HTTP/1.1 to the real network, one fresh connection per attempt.
#[derive(Debug, Clone)]
pub struct NetTransport {
    cfg: ProbeConfig,
}

impl NetTransport {
    pub fn new(cfg: ProbeConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Transport for NetTransport {
    #[instrument(skip(self, url), fields(url = %url))]
    async fn fetch(&self, url: &Url, verification: Verification) -> FetchResult<Response> {
        let (host, addrs) = resolve(url).await?;
        let stream = connect_any(&addrs).await?;

        let (head, tls) = match url.scheme() {
            "https" => {
                let mut tls_stream = handshake(stream, &host, verification).await?;
                let session = capture_session(tls_stream.ssl());
                let head = exchange(
                    &mut tls_stream,
                    url,
                    &self.cfg.user_agent,
                    self.cfg.max_head_bytes,
                )
                .await?;
                (head, Some(session))
            }
            _ => {
                let mut stream = stream;
                let head =
                    exchange(&mut stream, url, &self.cfg.user_agent, self.cfg.max_head_bytes)
                        .await?;
                (head, None)
            }
        };

        debug!(status = head.status, encrypted = tls.is_some(), "response head received");
        Ok(Response {
            url: url.clone(),
            status: head.status,
            location: head.location,
            tls,
        })
    }
}

/// Host name used for SNI and verification, plus every resolved address in
/// resolver order.
async fn resolve(url: &Url) -> FetchResult<(String, Vec<SocketAddr>)> {
    let port = url
        .port_or_known_default()
        .ok_or_else(|| FetchError::InvalidTarget(format!("{url}: no port")))?;

    match url.host() {
        Some(Host::Ipv4(ip)) => Ok((ip.to_string(), vec![SocketAddr::from((ip, port))])),
        Some(Host::Ipv6(ip)) => Ok((ip.to_string(), vec![SocketAddr::from((ip, port))])),
        Some(Host::Domain(domain)) => {
            let addrs: Vec<SocketAddr> = lookup_host((domain, port))
                .await
                .map_err(|source| FetchError::Resolve {
                    host: domain.to_string(),
                    source,
                })?
                .collect();
            if addrs.is_empty() {
                return Err(FetchError::Resolve {
                    host: domain.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "no addresses returned",
                    ),
                });
            }
            Ok((domain.to_string(), addrs))
        }
        None => Err(FetchError::InvalidTarget(format!("{url}: missing host"))),
    }
}

/// Tries each address in turn; the last failure is reported when none
/// accepts.
async fn connect_any(addrs: &[SocketAddr]) -> FetchResult<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                debug!(%addr, "connected");
                return Ok(stream);
            }
            Err(source) => {
                debug!(%addr, error = %source, "connect failed");
                last_err = Some(FetchError::Connect {
                    addr: addr.to_string(),
                    source,
                });
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        FetchError::InvalidTarget("no addresses to connect to".into())
    }))
}
