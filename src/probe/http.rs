use crate::error::{FetchError, FetchResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use url::{Position, Url};

/// Status line and the headers the prober cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub location: Option<String>,
}

/// Sends one GET for `url` and reads back only the response head. Redirects
/// are reported, never followed.
pub async fn exchange<S>(
    stream: &mut S,
    url: &Url,
    user_agent: &str,
    max_head_bytes: usize,
) -> FetchResult<ResponseHead>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = build_request(url, user_agent);
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let head = read_head(stream, max_head_bytes).await?;
    parse_head(&head)
}

pub fn build_request(url: &Url, user_agent: &str) -> String {
    let path = &url[Position::BeforePath..Position::AfterQuery];
    let path = if path.is_empty() { "/" } else { path };
    let host = &url[Position::BeforeHost..Position::AfterPort];

    // No Accept-Encoding: the head must arrive uncompressed.
    format!(
        "GET {path} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: {user_agent}\r\nAccept: */*\r\nConnection: close\r\n\r\n"
    )
}

async fn read_head<S>(stream: &mut S, max_head_bytes: usize) -> FetchResult<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; max_head_bytes.max(1)];
    let mut total = 0usize;
    loop {
        let n = stream.read(&mut buf[total..]).await?;
        if n == 0 {
            break;
        }
        total += n;
        if let Some(end) = find_header_end(&buf[..total]) {
            total = end;
            break;
        }
        if total >= buf.len() {
            return Err(FetchError::Protocol(format!(
                "response head exceeds {max_head_bytes} bytes"
            )));
        }
    }
    buf.truncate(total);
    if buf.is_empty() {
        return Err(FetchError::Protocol("connection closed before a response".into()));
    }
    Ok(buf)
}

fn find_header_end(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

pub fn parse_head(bytes: &[u8]) -> FetchResult<ResponseHead> {
    let text = String::from_utf8_lossy(bytes);
    let mut lines = text.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));

    let status_line = lines.next().unwrap_or_default();
    let status = parse_status_line(status_line)
        .ok_or_else(|| FetchError::Protocol(format!("bad status line {status_line:?}")))?;

    let mut location = None;
    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("location") && location.is_none() {
            let value = value.trim();
            if !value.is_empty() {
                location = Some(value.to_string());
            }
        }
    }

    Ok(ResponseHead { status, location })
}

fn parse_status_line(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    let code = parts.next()?;
    if code.len() != 3 {
        return None;
    }
    code.parse().ok()
}
