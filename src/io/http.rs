use async_trait::async_trait;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::ReadAt;
use anyhow::{Context, Result, bail};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 10;
const RETRY_STEP: Duration = Duration::from_millis(500);

/// Archive served over HTTP(S), read with `Range` requests.
///
/// Only the byte ranges the parser asks for are fetched, so listing a large
/// remote archive costs little more than its central directory.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred: AtomicU64,
}

impl HttpRangeReader {
    /// Probe `url` for its size and range support.
    ///
    /// A `HEAD` request is tried first. Servers that omit `Content-Length`
    /// or `Accept-Ranges` there are asked for the first byte instead, and
    /// the size is taken from the `Content-Range` reply.
    pub async fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        let head = client
            .head(&url)
            .send()
            .await
            .with_context(|| format!("HEAD {url}"))?;
        if !head.status().is_success() {
            bail!("HEAD {url} returned {}", head.status());
        }

        let size = match probe_head(head.headers()) {
            Some(size) => size,
            None => {
                log::debug!("{url}: HEAD inconclusive, probing with a one-byte range");
                let resp = client
                    .get(&url)
                    .header(RANGE, "bytes=0-0")
                    .send()
                    .await
                    .with_context(|| format!("GET {url}"))?;
                if resp.status() != StatusCode::PARTIAL_CONTENT {
                    bail!("{url} does not support range requests ({})", resp.status());
                }
                resp.headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(content_range_total)
                    .context("range reply carries no total size")?
            }
        };

        log::debug!("{url}: {size} bytes");
        Ok(Self {
            client,
            url,
            size,
            transferred: AtomicU64::new(0),
        })
    }

    /// Payload bytes received so far.
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    /// Send a request, retrying timeouts and refused connections with a
    /// linearly growing pause.
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> io::Result<Response> {
        let mut attempt = 1;
        loop {
            match build().send().await {
                Ok(resp) => return Ok(resp),
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < MAX_ATTEMPTS => {
                    log::warn!("{}: {e}, retry {attempt}/{}", self.url, MAX_ATTEMPTS - 1);
                    tokio::time::sleep(RETRY_STEP * attempt).await;
                    attempt += 1;
                }
                Err(e) if e.is_timeout() => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, e));
                }
                Err(e) => return Err(io::Error::other(e)),
            }
        }
    }
}

/// Size from a `HEAD` reply, when it also advertises byte ranges.
fn probe_head(headers: &HeaderMap) -> Option<u64> {
    let ranges = headers.get(ACCEPT_RANGES)?.to_str().ok()?;
    if !ranges.contains("bytes") {
        return None;
    }
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }
        let last = (offset + buf.len() as u64 - 1).min(self.size - 1);
        let range = format!("bytes={offset}-{last}");

        let resp = self
            .send(|| self.client.get(&self.url).header(RANGE, &range))
            .await?;
        if resp.status() != StatusCode::PARTIAL_CONTENT {
            return Err(io::Error::other(format!(
                "range {range} of {} returned {}",
                self.url,
                resp.status()
            )));
        }

        let body = resp.bytes().await.map_err(io::Error::other)?;
        let n = body.len().min(buf.len());
        buf[..n].copy_from_slice(&body[..n]);
        self.transferred.fetch_add(n as u64, Ordering::Relaxed);

        // Short bodies are fine: read_exact_at asks again for the rest.
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Total length from a `Content-Range: bytes <first>-<last>/<total>` value.
fn content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (span, total) = rest.split_once('/')?;
    let (first, last) = span.split_once('-')?;
    let first: u64 = first.trim().parse().ok()?;
    let last: u64 = last.trim().parse().ok()?;
    let total: u64 = total.trim().parse().ok()?;
    (first <= last && last < total).then_some(total)
}
