//! Server-Sent-Events transport over reqwest.
//!
//! Issues a long-lived GET, checks the response, and turns the body into a
//! [`FrameStream`] with `eventsource-stream`. Each SSE event's `data` field
//! is one frame; comments and retry hints are handled by the parser.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use url::Url;

use crate::error::Error;
use crate::transport::{FrameStream, Transport, TransportConfig};

/// Push-stream transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct SseTransport {
    http: reqwest::Client,
}

impl SseTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
        })
    }

    /// Wrap an existing client (tests, or callers sharing a pool).
    pub fn from_reqwest(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for SseTransport {
    fn open(&self, url: &Url, headers: HeaderMap) -> BoxFuture<'static, Result<FrameStream, Error>> {
        let http = self.http.clone();
        let url = url.clone();

        Box::pin(async move {
            tracing::debug!(url = %url, "opening event stream");

            let resp = http.get(url).headers(headers).send().await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::HttpStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            if let Some(ct) = resp.headers().get(CONTENT_TYPE) {
                let ct = ct.to_str().unwrap_or_default();
                if !ct.starts_with("text/event-stream") {
                    return Err(Error::UnexpectedContentType(ct.to_owned()));
                }
            }

            let frames = resp
                .bytes_stream()
                .eventsource()
                .filter_map(|item| async move {
                    match item {
                        Ok(event) if event.data.is_empty() => None,
                        Ok(event) => {
                            tracing::trace!(event = %event.event, id = %event.id, "sse event");
                            Some(Ok(event.data))
                        }
                        Err(e) => Some(Err(Error::Stream(e.to_string()))),
                    }
                })
                .boxed();

            Ok(frames)
        })
    }
}
