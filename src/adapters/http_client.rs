use crate::core::codec::{decode_elements, StreamFormat, APPLICATION_JSON, APPLICATION_NDJSON};
use crate::core::{ClientSettings, PollReport, Poller, PongBatch};
use crate::domain::model::concat_labels;
use crate::utils::error::{PingError, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use url::Url;

const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Parameters of one `/ping/buffered/{times}/{delay}` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRequest {
    pub times: u64,
    pub delay_ms: u64,
}

impl Default for PingRequest {
    fn default() -> Self {
        Self {
            times: 5,
            delay_ms: 200,
        }
    }
}

impl PingRequest {
    pub fn path(&self) -> String {
        format!("/ping/buffered/{}/{}", self.times, self.delay_ms)
    }
}

#[derive(Debug, Clone)]
pub struct PingClient {
    client: Client,
    base_url: Url,
    write_timeout: Duration,
}

impl PingClient {
    pub fn new<C: ClientSettings + ?Sized>(settings: &C) -> Result<Self> {
        let raw_base = settings.base_url();
        let base_url = Url::parse(&raw_base).map_err(|e| PingError::InvalidConfigValueError {
            field: "client.base_url".to_string(),
            value: raw_base.clone(),
            reason: format!("Invalid URL format: {}", e),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/x-ndjson, application/json"),
        );

        let keepalive = settings.keep_alive().then_some(TCP_KEEPALIVE_INTERVAL);
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout())
            .read_timeout(settings.read_timeout())
            .tcp_keepalive(keepalive)
            .default_headers(headers)
            .build()?;

        tracing::debug!(
            "Built ping client for {} (connect {:?}, read {:?}, write {:?}, keep-alive {})",
            base_url,
            settings.connect_timeout(),
            settings.read_timeout(),
            settings.write_timeout(),
            settings.keep_alive()
        );

        Ok(Self {
            client,
            base_url,
            write_timeout: settings.write_timeout(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn url_for(&self, request: &PingRequest) -> Result<Url> {
        self.base_url
            .join(&request.path())
            .map_err(|e| PingError::InvalidConfigValueError {
                field: "client.base_url".to_string(),
                value: self.base_url.to_string(),
                reason: format!("Cannot build request URL: {}", e),
            })
    }

    /// Send the request and wait for the response head.
    ///
    /// Sending is bounded by the write timeout; reading the body afterwards is
    /// bounded by the client's read timeout between chunks.
    pub async fn fetch(&self, request: &PingRequest) -> Result<Response> {
        let url = self.url_for(request)?;
        tracing::debug!("Making ping request to: {}", url);

        let send = self
            .client
            .get(url.clone())
            .header(ACCEPT, APPLICATION_JSON)
            .send();
        let response = tokio::time::timeout(self.write_timeout, send)
            .await
            .map_err(|_| PingError::TimeoutError {
                phase: "request send".to_string(),
                millis: self.write_timeout.as_millis(),
            })??;

        tracing::debug!("Ping response status: {}", response.status());

        if !response.status().is_success() {
            return Err(PingError::StatusError {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }
}

fn response_format(response: &Response) -> StreamFormat {
    StreamFormat::from_content_type(
        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
    )
}

fn describe(batch: &PongBatch) -> String {
    let labels: Vec<&str> = batch.iter().map(|pong| pong.pong.as_str()).collect();
    format!("[{}]", labels.join(", "))
}

/// 逐一解碼回應中的每個批次，單一元素錯誤只記錄並略過
pub struct StreamPoller {
    name: String,
    client: PingClient,
    request: PingRequest,
}

impl StreamPoller {
    pub fn new(client: PingClient, request: PingRequest) -> Self {
        Self {
            name: "stream-poller".to_string(),
            client,
            request,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Poller for StreamPoller {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&self) -> Result<PollReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        let response = self.client.fetch(&self.request).await?;
        let format = response_format(&response);
        if format == StreamFormat::Ndjson {
            tracing::debug!("Decoding {} response line by line", APPLICATION_NDJSON);
        }

        let mut elements = Box::pin(decode_elements::<_, _, _, PongBatch>(
            response.bytes_stream(),
            format,
        ));

        let mut batches = Vec::new();
        let mut skipped = 0;
        while let Some(element) = elements.next().await {
            match element {
                Ok(batch) => {
                    tracing::info!("Flux Next {}", describe(&batch));
                    batches.push(batch);
                }
                Err(e) => {
                    skipped += 1;
                    tracing::error!("⚠️ '{}' skipping element: {}", self.name, e);
                }
            }
        }

        let label = concat_labels(&batches);
        tracing::info!("Flux result: ({})", label);

        Ok(PollReport {
            poller: self.name.clone(),
            started_at,
            batches,
            skipped,
            label,
            elapsed: start.elapsed(),
        })
    }
}

/// Decodes the whole body as one two-dimensional value.
pub struct AggregatePoller {
    name: String,
    client: PingClient,
    request: PingRequest,
}

impl AggregatePoller {
    pub fn new(client: PingClient, request: PingRequest) -> Self {
        Self {
            name: "aggregate-poller".to_string(),
            client,
            request,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Poller for AggregatePoller {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&self) -> Result<PollReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        let response = self.client.fetch(&self.request).await?;
        let body = response.bytes().await?;
        let batches: Vec<PongBatch> = serde_json::from_slice(&body)?;

        let described: Vec<String> = batches.iter().map(describe).collect();
        tracing::info!("Mono Next [{}]", described.join(", "));

        let label = concat_labels(&batches);
        tracing::info!("Mono result: {}", label);

        Ok(PollReport {
            poller: self.name.clone(),
            started_at,
            batches,
            skipped: 0,
            label,
            elapsed: start.elapsed(),
        })
    }
}
