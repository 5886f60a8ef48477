//! HTTP client for the extraction service.
//!
//! # Responsibilities
//! - Start asynchronous extraction jobs
//! - Fetch job status and paged results
//! - Map transport failures and HTTP statuses onto the error taxonomy

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::config::schema::ExtractionConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::queue::SourceRef;
use crate::upstream::types::JobStatusPage;
use crate::upstream::ExtractionApi;

#[derive(Debug, Serialize)]
struct StartJobRequest<'a> {
    source: &'a SourceRef,
}

#[derive(Debug, Deserialize)]
struct StartJobResponse {
    job_id: String,
}

/// JSON-over-HTTP extraction API client.
#[derive(Clone)]
pub struct HttpExtractionClient {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpExtractionClient {
    pub fn new(config: &ExtractionConfig) -> PipelineResult<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            PipelineError::Config(format!("invalid extraction endpoint '{}': {e}", config.endpoint))
        })?;
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.as_str().trim_end_matches('/'), path)
    }

    fn transport_error(&self, e: reqwest::Error) -> PipelineError {
        if e.is_timeout() {
            PipelineError::Timeout(self.timeout.as_millis() as u64)
        } else {
            PipelineError::TransientUpstream(e.to_string())
        }
    }

    async fn check(&self, response: reqwest::Response) -> PipelineResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, body))
    }
}

/// Map a non-success HTTP status to an error kind.
pub fn classify_status(status: StatusCode, body: String) -> PipelineError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };
    match status {
        StatusCode::TOO_MANY_REQUESTS => PipelineError::Throttling(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::NOT_FOUND => {
            PipelineError::Validation(detail)
        }
        StatusCode::UNSUPPORTED_MEDIA_TYPE | StatusCode::PAYLOAD_TOO_LARGE => {
            PipelineError::UnsupportedInput(detail)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            PipelineError::TransientUpstream(detail)
        }
        s if s.is_server_error() => PipelineError::TransientUpstream(detail),
        _ => PipelineError::Validation(detail),
    }
}

#[async_trait]
impl ExtractionApi for HttpExtractionClient {
    async fn start_job(&self, source: &SourceRef) -> PipelineResult<String> {
        let response = self
            .client
            .post(self.url("jobs"))
            .json(&StartJobRequest { source })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let body: StartJobResponse = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(|e| PipelineError::TransientUpstream(format!("malformed start response: {e}")))?;
        Ok(body.job_id)
    }

    async fn get_status(&self, job_id: &str, next_token: Option<&str>) -> PipelineResult<JobStatusPage> {
        let mut request = self.client.get(self.url(&format!("jobs/{job_id}")));
        if let Some(token) = next_token {
            request = request.query(&[("next_token", token)]);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        self.check(response)
            .await?
            .json()
            .await
            .map_err(|e| PipelineError::TransientUpstream(format!("malformed status response: {e}")))
    }
}

impl std::fmt::Debug for HttpExtractionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExtractionClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}
