//! Typed client for the crawler's pull endpoints.
//!
//! User actions (create/start/stop) surface every failure to the caller.
//! Run views reach the same endpoints through [`RunBackend`]; the snapshot
//! poller decides itself what a failure means.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared_types::{
    CreateRunRequest, CreateRunResponse, PageList, PageRow, RunActionResponse, RunId, RunRecord,
};
use url::Url;

use crate::config::{TelemetryConfig, MAX_PAGES_LIMIT};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("HTTP error: {status} ({message})")]
    Http { status: u16, message: String },

    #[error("Failed to parse JSON: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Request(e.to_string())
        }
    }
}

/// The slice of the API a run view needs
#[async_trait]
pub trait RunBackend: Send + Sync + 'static {
    async fn get_run(&self, run_id: &RunId) -> Result<RunRecord, ApiError>;

    async fn list_pages(&self, run_id: &RunId, limit: usize) -> Result<Vec<PageRow>, ApiError>;

    async fn stop_run(&self, run_id: &RunId) -> Result<RunActionResponse, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(config: &TelemetryConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Self::with_client(http, &config.api_base)
    }

    pub fn with_client(http: Client, base: &str) -> Result<Self, ApiError> {
        let base = Url::parse(base.trim())
            .map_err(|e| ApiError::InvalidRequest(format!("invalid API base {base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidRequest(format!(
                "invalid API base {base}: not a hierarchical URL"
            )));
        }
        Ok(Self { http, base })
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidRequest(format!("invalid API base {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Client without a total request timeout, for long-lived streams.
    pub fn streaming_client(connect_timeout: Duration) -> Result<Client, ApiError> {
        Ok(Client::builder().connect_timeout(connect_timeout).build()?)
    }

    pub fn events_url(&self, run_id: &RunId) -> Result<Url, ApiError> {
        self.endpoint(&["runs", run_id.as_str(), "events"])
    }

    pub async fn create_run(&self, request: &CreateRunRequest) -> Result<CreateRunResponse, ApiError> {
        validate_create_request(request)?;
        let url = self.endpoint(&["runs"])?;
        let response = self.http.post(url).json(request).send().await?;
        let created: CreateRunResponse = read_json(response).await?;
        tracing::info!(run_id = %created.id, seed_url = %request.seed_url, "Run created");
        Ok(created)
    }

    pub async fn start_run(&self, run_id: &RunId) -> Result<RunActionResponse, ApiError> {
        let url = self.endpoint(&["runs", run_id.as_str(), "start"])?;
        let response = self.http.post(url).send().await?;
        let action: RunActionResponse = read_json(response).await?;
        tracing::info!(run_id = %run_id, status = %action.status, "Run started");
        Ok(action)
    }

    pub async fn stop_run(&self, run_id: &RunId) -> Result<RunActionResponse, ApiError> {
        let url = self.endpoint(&["runs", run_id.as_str(), "stop"])?;
        let response = self.http.post(url).send().await?;
        let action: RunActionResponse = read_json(response).await?;
        tracing::info!(run_id = %run_id, status = %action.status, "Run stopped");
        Ok(action)
    }

    pub async fn get_run(&self, run_id: &RunId) -> Result<RunRecord, ApiError> {
        let url = self.endpoint(&["runs", run_id.as_str()])?;
        let response = self.http.get(url).send().await?;
        read_json(response).await
    }

    pub async fn list_pages(&self, run_id: &RunId, limit: usize) -> Result<Vec<PageRow>, ApiError> {
        let mut url = self.endpoint(&["runs", run_id.as_str(), "pages"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.clamp(1, MAX_PAGES_LIMIT).to_string());
        let response = self.http.get(url).send().await?;
        let list: PageList = read_json(response).await?;
        Ok(list.items)
    }
}

#[async_trait]
impl RunBackend for ApiClient {
    async fn get_run(&self, run_id: &RunId) -> Result<RunRecord, ApiError> {
        ApiClient::get_run(self, run_id).await
    }

    async fn list_pages(&self, run_id: &RunId, limit: usize) -> Result<Vec<PageRow>, ApiError> {
        ApiClient::list_pages(self, run_id, limit).await
    }

    async fn stop_run(&self, run_id: &RunId) -> Result<RunActionResponse, ApiError> {
        ApiClient::stop_run(self, run_id).await
    }
}

pub fn validate_create_request(request: &CreateRunRequest) -> Result<(), ApiError> {
    let seed = request.seed_url.trim();
    if seed.is_empty() {
        return Err(ApiError::InvalidRequest("seed_url required".to_string()));
    }
    let parsed = Url::parse(seed)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid seed_url: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ApiError::InvalidRequest(format!(
            "invalid seed_url: {seed} is not an http(s) URL"
        )));
    }
    Ok(())
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(describe_http_error(status, &body));
    }
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

fn describe_http_error(status: u16, body: &str) -> ApiError {
    if body.trim().is_empty() {
        return ApiError::Http {
            status,
            message: format!("request failed with status {status}"),
        };
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(error) = json.get("error").and_then(|v| v.as_str()) {
            return ApiError::Http {
                status,
                message: error.to_string(),
            };
        }
        if let Some(message) = json.get("message").and_then(|v| v.as_str()) {
            return ApiError::Http {
                status,
                message: message.to_string(),
            };
        }
    }

    ApiError::Http {
        status,
        message: body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_http_error_prefers_error_field() {
        let err = describe_http_error(400, r#"{"error": "seed_url required"}"#);
        assert_eq!(
            err,
            ApiError::Http {
                status: 400,
                message: "seed_url required".to_string()
            }
        );
        assert_eq!(err.to_string(), "HTTP error: 400 (seed_url required)");
    }

    #[test]
    fn test_describe_http_error_falls_back_to_body_then_status() {
        let err = describe_http_error(502, "bad gateway\n");
        assert_eq!(
            err,
            ApiError::Http {
                status: 502,
                message: "bad gateway".to_string()
            }
        );

        let err = describe_http_error(500, "  ");
        assert!(matches!(err, ApiError::Http { status: 500, .. }));
    }

    #[test]
    fn test_validate_create_request() {
        assert!(validate_create_request(&CreateRunRequest::new("https://example.com")).is_ok());
        assert!(matches!(
            validate_create_request(&CreateRunRequest::new("   ")),
            Err(ApiError::InvalidRequest(_))
        ));
        assert!(validate_create_request(&CreateRunRequest::new("ftp://example.com")).is_err());
        assert!(validate_create_request(&CreateRunRequest::new("example.com")).is_err());
    }

    #[test]
    fn test_events_url() {
        let client = ApiClient::with_client(Client::new(), "http://localhost:8080/").unwrap();
        assert_eq!(
            client.events_url(&RunId::from("r-1")).unwrap().as_str(),
            "http://localhost:8080/runs/r-1/events"
        );
    }

    #[test]
    fn test_run_ids_are_escaped_as_one_segment() {
        let client = ApiClient::with_client(Client::new(), "http://localhost:8080").unwrap();
        assert_eq!(
            client.events_url(&RunId::from("a/b c?")).unwrap().as_str(),
            "http://localhost:8080/runs/a%2Fb%20c%3F/events"
        );
    }

    #[test]
    fn test_endpoints_keep_base_path() {
        let client = ApiClient::with_client(Client::new(), "http://crawler:9000/api/").unwrap();
        assert_eq!(
            client.endpoint(&["runs", "r-1", "pages"]).unwrap().as_str(),
            "http://crawler:9000/api/runs/r-1/pages"
        );
    }

    #[test]
    fn test_rejects_unusable_base() {
        assert!(matches!(
            ApiClient::with_client(Client::new(), "not a url"),
            Err(ApiError::InvalidRequest(_))
        ));
        assert!(ApiClient::with_client(Client::new(), "mailto:ops@example.com").is_err());
    }
}
