//! HTTP client for the wallet analysis API

use async_trait::async_trait;
use reqwest::{header, multipart, Client};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::traits::AnalysisBackend;
use crate::config::ClientConfig;
use crate::error::{AnalysisError, Result};
use crate::types::*;

/// HTTP client for the wallet analysis API
///
/// # Example
///
/// ```rust,no_run
/// use wallet_analysis_client::{AnalysisBackend, AnalysisClient, ClientConfig, JobId};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = AnalysisClient::new(ClientConfig {
///     base_url: "http://localhost:8000".into(),
///     ..Default::default()
/// })?;
///
/// let status = client.analysis_status(&JobId::new("20240301_101500")).await?;
/// println!("{:?} {}%", status.status, status.progress);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    config: ClientConfig,
    client: Client,
}

impl AnalysisClient {
    /// Create a new analysis client
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref api_key) = config.api_key {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| AnalysisError::Config("API key contains invalid characters".into()))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| AnalysisError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn analysis_url(&self, job_id: &JobId, suffix: &str) -> String {
        format!(
            "{}/analysis/{}/{}",
            self.config.api_root(),
            urlencoding::encode(job_id.as_str()),
            suffix
        )
    }

    // ==================== Helper Methods ====================

    /// Reject non-2xx responses, carrying the backend message when present
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        Err(match ErrorBody::message_from(&body) {
            Some(message) => AnalysisError::ServerRejected(message),
            None => AnalysisError::Transport(format!("HTTP {}", status)),
        })
    }

    async fn handle_envelope<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = self.check_status(response).await?;
        let body = response.bytes().await?;
        let envelope: ApiEnvelope<T> = serde_json::from_slice(&body)?;
        envelope.into_data()
    }
}

#[async_trait]
impl AnalysisBackend for AnalysisClient {
    async fn upload_wallets(&self, file_name: &str, csv: Vec<u8>) -> Result<UploadReceipt> {
        let url = format!("{}/upload-csv", self.config.api_root());
        debug!("Uploading {} bytes to {}", csv.len(), url);

        let part = multipart::Part::bytes(csv)
            .file_name(file_name.to_string())
            .mime_str("text/csv")?;
        let form = multipart::Form::new().part("file", part);

        let response = self.client.post(&url).multipart(form).send().await?;
        self.handle_envelope(response).await
    }

    async fn analysis_status(&self, job_id: &JobId) -> Result<StatusResponse> {
        let url = self.analysis_url(job_id, "status");
        let response = self.client.get(&url).send().await?;
        self.handle_envelope(response).await
    }

    async fn analysis_report(&self, job_id: &JobId) -> Result<Report> {
        let url = self.analysis_url(job_id, "report");
        let response = self.client.get(&url).send().await?;
        self.handle_envelope(response).await
    }

    async fn analysis_graph(&self, job_id: &JobId) -> Result<RelationshipGraph> {
        let url = self.analysis_url(job_id, "graph");
        let response = self.client.get(&url).send().await?;
        self.handle_envelope(response).await
    }

    async fn download_artifact(&self, job_id: &JobId, format: ArtifactFormat) -> Result<Vec<u8>> {
        let url = self.analysis_url(job_id, &format!("download/{}", format));
        let response = self.client.get(&url).send().await?;
        let response = self.check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
