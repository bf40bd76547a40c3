//! Core trait for analysis backends.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ArtifactFormat, JobId, RelationshipGraph, Report, StatusResponse, UploadReceipt};

/// Request/response boundary of the analysis service.
///
/// Implementations unwrap the response envelope and map failures onto
/// `AnalysisError`; callers see typed payloads only.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Upload a CSV wallet list and start an analysis job.
    async fn upload_wallets(&self, file_name: &str, csv: Vec<u8>) -> Result<UploadReceipt>;

    /// Read the current status of a job.
    async fn analysis_status(&self, job_id: &JobId) -> Result<StatusResponse>;

    /// Read the full report of a completed job.
    async fn analysis_report(&self, job_id: &JobId) -> Result<Report>;

    /// Read only the relationship graph of a completed job.
    async fn analysis_graph(&self, job_id: &JobId) -> Result<RelationshipGraph>;

    /// Download the rendered report as raw bytes.
    async fn download_artifact(&self, job_id: &JobId, format: ArtifactFormat) -> Result<Vec<u8>>;
}
