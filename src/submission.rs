//! Job submission gateway
//!
//! Uploads a wallet list and turns the backend receipt into a `Job`.
//! Submission is not idempotent (a repeat creates a second job), so nothing
//! here retries.

use std::sync::Arc;
use tracing::info;

use crate::backend::AnalysisBackend;
use crate::error::{AnalysisError, Result};
use crate::types::{Job, JobId};
use crate::wallets::WalletList;

/// File name of the CSV part in the upload form
pub const UPLOAD_FILE_NAME: &str = "wallets.csv";

/// Starts analysis jobs from wallet lists
pub struct SubmissionGateway {
    backend: Arc<dyn AnalysisBackend>,
}

impl SubmissionGateway {
    /// Gateway submitting through `backend`
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self { backend }
    }

    /// Submit a wallet list and start an analysis job
    pub async fn submit(&self, wallets: &WalletList) -> Result<Job> {
        let csv = wallets.to_csv()?;
        let receipt = self.backend.upload_wallets(UPLOAD_FILE_NAME, csv).await?;

        let analysis_id = receipt.analysis_id.trim();
        if analysis_id.is_empty() {
            return Err(AnalysisError::MalformedResponse(
                "upload response has an empty `analysis_id`".into(),
            ));
        }

        info!(
            "Submitted {} wallets, backend accepted {} as analysis {}",
            wallets.len(),
            receipt.wallets_count,
            analysis_id
        );
        Ok(Job::submitted(JobId::new(analysis_id), receipt.wallets_count))
    }
}
