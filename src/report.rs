//! Report fetcher
//!
//! Retrieves the report of a completed job at most once per job id. The cache
//! holds a single entry; asking for a different job discards it.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::AnalysisBackend;
use crate::error::{AnalysisError, Result};
use crate::types::{Job, JobId, JobState, RelationshipGraph, Report};

struct CachedReport {
    job_id: JobId,
    report: Arc<Report>,
}

/// Fetches and caches the report of a completed job
pub struct ReportFetcher {
    backend: Arc<dyn AnalysisBackend>,
    cache: Mutex<Option<CachedReport>>,
}

impl ReportFetcher {
    /// Fetcher with an empty cache
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self {
            backend,
            cache: Mutex::new(None),
        }
    }

    /// Fetch the report of a completed job.
    ///
    /// Returns the cached copy when this job's report was already fetched.
    /// Concurrent callers wait on the cache lock, so a single request is made.
    /// Failures are not cached.
    pub async fn fetch(&self, job: &Job) -> Result<Arc<Report>> {
        ensure_completed(job)?;

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.job_id == job.id {
                debug!("Serving cached report for analysis {}", job.id);
                return Ok(cached.report.clone());
            }
            debug!("Discarding cached report of analysis {}", cached.job_id);
            *cache = None;
        }

        let report = self.backend.analysis_report(&job.id).await?;
        check_report_id(&job.id, &report)?;

        let flags = report.integrity_flags();
        for flag in &flags {
            warn!("Report {} integrity: {}", job.id, flag);
        }
        info!(
            "Fetched report for analysis {}: {} wallets, {} insights, {} integrity flags",
            job.id,
            report.wallets_analyzed.len(),
            report.ai_insights.len(),
            flags.len()
        );

        let report = Arc::new(report);
        *cache = Some(CachedReport {
            job_id: job.id.clone(),
            report: report.clone(),
        });
        Ok(report)
    }

    /// Fetch only the relationship graph of a completed job.
    ///
    /// Uses the cached report when there is one for this job.
    pub async fn fetch_graph(&self, job: &Job) -> Result<RelationshipGraph> {
        ensure_completed(job)?;

        if let Some(cached) = self.cache.lock().await.as_ref() {
            if cached.job_id == job.id {
                return Ok(cached.report.graph_data.clone());
            }
        }
        self.backend.analysis_graph(&job.id).await
    }

    /// Report already fetched for `job_id`, without touching the network
    pub async fn cached(&self, job_id: &JobId) -> Option<Arc<Report>> {
        self.cache
            .lock()
            .await
            .as_ref()
            .filter(|c| &c.job_id == job_id)
            .map(|c| c.report.clone())
    }

    /// Drop any cached report
    pub async fn clear(&self) {
        *self.cache.lock().await = None;
    }
}

fn ensure_completed(job: &Job) -> Result<()> {
    if job.state == JobState::Completed {
        return Ok(());
    }
    Err(AnalysisError::ReportUnavailable(format!(
        "analysis {} is {:?}, not completed",
        job.id, job.state
    )))
}

fn check_report_id(job_id: &JobId, report: &Report) -> Result<()> {
    match report.analysis_id.as_deref() {
        Some(id) if id != job_id.as_str() => Err(AnalysisError::MalformedResponse(format!(
            "requested report for {} but received {}",
            job_id, id
        ))),
        _ => Ok(()),
    }
}
