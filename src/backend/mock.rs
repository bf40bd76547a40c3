//! Mock analysis backend for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::traits::AnalysisBackend;
use crate::error::{AnalysisError, Result};
use crate::types::*;

/// Queue of scripted results; the last one repeats once the rest are used up.
struct Script<T> {
    queue: Mutex<VecDeque<Result<T>>>,
    missing: &'static str,
}

impl<T: Clone> Script<T> {
    fn new(missing: &'static str) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            missing,
        }
    }

    fn push(&self, result: Result<T>) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }

    fn next(&self) -> Result<T> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        match queue.len() {
            0 => Err(AnalysisError::Transport(self.missing.to_string())),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap_or_else(|| {
                Err(AnalysisError::Transport(self.missing.to_string()))
            }),
        }
    }
}

/// Mock backend for testing.
///
/// Each endpoint replays a scripted sequence of results and counts its calls.
pub struct MockBackend {
    uploads: Script<UploadReceipt>,
    statuses: Script<StatusResponse>,
    reports: Script<Report>,
    graphs: Script<RelationshipGraph>,
    artifacts: Script<Vec<u8>>,
    status_latency: Duration,
    upload_calls: AtomicU32,
    status_calls: AtomicU32,
    report_calls: AtomicU32,
    graph_calls: AtomicU32,
    download_calls: AtomicU32,
    uploaded: Mutex<Vec<Vec<u8>>>,
}

impl MockBackend {
    /// Create a mock with nothing scripted; every call fails with a transport error.
    pub fn new() -> Self {
        Self {
            uploads: Script::new("no upload response scripted"),
            statuses: Script::new("no status response scripted"),
            reports: Script::new("no report scripted"),
            graphs: Script::new("no graph scripted"),
            artifacts: Script::new("no artifact scripted"),
            status_latency: Duration::ZERO,
            upload_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            report_calls: AtomicU32::new(0),
            graph_calls: AtomicU32::new(0),
            download_calls: AtomicU32::new(0),
            uploaded: Mutex::new(Vec::new()),
        }
    }

    pub fn with_upload(self, result: Result<UploadReceipt>) -> Self {
        self.uploads.push(result);
        self
    }

    /// Queue a status result. The last queued one repeats forever.
    pub fn with_status(self, result: Result<StatusResponse>) -> Self {
        self.statuses.push(result);
        self
    }

    pub fn with_report(self, result: Result<Report>) -> Self {
        self.reports.push(result);
        self
    }

    pub fn with_graph(self, result: Result<RelationshipGraph>) -> Self {
        self.graphs.push(result);
        self
    }

    pub fn with_artifact(self, result: Result<Vec<u8>>) -> Self {
        self.artifacts.push(result);
        self
    }

    /// Delay every status response, keeping the request in flight meanwhile.
    pub fn with_status_latency(mut self, latency: Duration) -> Self {
        self.status_latency = latency;
        self
    }

    pub fn upload_calls(&self) -> u32 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn report_calls(&self) -> u32 {
        self.report_calls.load(Ordering::SeqCst)
    }

    pub fn graph_calls(&self) -> u32 {
        self.graph_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> u32 {
        self.download_calls.load(Ordering::SeqCst)
    }

    /// Bodies received by `upload_wallets`, in call order
    pub fn uploaded_bodies(&self) -> Vec<Vec<u8>> {
        self.uploaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisBackend for MockBackend {
    async fn upload_wallets(&self, _file_name: &str, csv: Vec<u8>) -> Result<UploadReceipt> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.uploaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(csv);
        self.uploads.next()
    }

    async fn analysis_status(&self, _job_id: &JobId) -> Result<StatusResponse> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if !self.status_latency.is_zero() {
            tokio::time::sleep(self.status_latency).await;
        }
        self.statuses.next()
    }

    async fn analysis_report(&self, _job_id: &JobId) -> Result<Report> {
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        self.reports.next()
    }

    async fn analysis_graph(&self, _job_id: &JobId) -> Result<RelationshipGraph> {
        self.graph_calls.fetch_add(1, Ordering::SeqCst);
        self.graphs.next()
    }

    async fn download_artifact(&self, _job_id: &JobId, _format: ArtifactFormat) -> Result<Vec<u8>> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.artifacts.next()
    }
}
