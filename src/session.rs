//! Analysis session
//!
//! Client-side controller for one live job: submits (or attaches to) a job,
//! follows it with a status poller, then fetches and normalizes the report.
//! Switching to another job discards the cached report of the previous one.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::artifact::{Artifact, ArtifactDownloader};
use crate::backend::{AnalysisBackend, AnalysisClient};
use crate::config::ClientConfig;
use crate::error::{AnalysisError, Result};
use crate::graph::{normalize, NormalizedGraph};
use crate::poller::{PollEvent, PollHandle, PollObserver, PollOutcome, StatusPoller};
use crate::report::ReportFetcher;
use crate::submission::SubmissionGateway;
use crate::types::{IntegrityFlag, Job, JobId, JobState, Report};
use crate::wallets::WalletList;

/// A completed job's report, ready for display
#[derive(Debug, Clone)]
pub struct PresentedReport {
    pub job: Job,
    pub report: Arc<Report>,
    pub graph: NormalizedGraph,
    pub flags: Vec<IntegrityFlag>,
}

/// Controller for one live analysis job and its cached report
pub struct AnalysisSession {
    backend: Arc<dyn AnalysisBackend>,
    poll_interval: Duration,
    job: Option<Job>,
    fetcher: ReportFetcher,
    downloader: ArtifactDownloader,
}

impl AnalysisSession {
    /// Session over any backend, polling every `poll_interval`
    pub fn new(backend: Arc<dyn AnalysisBackend>, poll_interval: Duration) -> Self {
        Self {
            fetcher: ReportFetcher::new(backend.clone()),
            downloader: ArtifactDownloader::new(backend.clone()),
            backend,
            poll_interval,
            job: None,
        }
    }

    /// Session talking to the HTTP backend described by `config`
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let poll_interval = config.poll_interval();
        let client = AnalysisClient::new(config)?;
        Ok(Self::new(Arc::new(client), poll_interval))
    }

    /// Current job, if one was submitted or attached
    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    /// Submit a wallet list; the new job replaces the current one
    pub async fn submit(&mut self, wallets: &WalletList) -> Result<&Job> {
        let job = SubmissionGateway::new(self.backend.clone())
            .submit(wallets)
            .await?;
        Ok(self.switch_to(job).await)
    }

    /// Follow a job submitted elsewhere
    pub async fn attach(&mut self, job_id: JobId) -> &Job {
        if !self.job.as_ref().is_some_and(|job| job.id == job_id) {
            info!("Attaching to analysis {}", job_id);
            self.switch_to(Job::attached(job_id.clone())).await;
        }
        self.job.get_or_insert_with(|| Job::attached(job_id))
    }

    async fn switch_to(&mut self, job: Job) -> &Job {
        if self.job.as_ref().is_some_and(|previous| previous.id != job.id) {
            self.fetcher.clear().await;
        }
        self.job.insert(job)
    }

    fn current(&self) -> Result<&Job> {
        self.job
            .as_ref()
            .ok_or_else(|| AnalysisError::Config("no analysis job in this session".into()))
    }

    /// Start polling the current job with the given observers.
    ///
    /// The session's own `Job` is only updated by `run_to_completion`.
    /// Polling stops when the returned handle is dropped.
    pub fn start_polling(&self, observers: Vec<Box<dyn PollObserver>>) -> Result<PollHandle> {
        let job = self.current()?;
        let poller = observers.into_iter().fold(
            StatusPoller::new(self.backend.clone()).with_interval(self.poll_interval),
            StatusPoller::observe_boxed,
        );
        Ok(poller.start(job.id.clone()))
    }

    /// Follow the current job to completion and present its report.
    ///
    /// Dropping the returned future stops polling. A relationship graph with
    /// dangling edges or duplicate nodes cannot be normalized and fails the
    /// run with `DataIntegrity`; the report itself stays cached, so `report()`
    /// and `Report::integrity_flags` still expose it.
    pub async fn run_to_completion(&mut self) -> Result<PresentedReport> {
        self.run_to_completion_with(|_: &JobId, _: &PollEvent| ControlFlow::Continue(()))
            .await
    }

    /// Like `run_to_completion`, also passing every poll event to `observer`.
    ///
    /// Returns the job's failure, or `PollerAborted` if the observer stopped
    /// polling before the job finished.
    pub async fn run_to_completion_with(
        &mut self,
        observer: impl PollObserver,
    ) -> Result<PresentedReport> {
        let job = self.current()?;
        match job.state {
            JobState::Completed => return self.present().await,
            JobState::Failed => {
                return Err(AnalysisError::ServerRejected(
                    job.error.clone().unwrap_or_else(|| "analysis failed".into()),
                ))
            }
            JobState::Submitted | JobState::Processing => {}
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<PollEvent>();
        let forward = move |_: &JobId, event: &PollEvent| {
            // Fails only once the session stopped listening
            let _ = tx.send(event.clone());
            ControlFlow::Continue(())
        };
        let observers: Vec<Box<dyn PollObserver>> = vec![Box::new(observer), Box::new(forward)];
        let handle = self.start_polling(observers)?;

        let wait = handle.wait();
        tokio::pin!(wait);
        let outcome = loop {
            tokio::select! {
                Some(event) = rx.recv() => self.apply_event(&event),
                outcome = &mut wait => break outcome,
            }
        };
        while let Ok(event) = rx.try_recv() {
            self.apply_event(&event);
        }

        match outcome {
            PollOutcome::Completed(_) => self.present().await,
            PollOutcome::Failed(error) => Err(error),
            PollOutcome::Cancelled => Err(AnalysisError::PollerAborted(format!(
                "polling of analysis {} stopped before completion",
                self.current()?.id
            ))),
        }
    }

    fn apply_event(&mut self, event: &PollEvent) {
        if let (Some(job), Some(snapshot)) = (self.job.as_mut(), event.snapshot()) {
            job.apply(snapshot);
        }
    }

    async fn present(&self) -> Result<PresentedReport> {
        let job = self.current()?;
        let report = self.fetcher.fetch(job).await?;
        let flags = report.integrity_flags();
        if !flags.is_empty() {
            warn!("Report of analysis {} has {} integrity flags", job.id, flags.len());
        }
        let graph = normalize(&report.graph_data)?;
        Ok(PresentedReport {
            job: job.clone(),
            report,
            graph,
            flags,
        })
    }

    /// Report of the current job, if it has completed
    pub async fn report(&self) -> Result<Arc<Report>> {
        self.fetcher.fetch(self.current()?).await
    }

    /// Download an artifact of the current job and run `action` on it
    pub async fn download_with<T, E, F>(
        &self,
        format: &str,
        action: F,
    ) -> std::result::Result<T, E>
    where
        E: From<AnalysisError>,
        F: FnOnce(&Artifact) -> std::result::Result<T, E>,
    {
        let job = self.current()?;
        self.downloader.download_with(&job.id, format, action).await
    }

    /// Save an artifact of the current job into `dir`
    pub async fn save_artifact(&self, format: &str, dir: &Path) -> Result<PathBuf> {
        self.downloader.save_to(&self.current()?.id, format, dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::types::{
        GraphEdge, GraphNode, Insight, Properties, RelationshipGraph, StatusResponse, UploadReceipt,
    };
    use chrono::Utc;
    use std::sync::Mutex;

    const A: &str = "0xabc0000000000000000000000000000000000001";
    const B: &str = "0xdef0000000000000000000000000000000000002";

    fn node(id: &str) -> GraphNode {
        GraphNode {
            id: id.into(),
            label: id.into(),
            size: 10.0,
            color: "#4299e1".into(),
            properties: Properties::new(),
        }
    }

    fn report(id: &str) -> Report {
        Report {
            analysis_id: Some(id.into()),
            timestamp: Utc::now(),
            summary: "Análisis completado para 2 wallets.".into(),
            graph_data: RelationshipGraph {
                nodes: vec![node(A), node(B)],
                edges: vec![GraphEdge {
                    source: A.into(),
                    target: B.into(),
                    weight: 2.0,
                    properties: Properties::new(),
                }],
            },
            ai_insights: vec![Insight {
                wallet_address: A.into(),
                behavior_pattern: "trader".into(),
                entity_type: "individual".into(),
                risk_score: 1.7,
                observations: vec!["High frequency swaps".into()],
                related_entities: vec![],
            }],
            wallets_analyzed: vec![],
            relationships: vec![],
        }
    }

    fn wallets() -> WalletList {
        WalletList::from_addresses([A, B]).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_and_run_to_completion() {
        let backend = Arc::new(
            MockBackend::new()
                .with_upload(Ok(UploadReceipt {
                    analysis_id: "job-1".into(),
                    wallets_count: 2,
                    status: Some("processing".into()),
                }))
                .with_status(Ok(StatusResponse::processing(10.0)))
                .with_status(Ok(StatusResponse::completed()))
                .with_report(Ok(report("job-1"))),
        );
        let mut session = AnalysisSession::new(backend.clone(), Duration::from_millis(5000));

        let job = session.submit(&wallets()).await.unwrap();
        assert_eq!(job.state, JobState::Submitted);

        let progress = Arc::new(Mutex::new(Vec::new()));
        let sink = progress.clone();
        let presented = session
            .run_to_completion_with(move |_: &JobId, event: &PollEvent| {
                if let Some(snapshot) = event.snapshot() {
                    sink.lock().unwrap().push(snapshot.progress);
                }
                ControlFlow::Continue(())
            })
            .await
            .unwrap();

        assert_eq!(*progress.lock().unwrap(), vec![10.0, 100.0]);
        assert_eq!(presented.job.state, JobState::Completed);
        assert_eq!(presented.graph.nodes.len(), 2);
        assert_eq!(presented.graph.edges.len(), 1);
        assert_eq!(presented.flags.len(), 1);
        assert_eq!(presented.report.ai_insights[0].risk_score, 1.7);
        assert_eq!(session.job().unwrap().progress, Some(100.0));

        // Already completed: no further polling, report served from cache
        session.run_to_completion().await.unwrap();
        assert_eq!(backend.status_calls(), 2);
        assert_eq!(backend.report_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_surfaces_backend_message() {
        let backend = Arc::new(
            MockBackend::new()
                .with_status(Ok(StatusResponse::processing(20.0)))
                .with_status(Ok(StatusResponse::failed("Error en el análisis"))),
        );
        let mut session = AnalysisSession::new(backend.clone(), Duration::from_millis(100));
        session.attach(JobId::new("job-1")).await;

        let err = session.run_to_completion().await.unwrap_err();
        assert_eq!(err, AnalysisError::ServerRejected("Error en el análisis".into()));
        assert_eq!(session.job().unwrap().state, JobState::Failed);
        assert!(matches!(session.report().await, Err(AnalysisError::ReportUnavailable(_))));
        assert_eq!(backend.report_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_stop_aborts_run() {
        let backend = Arc::new(MockBackend::new().with_status(Ok(StatusResponse::processing(5.0))));
        let mut session = AnalysisSession::new(backend, Duration::from_millis(100));
        session.attach(JobId::new("job-1")).await;

        let err = session
            .run_to_completion_with(|_: &JobId, event: &PollEvent| match event {
                PollEvent::Snapshot(_) => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::PollerAborted(_)));
        assert_eq!(session.job().unwrap().state, JobState::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_jobs_discards_cached_report() {
        let backend = Arc::new(
            MockBackend::new()
                .with_status(Ok(StatusResponse::completed()))
                .with_report(Ok(report("job-1")))
                .with_report(Ok(report("job-2"))),
        );
        let mut session = AnalysisSession::new(backend.clone(), Duration::from_millis(100));

        session.attach(JobId::new("job-1")).await;
        session.run_to_completion().await.unwrap();
        session.report().await.unwrap();
        assert_eq!(backend.report_calls(), 1);

        session.attach(JobId::new("job-2")).await;
        assert_eq!(session.job().unwrap().state, JobState::Submitted);
        let presented = session.run_to_completion().await.unwrap();
        assert_eq!(presented.report.analysis_id.as_deref(), Some("job-2"));
        assert_eq!(backend.report_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_run_stops_polling() {
        let backend = Arc::new(MockBackend::new().with_status(Ok(StatusResponse::processing(30.0))));
        let mut session = AnalysisSession::new(backend.clone(), Duration::from_millis(5000));
        session.attach(JobId::new("job-1")).await;

        let run = tokio::time::timeout(Duration::from_secs(12), session.run_to_completion()).await;
        assert!(run.is_err());
        assert_eq!(backend.status_calls(), 3);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.status_calls(), 3);
        assert_eq!(session.job().unwrap().state, JobState::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dangling_edge_fails_presentation_but_keeps_report() {
        let mut broken = report("job-1");
        broken.graph_data.edges.push(GraphEdge {
            source: A.into(),
            target: "0x9990000000000000000000000000000000000009".into(),
            weight: 1.0,
            properties: Properties::new(),
        });
        let backend = Arc::new(
            MockBackend::new()
                .with_status(Ok(StatusResponse::completed()))
                .with_report(Ok(broken)),
        );
        let mut session = AnalysisSession::new(backend.clone(), Duration::from_millis(100));
        session.attach(JobId::new("job-1")).await;

        let err = session.run_to_completion().await.unwrap_err();
        assert!(matches!(err, AnalysisError::DataIntegrity(_)));
        assert_eq!(session.job().unwrap().state, JobState::Completed);

        let report = session.report().await.unwrap();
        assert!(report
            .integrity_flags()
            .iter()
            .any(|flag| matches!(flag, IntegrityFlag::DanglingEdge { .. })));
        assert_eq!(backend.report_calls(), 1);
    }

    #[tokio::test]
    async fn test_operations_need_a_job() {
        let session = AnalysisSession::new(Arc::new(MockBackend::new()), Duration::from_millis(100));
        assert!(matches!(session.report().await, Err(AnalysisError::Config(_))));
        assert!(session.start_polling(Vec::new()).is_err());
    }
}
