//! Status poller
//!
//! Drives one job through `Idle -> Polling -> {Completed, Failed, Cancelled}`.
//!
//! - The first status request goes out immediately; each following one is
//!   scheduled `interval` after the previous response has been handled, so at
//!   most one request per poller is ever in flight.
//! - Every response is delivered to all observers before the next poll is
//!   scheduled. Snapshots therefore reach observers in issuance order.
//! - A failed request ends the session. There is no retry.
//! - `PollHandle::cancel` and observer delivery serialize on the session
//!   lock: once `cancel` returns, no observer runs again for that session.
//! - Dropping the `PollHandle` cancels the session and aborts its task.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::AnalysisBackend;
use crate::config::DEFAULT_POLL_INTERVAL_MS;
use crate::error::{AnalysisError, Result};
use crate::types::{JobId, JobState, StatusResponse, StatusSnapshot};

/// Poller state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Completed,
    Failed,
    Cancelled,
}

impl PollState {
    /// Whether the session has ended and will deliver nothing further
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::Completed | PollState::Failed | PollState::Cancelled
        )
    }
}

/// Event delivered to observers
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// Polling began (`Idle -> Polling`)
    Started,
    /// Job is still processing
    Snapshot(StatusSnapshot),
    /// Job completed; delivered exactly once
    Completed(StatusSnapshot),
    /// Job failed, or a status request failed
    Failed {
        error: AnalysisError,
        snapshot: Option<StatusSnapshot>,
    },
}

impl PollEvent {
    /// Poller state after this event
    pub fn state(&self) -> PollState {
        match self {
            PollEvent::Started | PollEvent::Snapshot(_) => PollState::Polling,
            PollEvent::Completed(_) => PollState::Completed,
            PollEvent::Failed { .. } => PollState::Failed,
        }
    }

    pub fn snapshot(&self) -> Option<&StatusSnapshot> {
        match self {
            PollEvent::Started => None,
            PollEvent::Snapshot(s) | PollEvent::Completed(s) => Some(s),
            PollEvent::Failed { snapshot, .. } => snapshot.as_ref(),
        }
    }
}

/// Terminal result of a polling session
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(StatusSnapshot),
    Failed(AnalysisError),
    Cancelled,
}

impl PollOutcome {
    /// Terminal poller state this outcome corresponds to
    pub fn state(&self) -> PollState {
        match self {
            PollOutcome::Completed(_) => PollState::Completed,
            PollOutcome::Failed(_) => PollState::Failed,
            PollOutcome::Cancelled => PollState::Cancelled,
        }
    }
}

/// Receives poll events.
///
/// Observers run on the poller task while the session lock is held. They must
/// not call `cancel` on their own handle; returning `ControlFlow::Break(())`
/// cancels the session instead.
pub trait PollObserver: Send + 'static {
    fn on_event(&mut self, job_id: &JobId, event: &PollEvent) -> ControlFlow<()>;
}

impl<F> PollObserver for F
where
    F: FnMut(&JobId, &PollEvent) -> ControlFlow<()> + Send + 'static,
{
    fn on_event(&mut self, job_id: &JobId, event: &PollEvent) -> ControlFlow<()> {
        self(job_id, event)
    }
}

/// Builder for a polling session.
///
/// # Example
///
/// ```rust,no_run
/// use std::ops::ControlFlow;
/// use std::sync::Arc;
/// use wallet_analysis_client::{AnalysisClient, ClientConfig, JobId, PollEvent, StatusPoller};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Arc::new(AnalysisClient::new(ClientConfig::default())?);
/// let handle = StatusPoller::new(client)
///     .observe(|_: &JobId, event: &PollEvent| {
///         if let Some(snapshot) = event.snapshot() {
///             println!("{}%", snapshot.progress);
///         }
///         ControlFlow::Continue(())
///     })
///     .start(JobId::new("20240301_101500"));
///
/// let outcome = handle.wait().await;
/// # Ok(())
/// # }
/// ```
pub struct StatusPoller {
    backend: Arc<dyn AnalysisBackend>,
    interval: Duration,
    observers: Vec<Box<dyn PollObserver>>,
}

impl StatusPoller {
    /// Poller with the default interval and no observers
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self {
            backend,
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            observers: Vec::new(),
        }
    }

    /// Delay between the end of one poll's handling and the next request
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Register an observer
    pub fn observe(mut self, observer: impl PollObserver) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Register an already boxed observer
    pub fn observe_boxed(mut self, observer: Box<dyn PollObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Start polling `job_id` on a background task.
    ///
    /// Must be called within a tokio runtime. Pollers are independent: starting
    /// one for a new job does not stop any other. Polling lasts no longer than
    /// the returned handle.
    pub fn start(self, job_id: JobId) -> PollHandle {
        let shared = Arc::new(Shared {
            session: Mutex::new(Session {
                state: PollState::Polling,
                latest: None,
                observers: self.observers,
            }),
            wake: Notify::new(),
        });

        info!("Polling status of analysis {} every {:?}", job_id, self.interval);

        let task = tokio::spawn(run(
            job_id.clone(),
            self.backend,
            self.interval,
            shared.clone(),
        ));

        PollHandle {
            job_id,
            shared,
            task,
        }
    }
}

struct Session {
    state: PollState,
    latest: Option<StatusSnapshot>,
    observers: Vec<Box<dyn PollObserver>>,
}

impl Session {
    /// Deliver an event to every observer. Returns true if one asked to stop.
    fn deliver(&mut self, job_id: &JobId, event: &PollEvent) -> bool {
        let mut stop = false;
        for observer in self.observers.iter_mut() {
            if observer.on_event(job_id, event).is_break() {
                stop = true;
            }
        }
        stop
    }
}

struct Shared {
    session: Mutex<Session>,
    wake: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What the poll loop does after handling one step
enum Step {
    Continue,
    Finish(PollOutcome),
}

/// Handle to a running polling session
///
/// Dropping the handle cancels the session.
pub struct PollHandle {
    job_id: JobId,
    shared: Arc<Shared>,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    /// Job this session polls
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Current poller state
    pub fn state(&self) -> PollState {
        self.shared.lock().state
    }

    /// Most recent snapshot received
    pub fn latest(&self) -> Option<StatusSnapshot> {
        self.shared.lock().latest.clone()
    }

    /// Stop polling. Returns false if the session had already ended.
    ///
    /// Once this returns no observer runs again, even if a status request was
    /// in flight.
    pub fn cancel(&self) -> bool {
        if !self.mark_cancelled() {
            return false;
        }
        self.shared.wake.notify_one();
        info!("Cancelled status polling of analysis {}", self.job_id);
        true
    }

    fn mark_cancelled(&self) -> bool {
        let mut session = self.shared.lock();
        if session.state.is_terminal() {
            return false;
        }
        session.state = PollState::Cancelled;
        true
    }

    /// Wait for the session to reach a terminal state.
    ///
    /// Dropping the returned future drops the handle, which cancels polling.
    pub async fn wait(mut self) -> PollOutcome {
        match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let mut session = self.shared.lock();
                if session.state == PollState::Cancelled {
                    return PollOutcome::Cancelled;
                }
                session.state = PollState::Failed;
                PollOutcome::Failed(AnalysisError::PollerAborted(e.to_string()))
            }
        }
    }

    /// Whether the background task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if self.mark_cancelled() {
            debug!("Handle dropped, stopping status polling of analysis {}", self.job_id);
        }
        self.task.abort();
    }
}

async fn run(
    job_id: JobId,
    backend: Arc<dyn AnalysisBackend>,
    interval: Duration,
    shared: Arc<Shared>,
) -> PollOutcome {
    if let Step::Finish(outcome) = begin(&job_id, &shared) {
        return outcome;
    }

    let mut sequence = 0u64;
    loop {
        let response = tokio::select! {
            response = backend.analysis_status(&job_id) => response,
            _ = shared.wake.notified() => {
                debug!("Dropping in-flight status request for {}", job_id);
                return PollOutcome::Cancelled;
            }
        };

        sequence += 1;
        if let Step::Finish(outcome) = handle_response(&job_id, &shared, response, sequence) {
            return outcome;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shared.wake.notified() => return PollOutcome::Cancelled,
        }
    }
}

fn begin(job_id: &JobId, shared: &Shared) -> Step {
    let mut session = shared.lock();
    if session.state == PollState::Cancelled {
        return Step::Finish(PollOutcome::Cancelled);
    }
    if session.deliver(job_id, &PollEvent::Started) {
        session.state = PollState::Cancelled;
        return Step::Finish(PollOutcome::Cancelled);
    }
    Step::Continue
}

/// Apply one status response to the session and notify observers
fn handle_response(
    job_id: &JobId,
    shared: &Shared,
    response: Result<StatusResponse>,
    sequence: u64,
) -> Step {
    let mut session = shared.lock();
    if session.state == PollState::Cancelled {
        warn!("Discarding status response for cancelled analysis {}", job_id);
        return Step::Finish(PollOutcome::Cancelled);
    }

    let status = match response {
        Ok(status) => status,
        Err(error) => {
            warn!("Status request for analysis {} failed: {}", job_id, error);
            session.state = PollState::Failed;
            let event = PollEvent::Failed {
                error: error.clone(),
                snapshot: None,
            };
            session.deliver(job_id, &event);
            return Step::Finish(PollOutcome::Failed(error));
        }
    };

    let snapshot = StatusSnapshot::from_response(job_id, status, sequence);
    debug!(
        "Analysis {} status #{}: {:?} {}%",
        job_id, snapshot.sequence, snapshot.state, snapshot.progress
    );
    session.latest = Some(snapshot.clone());

    match snapshot.state {
        JobState::Completed => {
            info!("Analysis {} completed", job_id);
            session.state = PollState::Completed;
            session.deliver(job_id, &PollEvent::Completed(snapshot.clone()));
            Step::Finish(PollOutcome::Completed(snapshot))
        }
        JobState::Failed => {
            let error = AnalysisError::ServerRejected(snapshot.failure_message());
            warn!("Analysis {} failed: {}", job_id, error);
            session.state = PollState::Failed;
            let event = PollEvent::Failed {
                error: error.clone(),
                snapshot: Some(snapshot),
            };
            session.deliver(job_id, &event);
            Step::Finish(PollOutcome::Failed(error))
        }
        JobState::Submitted | JobState::Processing => {
            if session.deliver(job_id, &PollEvent::Snapshot(snapshot)) {
                debug!("Observer stopped polling of analysis {}", job_id);
                session.state = PollState::Cancelled;
                return Step::Finish(PollOutcome::Cancelled);
            }
            Step::Continue
        }
    }
}
