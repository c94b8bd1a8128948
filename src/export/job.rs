use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};

/// Cooperative stop request, observed by the export loop between records.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Running,
    /// Cancel requested; the loop stops at the next record boundary.
    Cancelling,
    /// Archive produced. May be partial if the job was cancelled.
    Done,
    /// Cancelled before any certificate made it into the archive.
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::Cancelled | JobStatus::Failed
        )
    }
}

/// One record that did not make it into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub record: String,
    pub message: String,
}

/// Read-only progress snapshot for UIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub current_label: Option<String>,
    /// `round(completed / total * 100)`
    pub percent: u8,
    pub can_cancel: bool,
    /// Set once the loop has stopped early on a cancel request.
    pub cancelled: bool,
}

/// Finished archive, ready to be written out or downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArchive {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub entries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEvent {
    Started { job_id: u64, total: usize },
    Progress(Progress),
    Finished { job_id: u64, status: JobStatus },
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    total: usize,
    completed: usize,
    succeeded: usize,
    current_label: Option<String>,
    errors: Vec<RecordFailure>,
    archive: Option<Arc<ExportArchive>>,
    fatal: Option<String>,
    stopped_early: bool,
}

impl JobState {
    fn progress(&self) -> Progress {
        let percent = if self.total == 0 {
            0
        } else {
            ((self.completed as f64 / self.total as f64) * 100.0).round() as u8
        };
        Progress {
            completed: self.completed,
            total: self.total,
            current_label: self.current_label.clone(),
            percent,
            can_cancel: self.status == JobStatus::Running,
            cancelled: self.stopped_early,
        }
    }
}

struct JobShared {
    id: u64,
    token: CancellationToken,
    state: Mutex<JobState>,
    events_tx: Sender<ExportEvent>,
    events_rx: Receiver<ExportEvent>,
    // Dropped when the job reaches a terminal state; waiters observe the disconnect.
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
}

/// Handle to one bulk export. Cheap to clone; all clones observe the same job.
#[derive(Clone)]
pub struct ExportJob {
    inner: Arc<JobShared>,
}

impl std::fmt::Debug for ExportJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportJob")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .finish()
    }
}

impl ExportJob {
    pub fn new(id: u64, total: usize) -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        let (done_tx, done_rx) = flume::bounded(1);
        Self {
            inner: Arc::new(JobShared {
                id,
                token: CancellationToken::new(),
                state: Mutex::new(JobState {
                    status: JobStatus::Idle,
                    total,
                    completed: 0,
                    succeeded: 0,
                    current_label: None,
                    errors: Vec::new(),
                    archive: None,
                    fatal: None,
                    stopped_early: false,
                }),
                events_tx,
                events_rx,
                done_tx: Mutex::new(Some(done_tx)),
                done_rx,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Request a stop at the next record boundary. Never fails; a no-op once the job
    /// has finished.
    pub fn cancel(&self) {
        let progress = {
            let mut state = self.lock();
            match state.status {
                JobStatus::Idle => {
                    self.inner.token.cancel();
                    None
                }
                JobStatus::Running => {
                    self.inner.token.cancel();
                    state.status = JobStatus::Cancelling;
                    Some(state.progress())
                }
                _ => None,
            }
        };
        if let Some(progress) = progress {
            debug!("Cancellation requested for export job {}", self.id());
            self.emit(ExportEvent::Progress(progress));
        }
    }

    pub fn progress(&self) -> Progress {
        self.lock().progress()
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// The archive, once the job is `Done`.
    pub fn result(&self) -> Option<Arc<ExportArchive>> {
        self.lock().archive.clone()
    }

    pub fn errors(&self) -> Vec<RecordFailure> {
        self.lock().errors.clone()
    }

    pub fn succeeded(&self) -> usize {
        self.lock().succeeded
    }

    /// True when the loop stopped before visiting every record.
    pub fn was_cancelled(&self) -> bool {
        self.lock().stopped_early
    }

    /// Job-level failure (archive packaging, worker crash), if any.
    pub fn fatal_error(&self) -> Option<String> {
        self.lock().fatal.clone()
    }

    /// Event stream for progress UIs. Each event is delivered to one receiver.
    pub fn events(&self) -> Receiver<ExportEvent> {
        self.inner.events_rx.clone()
    }

    /// Block until the job reaches a terminal state.
    pub fn wait(&self) -> JobStatus {
        let _ = self.inner.done_rx.recv();
        self.status()
    }

    /// Like [`ExportJob::wait`], giving up after `timeout`. Returns whether the job finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.inner.done_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            _ => true,
        }
    }

    /// User-facing one-line summary of where the job stands.
    pub fn summary(&self) -> String {
        let state = self.lock();
        match state.status {
            JobStatus::Idle => "Preparing certificates...".to_string(),
            JobStatus::Running | JobStatus::Cancelling => match &state.current_label {
                Some(label) => format!(
                    "Generating certificate for {label} ({}/{})",
                    (state.completed + 1).min(state.total),
                    state.total
                ),
                None => "Creating ZIP file...".to_string(),
            },
            JobStatus::Done if state.stopped_early => format!(
                "Export cancelled: generated {} of {} certificates",
                state.succeeded, state.total
            ),
            JobStatus::Done => format!(
                "Successfully generated {} of {} certificates",
                state.succeeded, state.total
            ),
            JobStatus::Cancelled => {
                "Export cancelled before any certificate was generated".to_string()
            }
            JobStatus::Failed => match &state.fatal {
                Some(reason) => format!("Failed to generate certificates: {reason}"),
                None => format!(
                    "Failed to generate certificates: none of the {} records succeeded",
                    state.total
                ),
            },
        }
    }

    pub(crate) fn begin(&self, first_label: Option<String>) {
        let total = {
            let mut state = self.lock();
            if state.status != JobStatus::Idle {
                return;
            }
            state.status = JobStatus::Running;
            state.current_label = first_label;
            state.total
        };
        self.emit(ExportEvent::Started {
            job_id: self.id(),
            total,
        });
    }

    pub(crate) fn record_success(&self) {
        self.lock().succeeded += 1;
    }

    pub(crate) fn record_failure(&self, record: String, message: String) {
        self.lock().errors.push(RecordFailure { record, message });
    }

    /// Count one more visited record and move the label on to the next one.
    pub(crate) fn advance(&self, next_label: Option<String>) {
        let progress = {
            let mut state = self.lock();
            state.completed = (state.completed + 1).min(state.total);
            state.current_label = next_label;
            state.progress()
        };
        self.emit(ExportEvent::Progress(progress));
    }

    pub(crate) fn mark_stopped_early(&self) {
        self.lock().stopped_early = true;
    }

    pub(crate) fn finish_done(&self, archive: ExportArchive) {
        self.finish(JobStatus::Done, Some(archive), None);
    }

    pub(crate) fn finish_cancelled(&self) {
        self.finish(JobStatus::Cancelled, None, None);
    }

    pub(crate) fn finish_failed(&self, fatal: Option<String>) {
        self.finish(JobStatus::Failed, None, fatal);
    }

    fn finish(&self, status: JobStatus, archive: Option<ExportArchive>, fatal: Option<String>) {
        {
            let mut state = self.lock();
            if state.status.is_terminal() {
                return;
            }
            state.status = status;
            state.current_label = None;
            state.archive = archive.map(Arc::new);
            state.fatal = fatal;
        }
        self.emit(ExportEvent::Finished {
            job_id: self.id(),
            status,
        });
        self.inner
            .done_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn emit(&self, event: ExportEvent) {
        // The job keeps its own receiver, so sending cannot fail.
        let _ = self.inner.events_tx.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds() {
        let job = ExportJob::new(1, 3);
        job.begin(Some("A".to_string()));
        job.advance(Some("B".to_string()));
        assert_eq!(job.progress().percent, 33);
        job.advance(Some("C".to_string()));
        assert_eq!(job.progress().percent, 67);
        job.advance(None);
        let progress = job.progress();
        assert_eq!(progress.percent, 100);
        assert_eq!(progress.completed, 3);
        assert_eq!(progress.current_label, None);
    }

    #[test]
    fn test_can_cancel_only_while_running() {
        let job = ExportJob::new(1, 2);
        assert!(!job.progress().can_cancel);
        job.begin(Some("A".to_string()));
        assert!(job.progress().can_cancel);
        job.cancel();
        assert_eq!(job.status(), JobStatus::Cancelling);
        assert!(!job.progress().can_cancel);
        assert!(job.token().is_cancelled());
    }

    #[test]
    fn test_cancel_after_finish_is_noop() {
        let job = ExportJob::new(1, 1);
        job.begin(Some("A".to_string()));
        job.record_success();
        job.advance(None);
        job.finish_done(ExportArchive {
            file_name: "out.zip".to_string(),
            bytes: vec![1, 2, 3],
            entries: vec!["a.png".to_string()],
        });

        let before = job.result();
        job.cancel();
        assert_eq!(job.status(), JobStatus::Done);
        assert!(!job.token().is_cancelled());
        assert_eq!(job.result(), before);
    }

    #[test]
    fn test_finish_is_sticky_and_wakes_waiters() {
        let job = ExportJob::new(7, 1);
        job.begin(None);
        assert!(!job.wait_timeout(Duration::from_millis(10)));

        let waiter = {
            let job = job.clone();
            std::thread::spawn(move || job.wait())
        };
        job.finish_failed(Some("disk full".to_string()));
        job.finish_cancelled();

        assert_eq!(waiter.join().unwrap(), JobStatus::Failed);
        assert_eq!(job.fatal_error().as_deref(), Some("disk full"));
        assert!(job.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_events_in_order() {
        let job = ExportJob::new(3, 1);
        let events = job.events();
        job.begin(Some("A".to_string()));
        job.advance(None);
        job.finish_failed(None);

        let received: Vec<ExportEvent> = events.drain().collect();
        assert_eq!(received.len(), 3);
        assert_eq!(received[0], ExportEvent::Started { job_id: 3, total: 1 });
        assert!(matches!(&received[1], ExportEvent::Progress(p) if p.completed == 1));
        assert_eq!(
            received[2],
            ExportEvent::Finished {
                job_id: 3,
                status: JobStatus::Failed
            }
        );
    }

    #[test]
    fn test_summary_messages() {
        let job = ExportJob::new(1, 5);
        assert_eq!(job.summary(), "Preparing certificates...");
        job.begin(Some("Asha".to_string()));
        assert_eq!(job.summary(), "Generating certificate for Asha (1/5)");
        for _ in 0..4 {
            job.record_success();
        }
        job.finish_done(ExportArchive {
            file_name: "x.zip".to_string(),
            bytes: Vec::new(),
            entries: Vec::new(),
        });
        assert_eq!(job.summary(), "Successfully generated 4 of 5 certificates");
    }
}
