use log::{error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use super::error::ExportError;
use super::job::{ExportArchive, ExportJob, Progress};
use super::pipeline::{panic_message, run_export};
use super::profile::ExportProfile;
use super::rasterizer::Rasterizer;
use super::renderer::TemplateRenderer;
use super::single::{RenderedCertificate, export_single};
use super::surface::{RenderSurface, SurfaceLedger};
use crate::record::StudentRecord;

pub const WORKER_THREAD_NAME: &str = "certificate-export";

/// Entry point for certificate exports.
///
/// At most one bulk job runs at a time; a second [`ExportController::start_export`]
/// while one is active is rejected. Each job gets its own render surface and a dedicated
/// worker thread, so callers stay responsive while the job runs.
pub struct ExportController {
    renderer: Arc<dyn TemplateRenderer>,
    rasterizer: Arc<dyn Rasterizer>,
    profile: ExportProfile,
    ledger: SurfaceLedger,
    active: Mutex<Option<ExportJob>>,
    next_job_id: AtomicU64,
}

impl ExportController {
    pub fn new(
        renderer: Arc<dyn TemplateRenderer>,
        rasterizer: Arc<dyn Rasterizer>,
        profile: ExportProfile,
    ) -> Self {
        Self {
            renderer,
            rasterizer,
            profile,
            ledger: SurfaceLedger::new(),
            active: Mutex::new(None),
            next_job_id: AtomicU64::new(1),
        }
    }

    pub fn profile(&self) -> &ExportProfile {
        &self.profile
    }

    pub fn surface_ledger(&self) -> &SurfaceLedger {
        &self.ledger
    }

    /// Most recently started job, finished or not.
    pub fn active_job(&self) -> Option<ExportJob> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate the input, open a render surface and start the job on a worker thread.
    ///
    /// Returns as soon as the job is running.
    pub fn start_export(&self, records: Vec<StudentRecord>) -> Result<ExportJob, ExportError> {
        if records.is_empty() {
            warn!("Export requested with no records");
            return Err(ExportError::EmptyInput);
        }

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(job) = active.as_ref().filter(|job| !job.is_finished()) {
            warn!("Rejecting export: job {} is still running", job.id());
            return Err(ExportError::AlreadyRunning { job_id: job.id() });
        }

        let job = ExportJob::new(self.next_job_id.fetch_add(1, Ordering::SeqCst), records.len());
        job.begin(records.first().map(|r| r.display_name().to_string()));
        let surface = RenderSurface::open(&self.ledger);

        let worker_job = job.clone();
        let renderer = Arc::clone(&self.renderer);
        let rasterizer = Arc::clone(&self.rasterizer);
        let profile = self.profile.clone();

        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_export(
                        &worker_job,
                        &records,
                        renderer.as_ref(),
                        rasterizer.as_ref(),
                        surface,
                        &profile,
                    )
                }));
                if let Err(payload) = outcome {
                    let message = panic_message(payload.as_ref());
                    error!("Export job {} crashed: {message}", worker_job.id());
                    worker_job.finish_failed(Some(format!("export worker crashed: {message}")));
                }
            })
            .map_err(|e| {
                error!("Failed to spawn export worker: {e}");
                ExportError::WorkerSpawn(e)
            })?;

        info!("Started export job {}", job.id());
        *active = Some(job.clone());
        Ok(job)
    }

    pub fn cancel(&self, job: &ExportJob) {
        job.cancel();
    }

    pub fn get_progress(&self, job: &ExportJob) -> Progress {
        job.progress()
    }

    pub fn get_result(&self, job: &ExportJob) -> Option<Arc<ExportArchive>> {
        job.result()
    }

    /// Render one certificate at full fidelity, on the calling thread.
    pub fn export_single(&self, record: &StudentRecord) -> Result<RenderedCertificate, ExportError> {
        export_single(
            record,
            self.renderer.as_ref(),
            self.rasterizer.as_ref(),
            &self.profile,
            &self.ledger,
        )
    }
}
