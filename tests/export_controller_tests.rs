use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use certbatch::export::{
    ExportController, ExportError, ExportEvent, ExportProfile, JobStatus, Rasterizer,
    TemplateRenderer,
};
use certbatch::test_utils::{FakeRasterizer, FakeRenderer, Gate, record, sample_records};

const WAIT: Duration = Duration::from_secs(10);

fn controller(
    renderer: impl TemplateRenderer + 'static,
    rasterizer: impl Rasterizer + 'static,
) -> ExportController {
    ExportController::new(
        Arc::new(renderer),
        Arc::new(rasterizer),
        ExportProfile::default(),
    )
}

fn zip_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

#[test]
fn test_all_records_visited_and_archived() {
    let controller = controller(FakeRenderer::new(), FakeRasterizer::new());
    let job = controller.start_export(sample_records(6)).unwrap();

    assert_eq!(job.wait(), JobStatus::Done);
    let progress = controller.get_progress(&job);
    assert_eq!(progress.completed, 6);
    assert_eq!(progress.total, 6);
    assert_eq!(progress.percent, 100);
    assert!(!progress.can_cancel);
    assert!(!progress.cancelled);

    let archive = controller.get_result(&job).unwrap();
    assert_eq!(archive.file_name, "Balaji_Training_Certificates.zip");
    assert_eq!(zip_names(&archive.bytes).len(), 6);
    assert_eq!(job.summary(), "Successfully generated 6 of 6 certificates");
    assert_eq!(controller.surface_ledger().live(), 0);
}

#[test]
fn test_shared_names_get_unique_entries_in_input_order() {
    let controller = controller(FakeRenderer::new(), FakeRasterizer::new());
    let records = vec![
        record(1, "Asha", "AAAAA1111A"),
        record(2, "Vik", "BBBBB2222B"),
        record(3, "Asha", "CCCCC3333C"),
    ];

    let job = controller.start_export(records.clone()).unwrap();
    assert_eq!(job.wait(), JobStatus::Done);
    assert!(job.errors().is_empty());
    let names = zip_names(&job.result().unwrap().bytes);
    assert_eq!(
        names,
        vec![
            "Certificate_Asha.jpg",
            "Certificate_Vik.jpg",
            "Certificate_Asha_3.jpg",
        ]
    );

    // Same input order, same names.
    let again = controller.start_export(records).unwrap();
    again.wait();
    assert_eq!(zip_names(&again.result().unwrap().bytes), names);
}

#[test]
fn test_empty_input_creates_nothing() {
    let controller = controller(FakeRenderer::new(), FakeRasterizer::new());
    let err = controller.start_export(Vec::new()).unwrap_err();

    assert!(matches!(err, ExportError::EmptyInput));
    assert_eq!(
        err.to_string(),
        "No students found. Please fetch students first."
    );
    assert_eq!(controller.surface_ledger().opened(), 0);
    assert!(controller.active_job().is_none());
}

#[test]
fn test_one_failed_rasterization_out_of_five() {
    let records = sample_records(5);
    let failing = records[2].pan_number.clone();
    let controller = controller(
        FakeRenderer::new(),
        FakeRasterizer::new().failing_for(&[failing.as_str()]),
    );

    let job = controller.start_export(records).unwrap();
    assert_eq!(job.wait(), JobStatus::Done);
    assert_eq!(job.progress().completed, 5);
    assert_eq!(job.succeeded(), 4);
    assert_eq!(zip_names(&job.result().unwrap().bytes).len(), 4);

    let errors = job.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].record, failing);
    assert!(errors[0].message.contains("failed to rasterize"));
    assert_eq!(job.summary(), "Successfully generated 4 of 5 certificates");
}

#[test]
fn test_render_failures_are_recorded_per_record() {
    let mut records = sample_records(3);
    records[0].name = "   ".to_string();
    let controller = controller(
        FakeRenderer::new().failing_for(&[records[1].pan_number.as_str()]),
        FakeRasterizer::new(),
    );

    let job = controller.start_export(records).unwrap();
    assert_eq!(job.wait(), JobStatus::Done);
    let errors = job.errors();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].message.contains("missing required field 'name'"));
    assert!(errors[1].message.contains("simulated template failure"));
    assert_eq!(job.result().unwrap().entries.len(), 1);
}

#[test]
fn test_every_record_failing_fails_the_job() {
    let records = sample_records(3);
    let pans: Vec<&str> = records.iter().map(|r| r.pan_number.as_str()).collect();
    let controller = controller(FakeRenderer::new(), FakeRasterizer::new().failing_for(&pans));

    let job = controller.start_export(records.clone()).unwrap();
    assert_eq!(job.wait(), JobStatus::Failed);
    assert!(job.result().is_none());
    assert_eq!(job.errors().len(), 3);
    assert_eq!(job.progress().completed, 3);
    assert!(job.summary().starts_with("Failed to generate certificates"));
}

#[test]
fn test_finalize_failure_is_fatal() {
    let mut profile = ExportProfile::default();
    profile.compression_level = 12;
    let controller = ExportController::new(
        Arc::new(FakeRenderer::new()),
        Arc::new(FakeRasterizer::new()),
        profile,
    );

    let job = controller.start_export(sample_records(2)).unwrap();
    assert_eq!(job.wait(), JobStatus::Failed);
    assert!(job.result().is_none());
    assert!(job.errors().is_empty());
    let fatal = job.fatal_error().unwrap();
    assert!(fatal.contains("unsupported compression level 12"));
    assert_eq!(controller.surface_ledger().live(), 0);
}

#[test]
fn test_second_start_rejected_while_running() {
    let gate = Gate::new();
    let controller = controller(FakeRenderer::new().gated(gate.clone()), FakeRasterizer::new());

    let first = controller.start_export(sample_records(2)).unwrap();
    assert!(gate.wait_entered(WAIT));
    assert_eq!(first.status(), JobStatus::Running);

    let err = controller.start_export(sample_records(1)).unwrap_err();
    assert!(matches!(err, ExportError::AlreadyRunning { job_id } if job_id == first.id()));
    assert_eq!(controller.surface_ledger().opened(), 1);

    gate.open();
    assert_eq!(first.wait(), JobStatus::Done);

    // A finished job never blocks the next one.
    let second = controller.start_export(sample_records(1)).unwrap();
    assert_ne!(second.id(), first.id());
    assert_eq!(second.wait(), JobStatus::Done);
    assert_eq!(controller.surface_ledger().opened(), 2);
    assert_eq!(controller.surface_ledger().live(), 0);
}

#[test]
fn test_cancel_mid_record_finishes_that_record_then_stops() {
    let gate = Gate::new();
    let controller = controller(FakeRenderer::new().gated(gate.clone()), FakeRasterizer::new());

    let job = controller.start_export(sample_records(3)).unwrap();
    assert!(gate.wait_entered(WAIT));
    assert!(controller.get_progress(&job).can_cancel);

    controller.cancel(&job);
    assert_eq!(job.status(), JobStatus::Cancelling);
    assert!(!controller.get_progress(&job).can_cancel);

    gate.open();
    assert_eq!(job.wait(), JobStatus::Done);

    let progress = job.progress();
    assert_eq!(progress.completed, 1);
    assert!(progress.cancelled);
    assert!(job.was_cancelled());
    assert_eq!(job.result().unwrap().entries, vec!["Certificate_Student_1.jpg"]);
    assert_eq!(job.summary(), "Export cancelled: generated 1 of 3 certificates");
    assert_eq!(controller.surface_ledger().live(), 0);
}

#[test]
fn test_cancel_after_done_is_noop() {
    let controller = controller(FakeRenderer::new(), FakeRasterizer::new());
    let job = controller.start_export(sample_records(2)).unwrap();
    assert_eq!(job.wait(), JobStatus::Done);

    let before = controller.get_result(&job).unwrap();
    let progress_before = controller.get_progress(&job);
    controller.cancel(&job);
    controller.cancel(&job);

    assert_eq!(job.status(), JobStatus::Done);
    assert!(Arc::ptr_eq(&before, &controller.get_result(&job).unwrap()));
    assert_eq!(controller.get_progress(&job), progress_before);
    assert!(!job.was_cancelled());
}

#[test]
fn test_event_stream_is_ordered_and_monotonic() {
    let controller = controller(FakeRenderer::new(), FakeRasterizer::new());
    let job = controller.start_export(sample_records(4)).unwrap();
    let events = job.events();
    job.wait();

    let received: Vec<ExportEvent> = events.drain().collect();
    assert!(matches!(
        received.first(),
        Some(ExportEvent::Started { total: 4, .. })
    ));
    assert!(matches!(
        received.last(),
        Some(ExportEvent::Finished {
            status: JobStatus::Done,
            ..
        })
    ));

    let completed: Vec<usize> = received
        .iter()
        .filter_map(|e| match e {
            ExportEvent::Progress(p) => Some(p.completed),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![1, 2, 3, 4]);
}

#[test]
fn test_worker_thread_is_named() {
    struct ThreadCheck;
    impl TemplateRenderer for ThreadCheck {
        fn render(
            &self,
            surface: &mut certbatch::export::RenderSurface,
            record: &certbatch::StudentRecord,
        ) -> Result<(), certbatch::export::RenderFault> {
            assert_eq!(std::thread::current().name(), Some("certificate-export"));
            FakeRenderer::new().render(surface, record)
        }
    }

    let controller = controller(ThreadCheck, FakeRasterizer::new());
    let job = controller.start_export(sample_records(1)).unwrap();
    assert_eq!(job.wait(), JobStatus::Done);
    assert!(job.errors().is_empty());
}
