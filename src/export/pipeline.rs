use log::{debug, error, info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Instant;

use super::archive::ArchiveBuilder;
use super::error::ExportError;
use super::filename::EntryNamer;
use super::job::{ExportArchive, ExportJob};
use super::profile::ExportProfile;
use super::rasterizer::{RasterOptions, Rasterizer};
use super::renderer::TemplateRenderer;
use super::surface::RenderSurface;
use crate::record::StudentRecord;

/// Render, rasterize and pack every record, one at a time, on the calling thread.
///
/// Per-record failures are recorded on the job and the loop moves on. The cancel flag
/// is checked before each record. The surface is torn down on every path out of here,
/// including unwinding.
pub fn run_export(
    job: &ExportJob,
    records: &[StudentRecord],
    renderer: &dyn TemplateRenderer,
    rasterizer: &dyn Rasterizer,
    mut surface: RenderSurface,
    profile: &ExportProfile,
) {
    let started = Instant::now();
    job.begin(records.first().map(|r| r.display_name().to_string()));
    info!(
        "Export job {} started: {} records on surface {}",
        job.id(),
        records.len(),
        surface.id()
    );

    let mut archive = ArchiveBuilder::new();
    let mut namer = EntryNamer::new(&profile.entry_prefix, profile.bulk.format.extension());

    for (index, record) in records.iter().enumerate() {
        if job.token().is_cancelled() {
            info!(
                "Export job {} cancelled after {index} of {} records",
                job.id(),
                records.len()
            );
            job.mark_stopped_early();
            break;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            process_record(record, renderer, rasterizer, &mut surface, &profile.bulk)
        }));

        match outcome {
            Ok(Ok(bytes)) => {
                let name = namer.name_for(record);
                debug_assert!(
                    !archive.contains(&name),
                    "entry namer produced duplicate {name}"
                );
                match archive.add_entry(&name, bytes) {
                    Ok(()) => {
                        debug!("Added {name} for {}", record.identifier());
                        job.record_success();
                    }
                    Err(e) => {
                        error!("Archive rejected entry for {}: {e}", record.identifier());
                        job.record_failure(
                            record.identifier(),
                            ExportError::DuplicateEntry { name }.to_string(),
                        );
                    }
                }
            }
            Ok(Err(e)) => {
                warn!("{e}");
                job.record_failure(record.identifier(), e.to_string());
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    "Certificate for {} panicked: {message}",
                    record.identifier()
                );
                job.record_failure(
                    record.identifier(),
                    format!("unexpected failure: {message}"),
                );
            }
        }

        surface.clear();
        job.advance(records.get(index + 1).map(|r| r.display_name().to_string()));
        // Give progress readers and cancel requests a chance between records.
        thread::yield_now();
    }

    surface.teardown();
    finalize(job, archive, profile);

    info!(
        "Export job {} finished in {:.2?}: {}",
        job.id(),
        started.elapsed(),
        job.summary()
    );
}

fn process_record(
    record: &StudentRecord,
    renderer: &dyn TemplateRenderer,
    rasterizer: &dyn Rasterizer,
    surface: &mut RenderSurface,
    options: &RasterOptions,
) -> Result<Vec<u8>, ExportError> {
    renderer
        .render(surface, record)
        .map_err(|source| ExportError::Render {
            record: record.identifier(),
            source,
        })?;
    rasterizer
        .rasterize(surface, options)
        .map_err(|source| ExportError::Rasterize {
            record: record.identifier(),
            source,
        })
}

fn finalize(job: &ExportJob, archive: ArchiveBuilder, profile: &ExportProfile) {
    if archive.is_empty() {
        if job.was_cancelled() {
            job.finish_cancelled();
        } else {
            warn!("Export job {}: no certificate could be generated", job.id());
            job.finish_failed(None);
        }
        return;
    }

    let entries = archive.entry_names();
    match archive.finalize(profile.compression_level) {
        Ok(bytes) => job.finish_done(ExportArchive {
            file_name: profile.archive_file_name(),
            bytes,
            entries,
        }),
        Err(e) => {
            let e = ExportError::ArchiveFinalize(e);
            error!("Export job {}: {e}", job.id());
            job.finish_failed(Some(e.to_string()));
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
