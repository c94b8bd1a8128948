use log::info;

use super::error::ExportError;
use super::filename::EntryNamer;
use super::profile::ExportProfile;
use super::rasterizer::Rasterizer;
use super::renderer::TemplateRenderer;
use super::surface::{RenderSurface, SurfaceLedger};
use crate::record::StudentRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCertificate {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Render one certificate with the single-certificate profile on its own surface.
pub fn export_single(
    record: &StudentRecord,
    renderer: &dyn TemplateRenderer,
    rasterizer: &dyn Rasterizer,
    profile: &ExportProfile,
    ledger: &SurfaceLedger,
) -> Result<RenderedCertificate, ExportError> {
    let mut surface = RenderSurface::open(ledger);

    renderer
        .render(&mut surface, record)
        .map_err(|source| ExportError::Render {
            record: record.identifier(),
            source,
        })?;
    let bytes = rasterizer
        .rasterize(&surface, &profile.single)
        .map_err(|source| ExportError::Rasterize {
            record: record.identifier(),
            source,
        })?;
    surface.teardown();

    let file_name =
        EntryNamer::single_name(&profile.entry_prefix, record, profile.single.format.extension());
    info!("Generated {file_name} ({} bytes)", bytes.len());
    Ok(RenderedCertificate { file_name, bytes })
}
