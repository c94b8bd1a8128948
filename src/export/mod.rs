pub mod archive;
pub mod controller;
pub mod error;
pub mod filename;
pub mod job;
pub mod pipeline;
pub mod profile;
pub mod rasterizer;
pub mod renderer;
pub mod single;
pub mod surface;
pub mod template;

pub use archive::ArchiveBuilder;
pub use controller::ExportController;
pub use error::{ArchiveError, ExportError, RasterFault, RenderFault};
pub use filename::{EntryNamer, sanitize_filename};
pub use job::{
    CancellationToken, ExportArchive, ExportEvent, ExportJob, JobStatus, Progress, RecordFailure,
};
pub use pipeline::run_export;
pub use profile::ExportProfile;
pub use rasterizer::{RasterFormat, RasterOptions, Rasterizer, ResvgRasterizer, Rgb};
pub use renderer::{SvgCertificateRenderer, TemplateRenderer};
pub use single::{RenderedCertificate, export_single};
pub use surface::{CertificateDocument, RenderSurface, SurfaceLedger};
pub use template::TemplateEngine;
