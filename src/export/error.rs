use std::io;

/// Failure while laying out one certificate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderFault {
    #[error("record is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("template: {0}")]
    Template(String),

    #[error("{detail}")]
    Generic { detail: String },
}

impl RenderFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Failure while turning a laid-out certificate into image bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RasterFault {
    #[error("nothing has been rendered on the surface")]
    NotRendered,

    #[error("document has zero layout size ({width}x{height})")]
    ZeroSize { width: u32, height: u32 },

    #[error("SVG parse: {0}")]
    Parse(String),

    #[error("image encode: {0}")]
    Encode(String),

    #[error("{detail}")]
    Generic { detail: String },
}

impl RasterFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("entry '{0}' already exists in the archive")]
    DuplicateEntry(String),

    #[error("unsupported compression level {0} (expected 0-9)")]
    UnsupportedLevel(u32),

    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by the export controller itself.
///
/// `EmptyInput`, `AlreadyRunning` and `WorkerSpawn` reject the whole operation before any
/// work starts. `Render` and `Rasterize` are per-record and end up in the job's error list.
/// `ArchiveFinalize` is fatal to the job.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No students found. Please fetch students first.")]
    EmptyInput,

    #[error("an export is already running (job {job_id})")]
    AlreadyRunning { job_id: u64 },

    #[error("failed to render certificate for {record}: {source}")]
    Render {
        record: String,
        #[source]
        source: RenderFault,
    },

    #[error("failed to rasterize certificate for {record}: {source}")]
    Rasterize {
        record: String,
        #[source]
        source: RasterFault,
    },

    #[error("duplicate archive entry '{name}'")]
    DuplicateEntry { name: String },

    #[error("failed to build archive: {0}")]
    ArchiveFinalize(#[source] ArchiveError),

    #[error("failed to start export worker: {0}")]
    WorkerSpawn(#[source] io::Error),
}
