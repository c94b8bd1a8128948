use serde::{Deserialize, Serialize};

use super::filename::sanitize_filename;
use super::rasterizer::RasterOptions;

pub const DEFAULT_ARCHIVE_NAME: &str = "Balaji_Training_Certificates";
pub const DEFAULT_ENTRY_PREFIX: &str = "Certificate";
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Naming, packaging and fidelity choices for exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportProfile {
    #[serde(default = "default_archive_name")]
    pub archive_name: String,

    #[serde(default = "default_entry_prefix")]
    pub entry_prefix: String,

    /// 0 stores entries, 1-9 deflates them.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    #[serde(default = "RasterOptions::bulk")]
    pub bulk: RasterOptions,

    #[serde(default = "RasterOptions::single")]
    pub single: RasterOptions,
}

fn default_archive_name() -> String {
    DEFAULT_ARCHIVE_NAME.to_string()
}

fn default_entry_prefix() -> String {
    DEFAULT_ENTRY_PREFIX.to_string()
}

fn default_compression_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

impl Default for ExportProfile {
    fn default() -> Self {
        Self {
            archive_name: default_archive_name(),
            entry_prefix: default_entry_prefix(),
            compression_level: default_compression_level(),
            bulk: RasterOptions::bulk(),
            single: RasterOptions::single(),
        }
    }
}

impl ExportProfile {
    pub fn archive_file_name(&self) -> String {
        format!("{}.zip", sanitize_filename(&self.archive_name))
    }
}
