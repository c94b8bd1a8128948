use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::export::archive::MAX_COMPRESSION_LEVEL;
use crate::export::profile::{
    DEFAULT_ARCHIVE_NAME, DEFAULT_COMPRESSION_LEVEL, DEFAULT_ENTRY_PREFIX, ExportProfile,
};
use crate::export::rasterizer::RasterOptions;
use crate::export::renderer::DEFAULT_DATE_FORMAT;

pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Archive file name without the `.zip` extension.
    #[serde(default = "default_archive_name")]
    pub archive_name: String,

    #[serde(default = "default_entry_prefix")]
    pub entry_prefix: String,

    /// 0 = store, 1-9 = deflate level
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// chrono format string for training dates
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Custom SVG certificate template; the built-in one is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_path: Option<PathBuf>,

    /// Record store override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    /// Extra font directory for the rasterizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_dir: Option<PathBuf>,

    #[serde(default = "RasterOptions::bulk")]
    pub bulk: RasterOptions,

    #[serde(default = "RasterOptions::single")]
    pub single: RasterOptions,
}

fn default_version() -> u32 {
    CURRENT_VERSION
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

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            archive_name: default_archive_name(),
            entry_prefix: default_entry_prefix(),
            compression_level: default_compression_level(),
            date_format: default_date_format(),
            template_path: None,
            store_path: None,
            font_dir: None,
            bulk: RasterOptions::bulk(),
            single: RasterOptions::single(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, creating the file with defaults when it is missing.
    /// A file that cannot be read or parsed is logged and defaults are used.
    pub fn load_or_create(path: &Path) -> Self {
        if !path.exists() {
            info!("Settings file not found, creating with defaults at {path:?}");
            let settings = Settings::default();
            settings.save_to_file(path);
            return settings;
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
                Ok(mut settings) => {
                    debug!("Loaded settings from {path:?}");
                    if settings.version < CURRENT_VERSION {
                        migrate_settings(&mut settings);
                        settings.save_to_file(path);
                    }
                    settings
                }
                Err(e) => {
                    error!("Failed to parse settings file {path:?}: {e}");
                    Settings::default()
                }
            },
            Err(e) => {
                error!("Failed to read settings file {path:?}: {e}");
                Settings::default()
            }
        }
    }

    pub fn save_to_file(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    error!("Failed to create config directory {parent:?}: {e}");
                    return;
                }
            }
        }

        let body = match serde_yaml::to_string(self) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to serialize settings: {e}");
                return;
            }
        };
        match fs::write(path, format!("{SETTINGS_HEADER}{body}")) {
            Ok(()) => debug!("Saved settings to {path:?}"),
            Err(e) => error!("Failed to save settings to {path:?}: {e}"),
        }
    }

    pub fn export_profile(&self) -> ExportProfile {
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            warn!(
                "compression_level {} is out of range (0-{MAX_COMPRESSION_LEVEL}), archives will fail",
                self.compression_level
            );
        }
        ExportProfile {
            archive_name: self.archive_name.clone(),
            entry_prefix: self.entry_prefix.clone(),
            compression_level: self.compression_level,
            bulk: self.bulk.clone(),
            single: self.single.clone(),
        }
    }

    /// Template text to render with: the custom file if configured and readable.
    pub fn load_template(&self) -> Option<String> {
        let path = self.template_path.as_ref()?;
        match fs::read_to_string(path) {
            Ok(template) => Some(template),
            Err(e) => {
                error!("Failed to read certificate template {path:?}: {e}");
                None
            }
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

const SETTINGS_HEADER: &str = r#"# ============================================================================
# certbatch settings
# ============================================================================
# archive_name / entry_prefix: archive is <archive_name>.zip, entries are
#   <entry_prefix>_<student name>.<ext>
# compression_level: 0 stores entries, 1-9 deflates them
# date_format: chrono format used for training dates, e.g. "%d-%m-%Y"
# template_path: optional custom SVG template with {{name}}, {{pan}}, ... placeholders
# bulk / single: format (png|jpeg), quality (1-100), scale, background (#rrggbb)

"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::rasterizer::RasterFormat;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("certbatch").join("config.yaml");

        let settings = Settings::load_or_create(&path);
        assert_eq!(settings, Settings::default());
        assert!(path.exists());

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# ===="));
        assert!(content.contains("archive_name: Balaji_Training_Certificates"));
        assert_eq!(Settings::load_or_create(&path), settings);
    }

    #[test]
    fn test_partial_file_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "compression_level: 0\nbulk:\n  format: png\n  quality: 70\n  scale: 1.0\n  background: \"#ffffff\"\n",
        )
        .unwrap();

        let settings = Settings::load_or_create(&path);
        assert_eq!(settings.compression_level, 0);
        assert_eq!(settings.entry_prefix, "Certificate");
        assert_eq!(settings.bulk.format, RasterFormat::Png);
        assert_eq!(settings.bulk.scale, 1.0);
        assert_eq!(settings.single, RasterOptions::single());

        let profile = settings.export_profile();
        assert_eq!(profile.compression_level, 0);
        assert_eq!(profile.bulk.quality, 70);
    }

    #[test]
    fn test_unparseable_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "bulk: [not, a, profile]\n").unwrap();
        assert_eq!(Settings::load_or_create(&path), Settings::default());
    }

    #[test]
    fn test_custom_template_loading() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("cert.svg");
        fs::write(&template, "<svg>{{name}}</svg>").unwrap();

        let mut settings = Settings::default();
        assert_eq!(settings.load_template(), None);
        settings.template_path = Some(template);
        assert_eq!(settings.load_template().as_deref(), Some("<svg>{{name}}</svg>"));
        settings.template_path = Some(dir.path().join("missing.svg"));
        assert_eq!(settings.load_template(), None);
    }
}
