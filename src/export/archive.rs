use log::debug;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::error::ArchiveError;

pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Accumulates named image entries and packs them into one zip blob.
///
/// Entries are buffered and written in insertion order on [`ArchiveBuilder::finalize`],
/// with fixed timestamps, so the same entries and level always produce identical bytes.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    entries: Vec<(String, Vec<u8>)>,
    names: HashSet<String>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, filename: &str, bytes: Vec<u8>) -> Result<(), ArchiveError> {
        if !self.names.insert(filename.to_string()) {
            return Err(ArchiveError::DuplicateEntry(filename.to_string()));
        }
        self.entries.push((filename.to_string(), bytes));
        Ok(())
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.names.contains(filename)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Pack all entries. Level 0 stores entries uncompressed, 1-9 deflates them.
    pub fn finalize(self, compression_level: u32) -> Result<Vec<u8>, ArchiveError> {
        if compression_level > MAX_COMPRESSION_LEVEL {
            return Err(ArchiveError::UnsupportedLevel(compression_level));
        }

        let options = if compression_level == 0 {
            FileOptions::default().compression_method(CompressionMethod::Stored)
        } else {
            FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(compression_level as i32))
        }
        .last_modified_time(DateTime::default());

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in &self.entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }
        let blob = zip.finish()?.into_inner();

        debug!(
            "Packed {} entries into {} byte archive (level {compression_level})",
            self.entries.len(),
            blob.len()
        );
        Ok(blob)
    }
}
