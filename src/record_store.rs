use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::record::StudentRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("record store {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to serialize records: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to replace record store: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Where export input comes from.
pub trait RecordSource {
    fn fetch_all(&self) -> Result<Vec<StudentRecord>, StoreError>;

    /// Records from the most recent import only.
    fn fetch_last_uploaded(&self) -> Result<Vec<StudentRecord>, StoreError>;
}

/// Which subset of the store an export works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordSelection {
    #[default]
    All,
    LastUploaded,
}

impl RecordSelection {
    pub fn fetch(&self, source: &dyn RecordSource) -> Result<Vec<StudentRecord>, StoreError> {
        match self {
            RecordSelection::All => source.fetch_all(),
            RecordSelection::LastUploaded => source.fetch_last_uploaded(),
        }
    }
}

/// Outcome of a CSV import.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    /// `(line, reason)` for every row that was skipped.
    pub rejected: Vec<(u64, String)>,
}

/// Local record store persisted as pretty JSON.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStore {
    records: Vec<StudentRecord>,
    /// PANs from the latest import, in file order.
    #[serde(default)]
    last_uploaded: Vec<String>,
    #[serde(skip)]
    file_path: Option<PathBuf>,
}

impl RecordStore {
    pub fn ephemeral() -> Self {
        Self::default()
    }

    pub fn with_file(file_path: &Path) -> Self {
        Self {
            file_path: Some(file_path.to_path_buf()),
            ..Self::default()
        }
    }

    pub fn load_or_ephemeral(file_path: Option<&Path>) -> Self {
        match file_path {
            Some(path) => Self::load_from_file(path).unwrap_or_else(|e| {
                error!("Failed to load record store: {e}");
                Self::with_file(path)
            }),
            None => Self::ephemeral(),
        }
    }

    pub fn load_from_file(file_path: &Path) -> Result<Self, StoreError> {
        if !file_path.exists() {
            return Ok(Self::with_file(file_path));
        }
        let content = fs::read_to_string(file_path).map_err(|source| StoreError::Io {
            path: file_path.to_path_buf(),
            source,
        })?;
        let mut store: Self =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: file_path.to_path_buf(),
                source,
            })?;
        store.file_path = Some(file_path.to_path_buf());
        debug!(
            "Loaded {} records from {}",
            store.records.len(),
            file_path.display()
        );
        Ok(store)
    }

    /// Write the store atomically: a temp file in the same directory, then rename.
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(dir).map_err(io_err)?;
        let content = serde_json::to_string_pretty(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(content.as_bytes()).map_err(io_err)?;
        tmp.persist(path)?;
        Ok(())
    }

    pub fn records(&self) -> &[StudentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find_by_pan(&self, pan: &str) -> Option<&StudentRecord> {
        let pan = pan.trim().to_uppercase();
        self.records.iter().find(|r| r.pan_number == pan)
    }

    /// Case-insensitive substring match on name, serial number, PAN or LIC number.
    /// A blank term matches every record.
    pub fn search(&self, term: &str) -> Vec<&StudentRecord> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return self.records.iter().collect();
        }
        self.records
            .iter()
            .filter(|r| {
                r.name.to_lowercase().contains(&term)
                    || r.sr_no.to_string().contains(&term)
                    || r.pan_number.to_lowercase().contains(&term)
                    || r.lic_regd_number.to_lowercase().contains(&term)
            })
            .collect()
    }

    /// Delete a record by PAN, also dropping it from the last uploaded batch.
    pub fn remove_by_pan(&mut self, pan: &str) -> Option<StudentRecord> {
        let pan = pan.trim().to_uppercase();
        let index = self.records.iter().position(|r| r.pan_number == pan)?;
        self.last_uploaded.retain(|p| p != &pan);
        let removed = self.records.remove(index);
        info!("Removed record {}", removed.identifier());
        Some(removed)
    }

    /// Insert or replace by PAN. Returns true when the record is new.
    pub fn upsert(&mut self, record: StudentRecord) -> bool {
        match self
            .records
            .iter_mut()
            .find(|r| r.pan_number == record.pan_number)
        {
            Some(existing) => {
                *existing = record;
                false
            }
            None => {
                self.records.push(record);
                true
            }
        }
    }

    pub fn import_csv_file(&mut self, path: &Path) -> Result<ImportReport, StoreError> {
        let file = fs::File::open(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.import_csv(file)
    }

    /// Import rows with header `srNo,name,panNumber,licRegdNumber,branch,startDate,endDate`.
    ///
    /// Valid rows are upserted by PAN and become the "last uploaded" batch; invalid rows
    /// are reported by line and skipped. Only an unreadable file or header is an error.
    pub fn import_csv<R: Read>(&mut self, reader: R) -> Result<ImportReport, StoreError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let mut report = ImportReport::default();
        let mut batch: Vec<String> = Vec::new();

        for (index, row) in csv_reader.records().enumerate() {
            let fallback_line = index as u64 + 2;
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    report.rejected.push((fallback_line, e.to_string()));
                    continue;
                }
            };
            let line = row.position().map_or(fallback_line, |p| p.line());

            let mut record: StudentRecord = match row.deserialize(Some(&headers)) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping CSV line {line}: {e}");
                    report.rejected.push((line, e.to_string()));
                    continue;
                }
            };
            record.pan_number = record.pan_number.to_uppercase();
            if let Err(e) = record.validate() {
                warn!("Skipping CSV line {line}: {e}");
                report.rejected.push((line, e.to_string()));
                continue;
            }

            batch.retain(|pan| pan != &record.pan_number);
            batch.push(record.pan_number.clone());
            self.upsert(record);
            report.imported += 1;
        }

        if !batch.is_empty() {
            self.last_uploaded = batch;
        }
        info!(
            "Imported {} records ({} rejected)",
            report.imported,
            report.rejected.len()
        );
        Ok(report)
    }
}

impl RecordSource for RecordStore {
    fn fetch_all(&self) -> Result<Vec<StudentRecord>, StoreError> {
        Ok(self.records.clone())
    }

    fn fetch_last_uploaded(&self) -> Result<Vec<StudentRecord>, StoreError> {
        Ok(self
            .last_uploaded
            .iter()
            .filter_map(|pan| self.find_by_pan(pan).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
srNo,name,panNumber,licRegdNumber,branch,startDate,endDate
1,Asha Verma,ABCDE1234F,LIC-1,Pune,2024-03-04,2024-03-08
2,,BBBBB2222B,LIC-2,Pune,2024-03-04,2024-03-08
3,Vik Rao,bbbbb3333c,LIC-3,Nagpur,2024-03-04,2024-03-08
4,Ravi,NOTAPAN,LIC-4,Pune,2024-03-04,2024-03-08
5,Meera,CCCCC4444D,LIC-5,Pune,2024-03-09,2024-03-04
6,Kiran,DDDDD5555E,LIC-6,Pune,04/03/2024,2024-03-08
";

    #[test]
    fn test_import_reports_rejected_lines() {
        let mut store = RecordStore::ephemeral();
        let report = store.import_csv(CSV.as_bytes()).unwrap();

        assert_eq!(report.imported, 2);
        let lines: Vec<u64> = report.rejected.iter().map(|(line, _)| *line).collect();
        assert_eq!(lines, vec![3, 5, 6, 7]);
        assert!(report.rejected[0].1.contains("name is empty"));
        assert!(report.rejected[1].1.contains("invalid PAN"));

        // PANs are normalised to upper case.
        assert_eq!(store.find_by_pan("BBBBB3333C").unwrap().name, "Vik Rao");
        assert_eq!(store.find_by_pan(" abcde1234f ").unwrap().sr_no, 1);
        assert!(store.find_by_pan("ZZZZZ9999Z").is_none());
    }

    #[test]
    fn test_reimport_upserts_and_tracks_last_batch() {
        let mut store = RecordStore::ephemeral();
        store.import_csv(CSV.as_bytes()).unwrap();

        let second = "\
srNo,name,panNumber,licRegdNumber,branch,startDate,endDate
9,Asha V. Sharma,ABCDE1234F,LIC-9,Pune,2024-04-01,2024-04-05
10,Neha,EEEEE6666F,,,2024-04-01,2024-04-05
";
        let report = store.import_csv(second.as_bytes()).unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(store.len(), 3);
        assert_eq!(store.find_by_pan("ABCDE1234F").unwrap().sr_no, 9);

        let latest = RecordSelection::LastUploaded.fetch(&store).unwrap();
        let pans: Vec<&str> = latest.iter().map(|r| r.pan_number.as_str()).collect();
        assert_eq!(pans, vec!["ABCDE1234F", "EEEEE6666F"]);
        assert_eq!(RecordSelection::All.fetch(&store).unwrap().len(), 3);
    }

    #[test]
    fn test_all_rows_rejected_keeps_previous_batch() {
        let mut store = RecordStore::ephemeral();
        store.import_csv(CSV.as_bytes()).unwrap();
        let bad = "srNo,name,panNumber,licRegdNumber,branch,startDate,endDate\n0,X,ABCDE1234F,,,2024-01-01,2024-01-02\n";
        let report = store.import_csv(bad.as_bytes()).unwrap();
        assert_eq!(report.imported, 0);
        assert_eq!(store.fetch_last_uploaded().unwrap().len(), 2);
    }

    #[test]
    fn test_search_matches_name_serial_pan_and_lic() {
        let mut store = RecordStore::ephemeral();
        store.import_csv(CSV.as_bytes()).unwrap();

        let pans = |term: &str| -> Vec<String> {
            store
                .search(term)
                .iter()
                .map(|r| r.pan_number.clone())
                .collect()
        };
        assert_eq!(pans("vik"), vec!["BBBBB3333C"]);
        assert_eq!(pans("abcde"), vec!["ABCDE1234F"]);
        assert_eq!(pans("lic-3"), vec!["BBBBB3333C"]);
        assert_eq!(pans("1"), vec!["ABCDE1234F"]);
        assert_eq!(pans("  "), vec!["ABCDE1234F", "BBBBB3333C"]);
        assert!(pans("nobody").is_empty());
    }

    #[test]
    fn test_remove_by_pan() {
        let mut store = RecordStore::ephemeral();
        store.import_csv(CSV.as_bytes()).unwrap();

        let removed = store.remove_by_pan(" bbbbb3333c").unwrap();
        assert_eq!(removed.name, "Vik Rao");
        assert_eq!(store.len(), 1);
        assert!(store.find_by_pan("BBBBB3333C").is_none());

        let latest = store.fetch_last_uploaded().unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].pan_number, "ABCDE1234F");

        assert!(store.remove_by_pan("BBBBB3333C").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("records.json");

        let mut store = RecordStore::with_file(&path);
        store.import_csv(CSV.as_bytes()).unwrap();
        store.save().unwrap();

        let reloaded = RecordStore::load_from_file(&path).unwrap();
        assert_eq!(reloaded.records(), store.records());
        assert_eq!(reloaded.fetch_last_uploaded().unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_store_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            RecordStore::load_from_file(&path),
            Err(StoreError::Corrupt { .. })
        ));
        let store = RecordStore::load_or_ephemeral(Some(path.as_path()));
        assert!(store.is_empty());
    }
}
