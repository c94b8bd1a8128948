use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::record::StudentRecord;

const MAX_STEM_CHARS: usize = 120;

// Invalid characters for Windows: < > : " / \ | ? *, plus control characters (0-31)
static INVALID_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("Failed to compile invalid chars regex")
});
static RESERVED_NAMES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])$")
        .expect("Failed to compile reserved names regex")
});
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Failed to compile whitespace regex"));

/// Sanitize a filename stem for cross-platform compatibility.
/// Invalid characters become `_`, whitespace runs become a single `_`.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized = INVALID_CHARS.replace_all(name, "_");

    // Trim leading/trailing spaces and dots (problematic on Windows)
    let sanitized = sanitized.trim_matches(|c: char| c == '.' || c.is_whitespace());
    let sanitized = WHITESPACE_RUN.replace_all(sanitized, "_");

    if RESERVED_NAMES.is_match(&sanitized) {
        return format!("_{}", sanitized);
    }

    // Leave room for prefix, disambiguation suffix and extension
    let sanitized: String = sanitized.chars().take(MAX_STEM_CHARS).collect();

    if sanitized.is_empty() {
        "untitled".to_string()
    } else {
        sanitized
    }
}

/// Hands out unique archive entry names of the form `<prefix>_<stem>.<ext>`.
///
/// The stem is the sanitized student name, or the PAN when the name is blank. When a
/// name is already taken the sequence number is appended, then a counter. Comparison is
/// case-insensitive so entries never collide on case-insensitive filesystems.
/// Same records in the same order always yield the same names.
#[derive(Debug)]
pub struct EntryNamer {
    prefix: String,
    extension: String,
    taken: HashSet<String>,
}

impl EntryNamer {
    pub fn new(prefix: &str, extension: &str) -> Self {
        Self {
            prefix: sanitize_filename(prefix),
            extension: extension.trim_start_matches('.').to_string(),
            taken: HashSet::new(),
        }
    }

    pub fn name_for(&mut self, record: &StudentRecord) -> String {
        let source = if record.name.trim().is_empty() {
            record.pan_number.as_str()
        } else {
            record.name.as_str()
        };
        let stem = format!("{}_{}", self.prefix, sanitize_filename(source));

        let first = format!("{stem}.{}", self.extension);
        if self.claim(&first) {
            return first;
        }

        let with_seq = format!("{stem}_{}", record.sr_no);
        let candidate = format!("{with_seq}.{}", self.extension);
        if self.claim(&candidate) {
            return candidate;
        }

        let mut n = 2usize;
        loop {
            let candidate = format!("{with_seq}_{n}.{}", self.extension);
            if self.claim(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// File name for a standalone certificate, keyed by PAN.
    pub fn single_name(prefix: &str, record: &StudentRecord, extension: &str) -> String {
        format!(
            "{}_{}.{}",
            sanitize_filename(prefix),
            sanitize_filename(&record.identifier()),
            extension.trim_start_matches('.')
        )
    }

    fn claim(&mut self, name: &str) -> bool {
        self.taken.insert(name.to_lowercase())
    }
}
