// src/storage/mod.rs
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::eastmoney::models::{ReportRecord, CSV_HEADERS};
use crate::utils::error::StorageError;

// Spreadsheet tools frequently misrender plain UTF-8; the marker keeps the
// Chinese headers readable when the file is opened directly.
const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

// The key column under its Chinese header, with the raw API name accepted
// for files produced by other exports.
const CODE_HEADERS: [&str; 2] = ["股票代码", "SECURITY_CODE"];

/// Stock codes already present in a period's output file.
///
/// `Absent` means the file did not exist (or could not be read); callers must
/// not treat that as an error, it simply means every fetched row is new.
#[derive(Debug)]
pub enum ExistingKeys {
    Found(HashSet<String>),
    Absent,
}

impl ExistingKeys {
    pub fn contains(&self, code: &str) -> bool {
        match self {
            ExistingKeys::Found(codes) => codes.contains(code),
            ExistingKeys::Absent => false,
        }
    }
}

/// Builds the set of stock codes already present in `path`.
///
/// A missing file yields `Absent`. An unreadable or corrupt file is logged
/// and also treated as `Absent`: failing open means at worst re-downloading
/// rows, never losing them.
pub fn load_existing_codes(path: &Path) -> ExistingKeys {
    if !path.exists() {
        return ExistingKeys::Absent;
    }

    match read_code_column(path) {
        Ok(codes) => {
            tracing::info!("Loaded {} existing records from {}", codes.len(), path.display());
            ExistingKeys::Found(codes)
        }
        Err(e) => {
            tracing::warn!("Could not read existing file {}: {}", path.display(), e);
            ExistingKeys::Absent
        }
    }
}

fn read_code_column(path: &Path) -> Result<HashSet<String>, StorageError> {
    // csv strips a leading UTF-8 BOM before header parsing.
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let Some(code_idx) = headers.iter().position(|h| CODE_HEADERS.contains(&h)) else {
        // Header-only or foreign file; nothing usable to dedup against.
        return Ok(HashSet::new());
    };

    let mut codes = HashSet::new();
    for row in reader.records() {
        let row = row?;
        if let Some(code) = row.get(code_idx) {
            if !code.is_empty() {
                codes.insert(code.to_string());
            }
        }
    }

    Ok(codes)
}

/// Appends `records` to the period's CSV at `path`.
///
/// A missing or empty file is created with the UTF-8 byte-order marker and
/// the fixed header row first; an existing file gets rows only. Returns the
/// number of rows written. No transactional guarantee: a crash mid-write can
/// leave a partial file behind.
pub fn append_records(path: &Path, records: &[ReportRecord]) -> Result<usize, StorageError> {
    if records.is_empty() {
        return Ok(0);
    }

    let needs_header = match fs::metadata(path) {
        Ok(meta) => meta.len() == 0,
        Err(_) => true,
    };

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if needs_header {
        file.write_all(UTF8_BOM)?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    if needs_header {
        writer.write_record(CSV_HEADERS)?;
    }
    for record in records {
        writer.write_record(record.to_row())?;
    }
    writer.flush()?;

    Ok(records.len())
}
