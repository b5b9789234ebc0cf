//! Payload container assembly.
//!
//! A payload container is a zip archive laid out as an importable Python
//! tree: every resolved unit at its package path, the entrypoint at its
//! fully qualified path, and empty `__init__.py` files for any entrypoint
//! ancestor package nothing else created. All entries share one modification
//! timestamp and units are written in name order, so identical inputs
//! produce byte-identical containers.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::{Cursor, Write};

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::core::PayloadError;
use crate::name::UnitName;
use crate::resolver::ResolvedUnit;

/// Compression applied to container entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression; fastest to build and unpack.
    Stored,
    /// Deflate compression; smaller transfers.
    #[default]
    Deflated,
}

impl Compression {
    /// Parse a configured compression name. Unknown values fall back to
    /// stored, with a warning, rather than failing the build.
    pub fn parse_lossy(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "stored" => Self::Stored,
            "deflated" => Self::Deflated,
            other => {
                warn!("bad compression setting '{other}', using stored");
                Self::Stored
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Deflated => "deflated",
        }
    }

    fn method(self) -> CompressionMethod {
        match self {
            Self::Stored => CompressionMethod::Stored,
            Self::Deflated => CompressionMethod::Deflated,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a wall-clock time to a container timestamp. The zip format
/// cannot represent times before 1980.
pub fn container_timestamp(timestamp: &DateTime<Utc>) -> Result<zip::DateTime, PayloadError> {
    let year = u16::try_from(timestamp.year()).map_err(|_| pre_epoch(timestamp))?;
    zip::DateTime::from_date_and_time(
        year,
        timestamp.month() as u8,
        timestamp.day() as u8,
        timestamp.hour() as u8,
        timestamp.minute() as u8,
        timestamp.second() as u8,
    )
    .map_err(|_| pre_epoch(timestamp))
}

fn pre_epoch(timestamp: &DateTime<Utc>) -> PayloadError {
    PayloadError::PreZipEpoch {
        timestamp: timestamp.to_rfc3339(),
    }
}

/// Assemble the container for an entrypoint and its resolved closure.
pub fn assemble(
    units: &BTreeMap<UnitName, ResolvedUnit>,
    entry_name: &UnitName,
    entry_source: &[u8],
    compression: Compression,
    timestamp: &DateTime<Utc>,
) -> Result<Vec<u8>, PayloadError> {
    let modified = container_timestamp(timestamp)?;
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut written: HashSet<String> = HashSet::new();

    for unit in units.values() {
        zip.start_file(unit.archive_path.as_str(), entry_options(compression, modified))
            .map_err(container_error)?;
        zip.write_all(&unit.source)?;
        written.insert(unit.archive_path.clone());
    }

    let entry_path = format!("{}.py", entry_name.archive_path());
    zip.start_file(entry_path.as_str(), entry_options(compression, modified))
        .map_err(container_error)?;
    zip.write_all(entry_source)?;
    written.insert(entry_path);

    // Any entrypoint ancestor package not created by a unit still needs an
    // __init__.py for the import system to descend through it.
    for ancestor in entry_name.ancestors() {
        let init_path = format!("{}/__init__.py", ancestor.archive_path());
        if written.insert(init_path.clone()) {
            zip.start_file(init_path.as_str(), entry_options(compression, modified))
                .map_err(container_error)?;
        }
    }

    let cursor = zip.finish().map_err(container_error)?;
    let data = cursor.into_inner();
    debug!(
        entry = %entry_name,
        units = units.len(),
        bytes = data.len(),
        %compression,
        "assembled payload container"
    );
    Ok(data)
}

fn entry_options(compression: Compression, modified: zip::DateTime) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(compression.method())
        .last_modified_time(modified)
}

fn container_error(err: ZipError) -> PayloadError {
    match err {
        ZipError::Io(io) => PayloadError::IoError(io),
        other => PayloadError::Other {
            message: format!("container write failed: {other}"),
        },
    }
}
