//! Result table persistence.
//!
//! The table is a CSV file with the header `datatype,instrument,from_date,to_date`.
//! Writes go to a sibling temporary file that is renamed over the target, so a
//! reader never observes a half-written table.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{AvailabilityWindow, InstrumentPair, InstrumentRow};
use crate::AtlasError;

pub const TABLE_HEADER: [&str; 4] = ["datatype", "instrument", "from_date", "to_date"];

/// Flat on-disk form of an [`InstrumentRow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    pub datatype: String,
    pub instrument: String,
    pub from_date: String,
    pub to_date: String,
}

impl From<&InstrumentRow> for TableRecord {
    fn from(row: &InstrumentRow) -> Self {
        Self {
            datatype: row.datatype.clone(),
            instrument: row.instrument.clone(),
            from_date: row.from_date(),
            to_date: row.to_date(),
        }
    }
}

impl TryFrom<TableRecord> for InstrumentRow {
    type Error = AtlasError;

    fn try_from(record: TableRecord) -> Result<Self, Self::Error> {
        let window = AvailabilityWindow::from_strings(&record.from_date, &record.to_date)?;
        Ok(InstrumentRow::new(
            InstrumentPair::new(record.datatype, record.instrument),
            window,
        ))
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}

/// Replaces `path` with `contents` via write-to-temp then rename.
pub fn replace_file(path: &Path, contents: &[u8]) -> Result<(), AtlasError> {
    let temp = temp_sibling(path);
    let result = (|| {
        let mut file = fs::File::create(&temp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&temp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result.map_err(AtlasError::from)
}

/// Serializes rows to CSV bytes, header first, in the given order.
pub fn encode_table(rows: &[InstrumentRow]) -> Result<Vec<u8>, AtlasError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(TABLE_HEADER)?;
    for row in rows {
        writer.serialize(TableRecord::from(row))?;
    }
    writer
        .into_inner()
        .map_err(|error| AtlasError::Io(error.into_error()))
}

/// Writes the whole table to `path`.
pub fn write_table(path: &Path, rows: &[InstrumentRow]) -> Result<(), AtlasError> {
    let bytes = encode_table(rows)?;
    replace_file(path, &bytes)
}

/// Reads raw records; dates are left as strings.
pub fn read_records(path: &Path) -> Result<Vec<TableRecord>, AtlasError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    reader
        .deserialize()
        .map(|record| record.map_err(AtlasError::from))
        .collect()
}

/// Reads the table back into typed rows.
pub fn read_table(path: &Path) -> Result<Vec<InstrumentRow>, AtlasError> {
    read_records(path)?
        .into_iter()
        .map(InstrumentRow::try_from)
        .collect()
}

/// Rows belonging to one datatype, preserving table order.
pub fn rows_for_datatype<'a>(
    rows: &'a [InstrumentRow],
    datatype: &'a str,
) -> impl Iterator<Item = &'a InstrumentRow> + 'a {
    rows.iter().filter(move |row| row.datatype == datatype)
}
