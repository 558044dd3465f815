//! CSV import pipeline.
//
// Rows are validated one at a time; a bad row becomes a `RowError` and never
// stops the rows after it. Only whole-file problems (unreadable source,
// missing header columns) abort the import.

use super::calendar_types::EventDraft;
use super::calendar_validation::validate_interval;
use super::{CalendarError, ErrorKind, InputField};
use chrono_tz::Tz;
use log::{debug, info};
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Required header row, in canonical order
pub const CSV_HEADERS: [&str; 5] = ["Summary", "Start Date", "Start Time", "End Date", "End Time"];

const COLUMN_FIELDS: [InputField; 5] = [
    InputField::Summary,
    InputField::StartDate,
    InputField::StartTime,
    InputField::EndDate,
    InputField::EndTime,
];

/// Failure that prevents the whole file from being imported
#[derive(Debug, thiserror::Error)]
pub enum CsvImportError {
    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read CSV: {0}")]
    Read(#[from] csv::Error),
    #[error("CSV is missing required columns: {}", .0.join(", "))]
    MissingHeaders(Vec<String>),
}

impl CsvImportError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidFormat
    }
}

/// Why one data row was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// 1-based data row number, the header row not counted
    pub row: usize,
    pub field: Option<InputField>,
    pub reason: String,
    pub kind: ErrorKind,
}

impl RowError {
    fn from_calendar_error(row: usize, err: CalendarError) -> Self {
        Self { row, field: err.field(), kind: err.kind(), reason: err.to_string() }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field {
            Some(field) => write!(f, "Row {} [{}] {}: {}", self.row, self.kind, field, self.reason),
            None => write!(f, "Row {} [{}] {}", self.row, self.kind, self.reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsvImportRow {
    pub row: usize,
    pub outcome: Result<EventDraft, RowError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub rejected: usize,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} imported, {} rejected", self.imported, self.rejected)
    }
}

/// Every row's outcome, in file order
#[derive(Debug, Clone, PartialEq)]
pub struct CsvImportResult {
    pub headers: Vec<String>,
    pub rows: Vec<CsvImportRow>,
}

impl CsvImportResult {
    pub fn drafts(&self) -> impl Iterator<Item = &EventDraft> {
        self.rows.iter().filter_map(|r| r.outcome.as_ref().ok())
    }

    pub fn rejected(&self) -> impl Iterator<Item = &RowError> {
        self.rows.iter().filter_map(|r| r.outcome.as_ref().err())
    }

    pub fn into_drafts(self) -> Vec<EventDraft> {
        self.rows.into_iter().filter_map(|r| r.outcome.ok()).collect()
    }

    pub fn summary(&self) -> ImportSummary {
        let imported = self.drafts().count();
        ImportSummary { imported, rejected: self.rows.len() - imported }
    }
}

/// Maps CSV rows to drafts in one timezone, optionally targeting one calendar
#[derive(Debug, Clone)]
pub struct CsvImporter {
    tz: Tz,
    calendar_id: Option<String>,
}

impl CsvImporter {
    pub fn new(tz: Tz) -> Self {
        Self { tz, calendar_id: None }
    }

    pub fn with_calendar(mut self, calendar_id: Option<String>) -> Self {
        self.calendar_id = calendar_id;
        self
    }

    /// Lazily map the rows of `source`. Fails up front only when the header
    /// row lacks a required column.
    pub fn rows<R: Read>(&self, source: R) -> Result<CsvRows<'_, R>, CsvImportError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(source);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut columns = [0usize; 5];
        let mut missing = Vec::new();
        for (slot, name) in columns.iter_mut().zip(CSV_HEADERS) {
            match headers.iter().position(|h| h == name) {
                Some(index) => *slot = index,
                None => missing.push(name.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(CsvImportError::MissingHeaders(missing));
        }
        debug!("CSV headers: {:?}", headers);

        Ok(CsvRows {
            importer: self,
            headers,
            columns,
            records: reader.into_records(),
            row: 0,
            done: false,
        })
    }

    /// Run the pipeline to completion
    pub fn import<R: Read>(&self, source: R) -> Result<CsvImportResult, CsvImportError> {
        let rows = self.rows(source)?;
        let headers = rows.headers().to_vec();
        let rows = rows.collect::<Result<Vec<_>, _>>()?;
        let result = CsvImportResult { headers, rows };
        info!("CSV import: {}", result.summary());
        Ok(result)
    }

    pub fn import_path(&self, path: &Path) -> Result<CsvImportResult, CsvImportError> {
        let file = File::open(path)
            .map_err(|source| CsvImportError::Open { path: path.to_path_buf(), source })?;
        self.import(file)
    }

    fn map_record(&self, row: usize, columns: &[usize; 5], record: &csv::StringRecord) -> CsvImportRow {
        let mut values = [""; 5];
        for ((value, &index), field) in values.iter_mut().zip(columns).zip(COLUMN_FIELDS) {
            match record.get(index) {
                Some(v) => *value = v,
                None => {
                    return CsvImportRow {
                        row,
                        outcome: Err(RowError::from_calendar_error(
                            row,
                            CalendarError::invalid_format(field, "column missing from row"),
                        )),
                    }
                }
            }
        }
        let [summary, start_date, start_time, end_date, end_time] = values;

        let outcome = validate_interval(start_date, start_time, end_date, end_time, self.tz)
            .and_then(|interval| EventDraft::new(summary, interval))
            .map(|draft| draft.with_calendar(self.calendar_id.clone()))
            .map_err(|err| RowError::from_calendar_error(row, err));
        CsvImportRow { row, outcome }
    }
}

/// Iterator over per-row outcomes. Yields `Err` once if the source fails
/// mid-file and then stops.
pub struct CsvRows<'a, R> {
    importer: &'a CsvImporter,
    headers: Vec<String>,
    columns: [usize; 5],
    records: csv::StringRecordsIntoIter<R>,
    row: usize,
    done: bool,
}

impl<R> CsvRows<'_, R> {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: Read> Iterator for CsvRows<'_, R> {
    type Item = Result<CsvImportRow, CsvImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let record = self.records.next()?;
        self.row += 1;
        match record {
            Ok(record) => Some(Ok(self.importer.map_record(self.row, &self.columns, &record))),
            Err(err) if err.is_io_error() => {
                self.done = true;
                Some(Err(CsvImportError::Read(err)))
            }
            Err(err) => Some(Ok(CsvImportRow {
                row: self.row,
                outcome: Err(RowError {
                    row: self.row,
                    field: None,
                    reason: err.to_string(),
                    kind: ErrorKind::InvalidFormat,
                }),
            })),
        }
    }
}

/// Write drafts in the import format, times in each draft's own timezone
pub fn export_drafts<W: Write>(writer: W, drafts: &[EventDraft]) -> Result<(), CsvImportError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(CSV_HEADERS)?;
    for draft in drafts {
        let (start, end) = (draft.start(), draft.end());
        writer.write_record([
            draft.summary().to_string(),
            start.format("%Y-%m-%d").to_string(),
            start.format("%H:%M:%S").to_string(),
            end.format("%Y-%m-%d").to_string(),
            end.format("%H:%M:%S").to_string(),
        ])?;
    }
    writer.flush().map_err(|e| CsvImportError::Read(e.into()))?;
    Ok(())
}

/// Create a CSV with the header row followed by `drafts`, which may be empty
pub fn write_template(path: &Path, drafts: &[EventDraft]) -> Result<(), CsvImportError> {
    let file = File::create(path)
        .map_err(|source| CsvImportError::Open { path: path.to_path_buf(), source })?;
    export_drafts(file, drafts)?;
    info!("CSV template with {} row(s) created at {}", drafts.len(), path.display());
    Ok(())
}
