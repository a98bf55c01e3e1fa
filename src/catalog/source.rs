//! Tabular Sources
//!
//! A table is a header row plus data rows of text cells. The catalog only
//! depends on [`TableSource`]; CSV files and Excel/ODS workbooks are the
//! built-in sources, picked by extension in [`table_source_for`].

use calamine::{open_workbook_auto, Data, Range, Reader};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Header plus rows, every cell as text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create a table; short rows are padded with blank cells
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                if row.len() < width {
                    row.resize(width, String::new());
                }
                row
            })
            .collect();
        Self { headers, rows }
    }

    /// Convenience constructor from string slices
    pub fn from_rows(headers: &[&str], rows: &[&[&str]]) -> Self {
        Self::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    /// Header cells in column order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows in source order
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Index of the first header matching any alias (trimmed, ASCII case-insensitive)
    pub fn column_index<S: AsRef<str>>(&self, aliases: &[S]) -> Option<usize> {
        self.headers.iter().position(|header| {
            let header = header.trim();
            aliases
                .iter()
                .map(|alias| alias.as_ref().trim())
                .filter(|alias| !alias.is_empty())
                .any(|alias| header.eq_ignore_ascii_case(alias))
        })
    }
}

/// Something that yields a table of named columns
pub trait TableSource {
    /// Read the whole table
    fn read_table(&self) -> Result<Table>;

    /// Human-readable origin, used in progress messages
    fn describe(&self) -> String;
}

impl TableSource for Table {
    fn read_table(&self) -> Result<Table> {
        Ok(self.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory table ({} rows)", self.rows.len())
    }
}

/// CSV file source
#[derive(Debug, Clone)]
pub struct CsvTableSource {
    path: PathBuf,
    delimiter: u8,
}

impl CsvTableSource {
    /// Comma-separated file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    /// Use a different field delimiter (e.g. `b';'` or `b'\t'`)
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse CSV from any reader
    pub fn parse<R: Read>(reader: R, delimiter: u8) -> Result<Table> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(reader);

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Table::new(headers, rows))
    }
}

impl TableSource for CsvTableSource {
    fn read_table(&self) -> Result<Table> {
        let file = std::fs::File::open(&self.path).map_err(|e| Error::TableReadFailed {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        Self::parse(file, self.delimiter).map_err(|e| Error::TableReadFailed {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Workbook source (`.xlsx`, `.xlsm`, `.xlsb`, `.xls`, `.ods`)
///
/// Reads the first worksheet. Its first row is the header; every cell is
/// turned into text and empty cells become `""`.
#[derive(Debug, Clone)]
pub struct XlsxTableSource {
    path: PathBuf,
}

impl XlsxTableSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the underlying workbook
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build a table from a worksheet range, first row as header
    pub fn table_from_range(range: &Range<Data>) -> Table {
        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|row| row.iter().map(|c| cell_text(c).trim().to_string()).collect())
            .unwrap_or_default();
        let rows = rows
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        Table::new(headers, rows)
    }

    fn read_failed(&self, reason: impl ToString) -> Error {
        Error::TableReadFailed {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Cell value as text; whole-number floats lose their fraction
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

impl TableSource for XlsxTableSource {
    fn read_table(&self) -> Result<Table> {
        let mut workbook = open_workbook_auto(&self.path).map_err(|e| self.read_failed(e))?;
        let sheet = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| self.read_failed("workbook has no worksheets"))?;
        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| self.read_failed(e))?;
        debug!(
            "Read worksheet {:?} of {} ({}x{})",
            sheet,
            self.path.display(),
            range.height(),
            range.width()
        );
        Ok(Self::table_from_range(&range))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Pick a source by file extension: workbooks for Excel/ODS, tab-separated
/// for `.tsv`, comma-separated otherwise
pub fn table_source_for(path: &Path) -> Box<dyn TableSource> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => Box::new(XlsxTableSource::new(path)),
        Some("tsv") => Box::new(CsvTableSource::new(path).with_delimiter(b'\t')),
        _ => Box::new(CsvTableSource::new(path)),
    }
}
