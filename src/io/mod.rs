//! Data loading
//!
//! CSV/TSV and JSON files are read with polars and converted into the
//! engine's [`Table`].

use crate::data::{Cell, Table};
use crate::error::{PhenoQcError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Extensions accepted as input
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["csv", "tsv", "json"];

/// Null markers recognised in delimited files
const NULL_MARKERS: [&str; 4] = ["", "NA", "NaN", "null"];

/// Input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Tsv,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" => Some(FileFormat::Csv),
            "tsv" => Some(FileFormat::Tsv),
            "json" => Some(FileFormat::Json),
            _ => None,
        }
    }
}

/// polars-backed file loader
#[derive(Debug, Clone)]
pub struct DataLoader {
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: 1000,
        }
    }

    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = rows.max(1);
        self
    }

    fn load_delimited(&self, path: &Path, separator: u8) -> Result<DataFrame> {
        let file = File::open(path)?;
        let nulls = NullValues::AllColumns(NULL_MARKERS.iter().map(|s| s.to_string()).collect());
        let parse_opts = CsvParseOptions::default()
            .with_separator(separator)
            .with_null_values(Some(nulls));

        Ok(CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()?)
    }

    /// JSON array of records
    fn load_json(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path)?;
        Ok(JsonReader::new(file).finish()?)
    }

    /// Detect format from the extension and load
    pub fn load_auto(&self, path: &Path) -> Result<DataFrame> {
        match FileFormat::from_path(path) {
            Some(FileFormat::Csv) => self.load_delimited(path, b','),
            Some(FileFormat::Tsv) => self.load_delimited(path, b'\t'),
            Some(FileFormat::Json) => self.load_json(path),
            None => Err(PhenoQcError::LoadError(format!(
                "unsupported file type: {}",
                path.display()
            ))),
        }
    }

    pub fn load_table(&self, path: &Path) -> Result<Table> {
        let df = self.load_auto(path)?;
        debug!(path = %path.display(), rows = df.height(), columns = df.width(), "Loaded file");
        dataframe_to_table(&df)
    }
}

/// Load a supported file with default options
pub fn load_table(path: &Path) -> Result<Table> {
    DataLoader::new().load_table(path)
}

/// Numeric columns become `Cell::Number`, everything else is rendered as
/// text. Nulls stay `Cell::Null`.
pub fn dataframe_to_table(df: &DataFrame) -> Result<Table> {
    let mut table = Table::new();
    for series in df.get_columns() {
        let cells: Vec<Cell> = if series.dtype().is_numeric() {
            let floats = series.cast(&DataType::Float64)?;
            floats.f64()?.into_iter().map(Cell::from).collect()
        } else {
            let text = series.cast(&DataType::String)?;
            text.str()?
                .into_iter()
                .map(|v| v.map_or(Cell::Null, Cell::from))
                .collect()
        };
        table.push_column(series.name(), cells)?;
    }
    Ok(table)
}
