//! Tabular dataset loading.
//!
//! Datasets are small header-first CSV files, fetched over HTTP or read from
//! disk. Cells keep their raw text; missing cells are `None`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use diabetes_api::features::{FeatureSchema, LABEL_COLUMN};
use log::{debug, info};
use ndarray::Array2;
use thiserror::Error;

pub const DEFAULT_DATA_URL: &str =
    "https://raw.githubusercontent.com/plotly/datasets/master/diabetes.csv";

/// Cell values treated as missing, besides the empty string. Same set pandas
/// uses by default.
const NULL_MARKERS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset not found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to download dataset: {0}")]
    Http(#[from] reqwest::Error),

    #[error("dataset has no header row")]
    MissingHeader,

    #[error("line {line}: {found} fields, header has {expected}")]
    TooManyFields {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("row {row}, column {column}: missing value")]
    MissingValue { row: usize, column: String },

    #[error("row {row}, column {column}: '{value}' is not a number")]
    InvalidNumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("row {row}: label '{value}' is not 0 or 1")]
    InvalidLabel { row: usize, value: String },
}

/// Where the trainer reads its data from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Url(String),
    Path(PathBuf),
}

impl FromStr for DataSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("http://") || s.starts_with("https://") {
            Ok(DataSource::Url(s.to_string()))
        } else {
            Ok(DataSource::Path(PathBuf::from(s)))
        }
    }
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::Url(DEFAULT_DATA_URL.to_string())
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Url(url) => f.write_str(url),
            DataSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Header plus rows of raw cells. Every row has exactly one cell per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Dataset {
    /// Parse CSV text. Rows shorter than the header are padded with missing
    /// cells; longer rows are rejected. Blank lines are skipped. Quoted fields
    /// may contain commas, `""` escapes and line breaks.
    pub fn parse(text: &str) -> Result<Self, DatasetError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut records = split_records(text).into_iter();

        let (_, header) = records.next().ok_or(DatasetError::MissingHeader)?;
        let headers: Vec<String> = header.into_iter().map(|h| h.trim().to_string()).collect();

        let mut rows = Vec::new();
        for (line, fields) in records {
            let mut cells: Vec<Option<String>> = fields.into_iter().map(cell_value).collect();
            if cells.len() > headers.len() {
                return Err(DatasetError::TooManyFields {
                    line,
                    expected: headers.len(),
                    found: cells.len(),
                });
            }
            cells.resize(headers.len(), None);
            rows.push(cells);
        }

        Ok(Self { headers, rows })
    }

    /// Read a CSV file from disk.
    pub fn read_path(path: &Path) -> Result<Self, DatasetError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DatasetError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&text)
    }

    /// Load from any source; URLs are fetched with a plain GET.
    pub async fn load(source: &DataSource) -> Result<Self, DatasetError> {
        let dataset = match source {
            DataSource::Path(path) => Self::read_path(path)?,
            DataSource::Url(url) => {
                debug!("Downloading dataset from {}", url);
                let text = reqwest::get(url.as_str())
                    .await?
                    .error_for_status()?
                    .text()
                    .await?;
                Self::parse(&text)?
            }
        };
        info!(
            "Loaded {} rows x {} columns from {}",
            dataset.n_rows(),
            dataset.headers.len(),
            source
        );
        Ok(dataset)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Entries of `required` absent from the header, in `required` order.
    pub fn missing_columns(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .cloned()
            .collect()
    }

    /// Number of missing cells in a column; `None` if the column is absent.
    pub fn null_count(&self, column: &str) -> Option<usize> {
        let index = self.column_index(column)?;
        Some(self.rows.iter().filter(|row| row[index].is_none()).count())
    }

    /// Feature matrix in schema order and the binary `Outcome` labels.
    pub fn to_training_data(
        &self,
        schema: &FeatureSchema,
    ) -> Result<(Array2<f64>, Vec<u8>), DatasetError> {
        let missing = self.missing_columns(&schema.required_columns());
        if !missing.is_empty() {
            return Err(DatasetError::MissingColumns(missing));
        }

        let names = schema.names();
        let feature_indices: Vec<usize> = names
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        let label_index = self
            .column_index(LABEL_COLUMN)
            .ok_or_else(|| DatasetError::MissingColumns(vec![LABEL_COLUMN.to_string()]))?;

        let mut values = Vec::with_capacity(self.rows.len() * names.len());
        let mut labels = Vec::with_capacity(self.rows.len());
        for (row_number, row) in self.rows.iter().enumerate() {
            for (&index, name) in feature_indices.iter().zip(&names) {
                values.push(parse_number(row_number, name, &row[index])?);
            }
            labels.push(parse_label(row_number, &row[label_index])?);
        }

        let x = Array2::from_shape_vec((self.rows.len(), names.len()), values)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok((x, labels))
    }
}

fn parse_number(row: usize, column: &str, cell: &Option<String>) -> Result<f64, DatasetError> {
    let raw = cell.as_deref().ok_or_else(|| DatasetError::MissingValue {
        row,
        column: column.to_string(),
    })?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DatasetError::InvalidNumber {
            row,
            column: column.to_string(),
            value: raw.to_string(),
        })
}

fn parse_label(row: usize, cell: &Option<String>) -> Result<u8, DatasetError> {
    let value = parse_number(row, LABEL_COLUMN, cell)?;
    if value == 0.0 {
        Ok(0)
    } else if value == 1.0 {
        Ok(1)
    } else {
        Err(DatasetError::InvalidLabel {
            row,
            value: cell.clone().unwrap_or_default(),
        })
    }
}

fn cell_value(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || NULL_MARKERS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split CSV text into records, each paired with the 1-based line it starts
/// on. Quote state carries across line breaks; blank lines yield no record.
fn split_records(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut had_quotes = false;
    let mut line = 1;
    let mut start = 1;
    let mut chars = text.chars().peekable();

    let mut finish = |fields: Vec<String>, start: usize, had_quotes: bool| {
        let blank = !had_quotes && fields.len() == 1 && fields[0].trim().is_empty();
        if !blank {
            records.push((start, fields));
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => {
                quoted = !quoted;
                had_quotes = true;
            }
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            '\r' if !quoted && chars.peek() == Some(&'\n') => {}
            '\n' if !quoted => {
                fields.push(std::mem::take(&mut field));
                finish(std::mem::take(&mut fields), start, had_quotes);
                had_quotes = false;
                line += 1;
                start = line;
            }
            '\n' => {
                field.push('\n');
                line += 1;
            }
            _ => field.push(c),
        }
    }
    if had_quotes || !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        finish(fields, start, had_quotes);
    }
    records
}
