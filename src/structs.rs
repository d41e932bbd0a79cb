use crate::error::{PipelineError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_URL: &str = "https://web.archive.org/web/20230908091635/https://en.wikipedia.org/wiki/List_of_largest_banks";
pub const DEFAULT_TABLE_NAME: &str = "Largest_banks";
pub const MARKET_CAP_COLUMN: &str = "Market cap (US$ billion)";

/// A single scalar value held by a table cell or returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Numeric view of the cell; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Float(v) => Some(*v),
            Cell::Null | Cell::Text(_) => None,
        }
    }
}

impl fmt::Display for Cell {
    /// Floats always keep a fractional part (`80.0`, not `80`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Float(v) => write!(f, "{v:?}"),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

/// Storage type inferred for a whole column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Narrowest type that still admits `value` after admitting everything seen so far.
    fn widen(self, value: &str) -> Self {
        match self {
            ColumnType::Integer if parse_int(value).is_some() => ColumnType::Integer,
            ColumnType::Integer | ColumnType::Real if parse_float(value).is_some() => {
                ColumnType::Real
            }
            _ => ColumnType::Text,
        }
    }

    fn coerce(self, value: String) -> Cell {
        match self {
            ColumnType::Integer => match parse_int(&value) {
                Some(n) => Cell::Int(n),
                None => Cell::Text(value),
            },
            ColumnType::Real => match parse_float(&value) {
                Some(n) => Cell::Float(n),
                None => Cell::Text(value),
            },
            ColumnType::Text => Cell::Text(value),
        }
    }
}

fn parse_int(value: &str) -> Option<i64> {
    strip_thousands(value.trim())?.parse().ok()
}

fn parse_float(value: &str) -> Option<f64> {
    strip_thousands(value.trim())?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Removes thousands separators from the integer part of `value`.
///
/// Commas are only accepted between digit groups of three (`1,250.5`);
/// anything else (`1,2`, `12,34,567`, a comma in the fraction) yields `None`.
fn strip_thousands(value: &str) -> Option<String> {
    if !value.contains(',') {
        return Some(value.to_string());
    }

    let (integer, fraction) = match value.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (value, None),
    };
    if fraction.is_some_and(|f| f.contains(',')) {
        return None;
    }

    let digits = integer.trim_start_matches(['+', '-']);
    let sign = &integer[..integer.len() - digits.len()];
    let mut groups = digits.split(',');
    let lead = groups.next()?;
    if lead.is_empty() || lead.len() > 3 || !lead.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut stripped = format!("{sign}{lead}");
    for group in groups {
        if group.len() != 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stripped.push_str(group);
    }
    if let Some(fraction) = fraction {
        stripped.push('.');
        stripped.push_str(fraction);
    }
    Some(stripped)
}

/// In-memory table: named columns and rectangular rows kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// Table as scraped from the source page.
pub type RawTable = Table;
/// Raw table plus one converted market-cap column per currency.
pub type EnrichedTable = Table;

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from text cells, coercing every column whose cells all
    /// parse as numbers into `Cell::Int` or `Cell::Float`.
    ///
    /// # Errors
    /// Returns `PipelineError::Data` if a row's width differs from the header.
    pub fn from_text_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let width = columns.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(PipelineError::Data(format!(
                "row {} has {} cells, expected {}",
                i + 1,
                row.len(),
                width
            )));
        }

        let mut kinds = vec![ColumnType::Integer; width];
        for row in &rows {
            for (kind, value) in kinds.iter_mut().zip(row) {
                *kind = kind.widen(value);
            }
        }

        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&kinds)
                    .map(|(value, kind)| kind.coerce(value))
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of the named column in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::Data(format!(
                "row has {} cells, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Appends a column; `values` must hold exactly one cell per row.
    pub fn add_column(&mut self, name: String, values: Vec<Cell>) -> Result<()> {
        if self.column_index(&name).is_some() {
            return Err(PipelineError::Data(format!("duplicate column `{name}`")));
        }
        if values.len() != self.rows.len() {
            return Err(PipelineError::Data(format!(
                "column `{name}` has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        self.columns.push(name);
        Ok(())
    }

    /// Infers the storage type of column `index`. Nulls are ignored; a column
    /// with no typed cells is stored as text.
    pub fn column_type(&self, index: usize) -> ColumnType {
        let mut kind = None;
        for row in &self.rows {
            kind = match (&row[index], kind) {
                (Cell::Null, k) => k,
                (Cell::Text(_), _) => return ColumnType::Text,
                (Cell::Float(_), _) | (Cell::Int(_), Some(ColumnType::Real)) => {
                    Some(ColumnType::Real)
                }
                (Cell::Int(_), _) => Some(ColumnType::Integer),
            };
        }
        kind.unwrap_or(ColumnType::Text)
    }
}

/// Currency code to USD multiplier, loaded from the rate file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeRates(BTreeMap<String, f64>);

impl ExchangeRates {
    pub fn insert(&mut self, currency: impl Into<String>, rate: f64) {
        self.0.insert(currency.into(), rate);
    }

    /// # Errors
    /// Returns `PipelineError::MissingRate` if `currency` has no entry.
    pub fn rate(&self, currency: &str) -> Result<f64> {
        self.0
            .get(currency)
            .copied()
            .ok_or_else(|| PipelineError::MissingRate(currency.to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ExchangeRates {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Attribute filter used to pick the `<table>` element to scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSelector {
    attributes: Vec<(String, String)>,
}

impl TableSelector {
    /// Matches any table.
    pub fn any() -> Self {
        Self {
            attributes: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// CSS selector equivalent. `class` matches one whitespace-separated
    /// class token; other attributes must match exactly.
    pub fn to_css(&self) -> String {
        let mut css = String::from("table");
        for (name, value) in &self.attributes {
            let value = value.replace('\\', "\\\\").replace('"', "\\\"");
            let op = if name == "class" { "~=" } else { "=" };
            css.push_str(&format!("[{name}{op}\"{value}\"]"));
        }
        css
    }
}

impl Default for TableSelector {
    fn default() -> Self {
        Self::any().with("class", "wikitable")
    }
}

/// Configuration for the currency conversion step
#[derive(Debug, Clone)]
pub struct TransformConfig {
    pub market_cap_column: String,
    pub currencies: Vec<String>,
}

impl TransformConfig {
    pub fn derived_column(&self, currency: &str) -> String {
        format!("MC_{currency}_Billion")
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            market_cap_column: MARKET_CAP_COLUMN.to_string(),
            currencies: vec!["GBP".into(), "EUR".into(), "INR".into()],
        }
    }
}

/// Everything the driver needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub url: String,
    pub table_selector: TableSelector,
    pub rates_path: PathBuf,
    pub csv_path: PathBuf,
    pub db_path: PathBuf,
    pub table_name: String,
    pub log_path: PathBuf,
    pub transform: TransformConfig,
    pub queries: Vec<String>,
}

/// Renders `name` for use in SQL text. Plain identifiers are kept as they
/// are; anything else is double-quoted.
pub fn sql_identifier(name: &str) -> String {
    let mut chars = name.chars();
    let bare = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if bare {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// The four report queries, run in order after loading.
///
/// The average is taken over the GBP column when GBP is converted,
/// otherwise over the first converted currency, and over the USD column
/// when no currency is configured.
pub fn default_queries(table_name: &str, transform: &TransformConfig) -> Vec<String> {
    let table = sql_identifier(table_name);
    let averaged = match transform
        .currencies
        .iter()
        .find(|c| c.as_str() == "GBP")
        .or_else(|| transform.currencies.first())
    {
        Some(currency) => transform.derived_column(currency),
        None => transform.market_cap_column.clone(),
    };
    vec![
        format!("SELECT * FROM {table}"),
        format!("SELECT AVG({}) FROM {table}", sql_identifier(&averaged)),
        format!("SELECT \"Bank name\" FROM {table} LIMIT 5"),
        format!("PRAGMA table_info({table});"),
    ]
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            table_selector: TableSelector::default(),
            rates_path: PathBuf::from("data/exchange_rate.csv"),
            csv_path: PathBuf::from("data/final_data.csv"),
            db_path: PathBuf::from("Banks.db"),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            log_path: PathBuf::from("code_log.txt"),
            transform: TransformConfig::default(),
            queries: default_queries(DEFAULT_TABLE_NAME, &TransformConfig::default()),
        }
    }
}
