//! Result types for sql-runner.
//!
//! Defines the structures used to carry rows back from a target, plus the two
//! small containers used when a script's output is captured for logging:
//! [`ResultRow`] collects scanned values, [`ParamList`] renders them back out
//! as SQL literals.

use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgRow, PgTypeInfo, Postgres};
use sqlx::Row as SqlxRow;

use crate::error::{Result, RunnerError};

/// Text used for SQL NULL when values are rendered for display.
pub const NULL_TEXT: &str = "NULL";

/// Decodes a raw driver value as text.
///
/// Shared by [`ResultRow`] and [`ParamList`] so that both agree on how bytes
/// and NULLs become strings.
pub fn text_value(raw: Option<&[u8]>) -> String {
    match raw {
        Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        None => NULL_TEXT.to_string(),
    }
}

/// Materialized result of one row-returning statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    /// Column metadata for the result set.
    pub columns: Vec<ColumnInfo>,

    /// Rows of nullable text values.
    pub rows: Vec<Vec<Option<String>>>,
}

impl RowSet {
    /// Creates a row set with the given columns and rows.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    /// Returns the column names in order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Column data type as reported by the backend.
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Flat sequence of scanned column values.
///
/// Values from every row of a result set are appended to the same sequence;
/// nothing marks where one row ends. The buffer is reusable via [`init`],
/// but not from two scans at once.
///
/// [`init`]: ResultRow::init
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultRow {
    values: Vec<String>,
}

impl ResultRow {
    /// Creates an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties the sequence, keeping its allocation.
    pub fn init(&mut self) {
        self.values.clear();
    }

    /// Appends one column value.
    pub fn scan_column(&mut self, raw: Option<&[u8]>) {
        self.values.push(text_value(raw));
    }

    /// Appends every column of a Postgres row.
    ///
    /// Rows from the simple-query protocol arrive in text format, so each
    /// value is decoded as a string regardless of its declared type.
    pub fn scan_row(&mut self, row: &PgRow) -> Result<()> {
        for index in 0..row.len() {
            let value: Option<String> = row.try_get_unchecked(index).map_err(|e| {
                RunnerError::scan(format!("Failed to read column {index}: {e}"))
            })?;
            self.scan_column(value.as_deref().map(str::as_bytes));
        }
        Ok(())
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing has been scanned since the last [`init`](Self::init).
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in scan order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Values joined for a single log line.
    pub fn joined(&self) -> String {
        self.values.join(", ")
    }
}

/// Values rendered as a comma-joined list of quoted SQL literals.
///
/// Usable as a bound query argument, e.g. for an ad hoc `IN (...)` filter
/// built from a previous query's output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamList {
    values: Vec<String>,
}

impl ParamList {
    /// Builds a list from raw driver values.
    pub fn from_raw<'a>(raw: impl IntoIterator<Item = Option<&'a [u8]>>) -> Self {
        Self {
            values: raw.into_iter().map(text_value).collect(),
        }
    }

    /// Appends `'v1','v2',...` to `dst`. An empty list leaves `dst` untouched.
    pub fn append_value(&self, dst: &mut Vec<u8>) {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                dst.push(b',');
            }
            append_literal(dst, value);
        }
    }

    /// The rendered list as a string.
    pub fn to_literal(&self) -> String {
        let mut dst = Vec::new();
        self.append_value(&mut dst);
        // Only whole UTF-8 strings and ASCII quotes are ever written.
        String::from_utf8_lossy(&dst).into_owned()
    }
}

impl From<ResultRow> for ParamList {
    fn from(row: ResultRow) -> Self {
        Self { values: row.values }
    }
}

fn append_literal(dst: &mut Vec<u8>, value: &str) {
    dst.push(b'\'');
    for byte in value.bytes() {
        match byte {
            b'\'' => dst.extend_from_slice(b"''"),
            0 => {}
            b => dst.push(b),
        }
    }
    dst.push(b'\'');
}

impl sqlx::Type<Postgres> for ParamList {
    fn type_info() -> PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'q> sqlx::Encode<'q, Postgres> for ParamList {
    fn encode_by_ref(
        &self,
        buf: &mut PgArgumentBuffer,
    ) -> std::result::Result<IsNull, BoxDynError> {
        let literal = self.to_literal();
        <String as sqlx::Encode<'q, Postgres>>::encode_by_ref(&literal, buf)
    }
}
