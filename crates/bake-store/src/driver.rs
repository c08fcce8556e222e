//! Statement execution over two driver shapes.
//!
//! SQLite can be consumed through single-row / all-rows accessors or by
//! stepping a cursor row by row. Both conventions are wrapped behind
//! [`StatementDriver`] so that callers only ever see [`Row`]s.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rusqlite::{Connection, Statement, params_from_iter};

use crate::StoreError;

pub use rusqlite::types::Value as SqlValue;

/// Which access convention a [`StatementDriver`] uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverKind {
    /// Single-row / all-rows accessor methods (build host).
    Accessor,
    /// Explicit cursor stepping (runtime host).
    Cursor,
}

/// A result row with named columns.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row from column names and values (same length).
    #[must_use]
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Column names in select order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Value of a column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    /// Text value of a column (`None` for NULL or non-text values).
    #[must_use]
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.get(column)? {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Raw bytes of a text or blob column.
    #[must_use]
    pub fn bytes(&self, column: &str) -> Option<&[u8]> {
        match self.get(column)? {
            SqlValue::Text(s) => Some(s.as_bytes()),
            SqlValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Integer value of a column.
    #[must_use]
    pub fn integer(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            SqlValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to a JSON object keyed by column name.
    ///
    /// Blobs are base64 encoded.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(name, value)| (name.clone(), sql_to_json(value)))
            .collect();
        serde_json::Value::Object(map)
    }
}

fn sql_to_json(value: &SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Integer(i) => serde_json::Value::from(*i),
        SqlValue::Real(f) => serde_json::Number::from_f64(*f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        SqlValue::Text(s) => serde_json::Value::String(s.clone()),
        SqlValue::Blob(b) => serde_json::Value::String(BASE64.encode(b)),
    }
}

/// One statement-execution interface over a SQLite connection.
pub trait StatementDriver: Send {
    /// Access convention of this driver.
    fn kind(&self) -> DriverKind;

    /// Execute a statement, returning the number of changed rows.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize, StoreError>;

    /// Execute several `;`-separated statements without parameters.
    fn execute_batch(&self, sql: &str) -> Result<(), StoreError>;

    /// Fetch the first row, if any.
    fn fetch_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>, StoreError>;

    /// Fetch every row.
    fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StoreError>;
}

fn column_names(stmt: &Statement<'_>) -> Arc<[String]> {
    stmt.column_names().into_iter().map(str::to_owned).collect()
}

fn read_values(row: &rusqlite::Row<'_>, count: usize) -> rusqlite::Result<Vec<SqlValue>> {
    (0..count).map(|i| row.get::<_, SqlValue>(i)).collect()
}

/// Driver using `query_row` / `query_map` accessors with cached statements.
pub struct AccessorDriver {
    conn: Connection,
}

impl AccessorDriver {
    /// Wrap a connection.
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

impl StatementDriver for AccessorDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Accessor
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize, StoreError> {
        Ok(self.conn.execute(sql, params_from_iter(params))?)
    }

    fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        Ok(self.conn.execute_batch(sql)?)
    }

    fn fetch_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>, StoreError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let columns = column_names(&stmt);
        let count = columns.len();
        match stmt.query_row(params_from_iter(params), |row| read_values(row, count)) {
            Ok(values) => Ok(Some(Row::new(columns, values))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StoreError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let columns = column_names(&stmt);
        let count = columns.len();
        let rows = stmt
            .query_map(params_from_iter(params), |row| read_values(row, count))?
            .map(|values| values.map(|v| Row::new(Arc::clone(&columns), v)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Driver stepping a cursor with `Rows::next`.
pub struct CursorDriver {
    conn: Connection,
}

impl CursorDriver {
    /// Wrap a connection.
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

impl StatementDriver for CursorDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Cursor
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let changed = stmt.execute(params_from_iter(params))?;
        Ok(changed)
    }

    fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        Ok(self.conn.execute_batch(sql)?)
    }

    fn fetch_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = column_names(&stmt);
        let count = columns.len();
        let mut cursor = stmt.query(params_from_iter(params))?;
        let first = match cursor.next()? {
            Some(row) => Some(read_values(row, count)?),
            None => None,
        };
        Ok(first.map(|values| Row::new(columns, values)))
    }

    fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = column_names(&stmt);
        let count = columns.len();
        let mut cursor = stmt.query(params_from_iter(params))?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.next()? {
            rows.push(Row::new(Arc::clone(&columns), read_values(row, count)?));
        }
        Ok(rows)
    }
}

/// Wrap a connection in the driver for `kind`.
pub(crate) fn driver_for(kind: DriverKind, conn: Connection) -> Box<dyn StatementDriver> {
    match kind {
        DriverKind::Accessor => Box::new(AccessorDriver::new(conn)),
        DriverKind::Cursor => Box::new(CursorDriver::new(conn)),
    }
}
