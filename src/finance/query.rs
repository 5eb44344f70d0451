//! Query tools over the transaction dataset
//!
//! - `get_metadata_from_table`: unique transaction types and categories
//! - `get_table_columns`: dataset column names
//! - `execute_sql`: run a query and return the rows as a text table
//!
//! `execute_sql` never fails the tool call: any problem comes back as
//! `"Error accessing data: <reason>"` so the SQL agent can correct itself.
//! Only a single statement is accepted and it runs with `PRAGMA query_only`
//! set, so the dataset cannot be modified through the tool.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Executor, Row, ValueRef};
use std::sync::Arc;
use tracing::debug;

use super::data::{TransactionData, TRANSACTIONS_TABLE};
use crate::error::Result;
use crate::tool::{Tool, ToolResult};

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Lists the unique `type` and `category` values.
#[derive(Debug, Clone)]
pub struct MetadataTool {
    data: Arc<TransactionData>,
}

impl MetadataTool {
    pub fn new(data: Arc<TransactionData>) -> Self {
        Self { data }
    }
}

#[async_trait]
impl Tool for MetadataTool {
    fn name(&self) -> &str {
        "get_metadata_from_table"
    }

    fn description(&self) -> &str {
        "Retrieve the unique values of the 'type' and 'category' columns of the transactions table."
    }

    fn parameters_schema(&self) -> Value {
        empty_object_schema()
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolResult> {
        let metadata = self.data.metadata().await?;
        Ok(ToolResult::success(serde_json::to_value(metadata)?))
    }
}

/// Lists the dataset's columns.
#[derive(Debug, Clone)]
pub struct ColumnsTool {
    data: Arc<TransactionData>,
}

impl ColumnsTool {
    pub fn new(data: Arc<TransactionData>) -> Self {
        Self { data }
    }
}

#[async_trait]
impl Tool for ColumnsTool {
    fn name(&self) -> &str {
        "get_table_columns"
    }

    fn description(&self) -> &str {
        "Retrieve the column names of the transactions table."
    }

    fn parameters_schema(&self) -> Value {
        empty_object_schema()
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolResult> {
        Ok(ToolResult::success(serde_json::json!(self.data.columns())))
    }
}

fn default_table() -> String {
    TRANSACTIONS_TABLE.to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteSqlArgs {
    /// SQLite query to run. Markdown ```sql fences are stripped.
    pub sql_query: String,
    /// Name under which the transactions are visible to the query.
    #[serde(default = "default_table")]
    pub table_name: String,
}

/// Runs SQL against the transaction dataset.
#[derive(Debug, Clone)]
pub struct ExecuteSqlTool {
    data: Arc<TransactionData>,
}

impl ExecuteSqlTool {
    pub fn new(data: Arc<TransactionData>) -> Self {
        Self { data }
    }

    /// Remove surrounding whitespace and Markdown code fences.
    pub fn clean_query(sql: &str) -> String {
        sql.trim()
            .replace("```sql", "")
            .replace("```", "")
            .trim()
            .to_string()
    }

    fn is_identifier(name: &str) -> bool {
        let mut chars = name.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    /// Run `sql` and render the result, or describe why it failed.
    pub async fn run(&self, sql: &str, table_name: &str) -> String {
        match self.try_run(sql, table_name).await {
            Ok(table) => table,
            Err(reason) => format!("Error accessing data: {reason}"),
        }
    }

    async fn try_run(&self, sql: &str, table_name: &str) -> std::result::Result<String, String> {
        if !Self::is_identifier(table_name) {
            return Err(format!("invalid table name '{table_name}'"));
        }
        let query = single_statement(&Self::clean_query(sql))?;

        let mut conn = self.data.pool().acquire().await.map_err(|e| e.to_string())?;
        // A previous call may have been cancelled before lifting the guard
        conn.execute("PRAGMA query_only = OFF")
            .await
            .map_err(|e| e.to_string())?;

        if table_name != TRANSACTIONS_TABLE {
            conn.execute(
                format!(
                    "CREATE VIEW IF NOT EXISTS {table_name} AS SELECT * FROM {TRANSACTIONS_TABLE}"
                )
                .as_str(),
            )
            .await
            .map_err(|e| e.to_string())?;
        }

        conn.execute("PRAGMA query_only = ON")
            .await
            .map_err(|e| e.to_string())?;
        let rows = sqlx::query(&query).fetch_all(&mut *conn).await;
        let columns = match &rows {
            Ok(rows) if rows.is_empty() => conn
                .describe(&query)
                .await
                .map(|d| d.columns().iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        conn.execute("PRAGMA query_only = OFF")
            .await
            .map_err(|e| e.to_string())?;

        let rows = rows.map_err(|e| e.to_string())?;
        debug!(rows = rows.len(), "Query executed");
        Ok(render_table(&rows, columns))
    }
}

#[async_trait]
impl Tool for ExecuteSqlTool {
    fn name(&self) -> &str {
        "execute_sql"
    }

    fn description(&self) -> &str {
        "Execute a SQLite query against the transactions table (columns: date, year, month, type, category, amount, description) and return the result as a text table."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(ExecuteSqlArgs).schema)
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult> {
        let args: ExecuteSqlArgs = serde_json::from_value(arguments)?;
        let output = self.run(&args.sql_query, &args.table_name).await;
        Ok(ToolResult::success(Value::String(output)))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Lexeme {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// The one statement in `sql`, without its trailing `;`.
///
/// SQLite runs every statement of a multi-statement string, which would let
/// a query lift `query_only` before writing. Semicolons inside literals,
/// quoted identifiers and comments do not count.
fn single_statement(sql: &str) -> std::result::Result<String, String> {
    let mut state = Lexeme::Code;
    let mut end: Option<usize> = None;
    let mut chars = sql.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);
        match state {
            Lexeme::Code => match c {
                '-' if next == Some('-') => state = Lexeme::LineComment,
                '/' if next == Some('*') => {
                    chars.next();
                    state = Lexeme::BlockComment;
                }
                ';' => {
                    end.get_or_insert(i);
                }
                c if end.is_some() && !c.is_whitespace() => {
                    return Err("only one SQL statement is allowed".to_string());
                }
                '\'' | '"' | '`' => state = Lexeme::Quoted(c),
                '[' => state = Lexeme::Quoted(']'),
                _ => {}
            },
            // A doubled quote is an escaped quote: leave and re-enter
            Lexeme::Quoted(close) if c == close => state = Lexeme::Code,
            Lexeme::Quoted(_) => {}
            Lexeme::LineComment if c == '\n' => state = Lexeme::Code,
            Lexeme::LineComment => {}
            Lexeme::BlockComment if c == '*' && next == Some('/') => {
                chars.next();
                state = Lexeme::Code;
            }
            Lexeme::BlockComment => {}
        }
    }

    let statement = sql[..end.unwrap_or(sql.len())].trim();
    if statement.is_empty() {
        return Err("empty query".to_string());
    }
    Ok(statement.to_string())
}

/// Render a float with at most six decimals and at least one.
fn format_float(value: f64) -> String {
    let mut s = format!("{value:.6}");
    while s.ends_with('0') && !s.ends_with(".0") {
        s.pop();
    }
    s
}

fn render_cell(row: &SqliteRow, idx: usize) -> String {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return "NULL".to_string(),
        Err(_) => return "?".to_string(),
        Ok(_) => {}
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return v.to_string();
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return format_float(v);
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return v;
    }
    "<blob>".to_string()
}

/// Aligned text table with a zero-based row index, for example:
///
/// ```text
///       category   total
/// 0    groceries  200.5
/// 1  electronics   89.0
/// ```
fn render_table(rows: &[SqliteRow], empty_columns: Vec<String>) -> String {
    let Some(first) = rows.first() else {
        return format!("Empty result\nColumns: [{}]", empty_columns.join(", "));
    };

    let headers: Vec<String> = first.columns().iter().map(|c| c.name().to_string()).collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| (0..headers.len()).map(|i| render_cell(row, i)).collect())
        .collect();

    let index_width = (rows.len() - 1).to_string().len();
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut lines = Vec::with_capacity(rows.len() + 1);
    let mut header = " ".repeat(index_width);
    for (h, w) in headers.iter().zip(&widths) {
        header.push_str(&format!("  {h:>w$}"));
    }
    lines.push(header);

    for (idx, row) in cells.iter().enumerate() {
        let mut line = format!("{idx:<index_width$}");
        for (cell, w) in row.iter().zip(&widths) {
            line.push_str(&format!("  {cell:>w$}"));
        }
        lines.push(line);
    }
    lines.join("\n")
}
