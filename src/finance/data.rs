//! Transaction dataset
//!
//! [`TransactionData`] owns the queryable copy of the user's transactions: a
//! JSON array of records, validated once at load time and copied into an
//! in-memory SQLite table named `transactions`. It is built at startup and
//! handed to the query tools explicitly; nothing else holds a connection.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

use crate::config::ValidationMode;
use crate::error::{AgentsError, Result};

/// Name of the table the dataset is loaded into.
pub const TRANSACTIONS_TABLE: &str = "transactions";

/// Columns of the dataset, in table order.
pub const COLUMNS: [&str; 7] = [
    "date",
    "year",
    "month",
    "type",
    "category",
    "amount",
    "description",
];

const MIN_YEAR: i64 = 1900;
const MAX_YEAR: i64 = 2026;

/// One transaction record as stored in the source file.
///
/// Fields are kept loose (`year` and `month` as plain integers, `type` as a
/// string) so that lenient loading can keep out-of-range records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: String,
    pub year: i64,
    pub month: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: String,
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
}

impl Transaction {
    fn parse_date(raw: &str) -> Option<NaiveDate> {
        let day = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }

    /// Every rule this record breaks.
    pub fn check(&self, row: usize) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut issue = |field: &'static str, message: String| {
            issues.push(ValidationIssue { row, field, message });
        };

        if Self::parse_date(&self.date).is_none() {
            issue("date", format!("'{}' is not a YYYY-MM-DD date", self.date));
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&self.year) {
            issue("year", format!("{} is outside {MIN_YEAR}..={MAX_YEAR}", self.year));
        }
        if !(1..=12).contains(&self.month) {
            issue("month", format!("{} is outside 1..=12", self.month));
        }
        if self.kind != "credit" && self.kind != "debit" {
            issue("type", format!("'{}' is neither credit nor debit", self.kind));
        }
        if self.category.trim().is_empty() {
            issue("category", "must not be empty".to_string());
        }
        if !self.amount.is_finite() {
            issue("amount", format!("{} is not a finite number", self.amount));
        }
        issues
    }
}

/// A rule broken by one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Zero-based position in the source array.
    pub row: usize,
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}: {}", self.row, self.field, self.message)
    }
}

/// Unique values of the categorical columns, in first-appearance order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub types: Vec<String>,
    pub categories: Vec<String>,
}

/// Validated, queryable transaction data.
pub struct TransactionData {
    pool: Pool<Sqlite>,
    row_count: usize,
    validated: bool,
    issues: Vec<ValidationIssue>,
}

impl TransactionData {
    /// Load and validate a JSON file.
    pub async fn from_path(path: impl AsRef<Path>, mode: ValidationMode) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| AgentsError::InvalidDataset {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        info!(path = %path.display(), ?mode, "Loading transactions");
        Self::from_json_str(&raw, mode).await
    }

    /// Load and validate a JSON array of records.
    pub async fn from_json_str(raw: &str, mode: ValidationMode) -> Result<Self> {
        let records: Vec<Transaction> =
            serde_json::from_str(raw).map_err(|e| AgentsError::InvalidDataset {
                message: format!("malformed transactions file: {e}"),
            })?;
        Self::from_records(records, mode).await
    }

    /// Validate `records` under `mode` and load them into SQLite.
    pub async fn from_records(records: Vec<Transaction>, mode: ValidationMode) -> Result<Self> {
        let issues: Vec<ValidationIssue> = records
            .iter()
            .enumerate()
            .flat_map(|(row, record)| record.check(row))
            .collect();

        if !issues.is_empty() {
            match mode {
                ValidationMode::Strict => {
                    return Err(AgentsError::InvalidDataset {
                        message: issues[0].to_string(),
                    });
                }
                ValidationMode::Lenient => {
                    for issue in &issues {
                        warn!(%issue, "Transaction failed validation");
                    }
                    warn!(
                        count = issues.len(),
                        "Continuing with unvalidated transactions"
                    );
                }
            }
        }

        let pool = Self::open_pool().await?;
        Self::load(&pool, &records).await.map_err(|e| AgentsError::InvalidDataset {
            message: format!("cannot load transactions: {e}"),
        })?;

        Ok(Self {
            pool,
            row_count: records.len(),
            validated: issues.is_empty(),
            issues,
        })
    }

    async fn open_pool() -> Result<Pool<Sqlite>> {
        let options: SqliteConnectOptions = "sqlite::memory:".parse()?;
        // A single connection that never expires: the data lives in it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(pool)
    }

    async fn load(pool: &Pool<Sqlite>, records: &[Transaction]) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE transactions (
                date TEXT NOT NULL,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                type TEXT NOT NULL,
                category TEXT NOT NULL,
                amount REAL NOT NULL,
                description TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        let mut tx = pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO transactions (date, year, month, type, category, amount, description)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.date)
            .bind(record.year)
            .bind(record.month)
            .bind(&record.kind)
            .bind(&record.category)
            .bind(record.amount)
            .bind(&record.description)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn columns(&self) -> Vec<String> {
        COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// `false` when the dataset was loaded leniently despite issues.
    pub fn is_validated(&self) -> bool {
        self.validated
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Unique transaction types and categories.
    pub async fn metadata(&self) -> Result<TableMetadata> {
        let types = sqlx::query(
            "SELECT type FROM transactions GROUP BY type ORDER BY MIN(rowid)",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| row.get::<String, _>("type"))
        .collect();

        let categories = sqlx::query(
            "SELECT category FROM transactions GROUP BY category ORDER BY MIN(rowid)",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| row.get::<String, _>("category"))
        .collect();

        Ok(TableMetadata { types, categories })
    }
}

impl fmt::Debug for TransactionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionData")
            .field("row_count", &self.row_count)
            .field("validated", &self.validated)
            .field("issues", &self.issues.len())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_load_valid_dataset() {
        let data = TransactionData::from_json_str(fixtures::SAMPLE, ValidationMode::Strict)
            .await
            .unwrap();
        assert_eq!(data.row_count(), 5);
        assert!(data.is_validated());
        assert!(data.issues().is_empty());
        assert_eq!(data.columns().len(), 7);

        let metadata = data.metadata().await.unwrap();
        assert_eq!(metadata.types, vec!["debit", "credit"]);
        assert_eq!(
            metadata.categories,
            vec!["groceries", "salary", "entertainment"]
        );
    }

    fn bad_record() -> Transaction {
        Transaction {
            date: "yesterday".to_string(),
            year: 2031,
            month: 13,
            kind: "refund".to_string(),
            category: " ".to_string(),
            amount: 1.0,
            description: None,
        }
    }

    #[test]
    fn test_record_checks() {
        let issues = bad_record().check(7);
        let fields: Vec<&str> = issues.iter().map(|i| i.field).collect();
        assert_eq!(fields, vec!["date", "year", "month", "type", "category"]);
        assert_eq!(issues[1].to_string(), "row 7: year: 2031 is outside 1900..=2026");
    }

    #[tokio::test]
    async fn test_strict_mode_rejects() {
        let err = TransactionData::from_records(vec![bad_record()], ValidationMode::Strict)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentsError::InvalidDataset { .. }));
    }

    #[tokio::test]
    async fn test_lenient_mode_flags_and_keeps_rows() {
        let data = TransactionData::from_records(vec![bad_record()], ValidationMode::Lenient)
            .await
            .unwrap();
        assert!(!data.is_validated());
        assert_eq!(data.issues().len(), 5);
        assert_eq!(data.row_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let err = TransactionData::from_json_str("{\"not\": \"an array\"}", ValidationMode::Lenient)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentsError::InvalidDataset { .. }));
    }
}
