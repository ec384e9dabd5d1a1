//! Error types for table storage operations
//!
//! Store errors are propagated verbatim with the failing operation's context
//! (table name, mode) attached; nothing is retried or reinterpreted here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LakeError {
    /// Logical table name failed validation
    #[error("invalid table name '{name}': {reason}")]
    InvalidTableName { name: String, reason: String },

    /// Write with ErrorIfExists mode hit an existing table
    #[error("table '{table}' already exists")]
    TableExists { table: String },

    /// Scan materialization against a table that was never written
    #[error("table '{table}' does not exist")]
    TableNotFound { table: String },

    /// Incoming schema conflicts with the existing table schema
    #[error("schema mismatch for table '{table}': {reason}")]
    SchemaMismatch { table: String, reason: String },

    /// Scan plan references a column the table does not have
    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Scan predicate literal cannot be compared against the column's type
    #[error("invalid predicate on '{table}.{column}': {reason}")]
    InvalidPredicate {
        table: String,
        column: String,
        reason: String,
    },

    /// Commit log entry could not be read or parsed
    #[error("corrupt commit log for table '{table}': {reason}")]
    CommitLog { table: String, reason: String },

    /// Storage backend configuration is unusable
    #[error("invalid storage configuration: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] opendal::Error),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

pub type Result<T> = std::result::Result<T, LakeError>;
