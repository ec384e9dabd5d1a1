// csv2lake-ingest - CSV uploads into lake tables
//
// Takes raw CSV bytes, sanitizes the caller-supplied table name, decodes the
// CSV with schema inference, and persists it with OVERWRITE or ERROR mode
// depending on the caller's flag. Returns row count and columns on success.

use arrow::array::RecordBatch;
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

use csv2lake_core::{LakeError, TableWriter, WriteMode};

#[derive(Debug, Error)]
pub enum IngestError {
    /// Sanitized name is not a valid identifier
    #[error("invalid table name '{name}': must be alphanumeric with underscores")]
    InvalidTableName { name: String },

    /// Uploaded CSV was empty or had no data rows
    #[error("uploaded CSV is empty or could not be parsed")]
    EmptyCsv,

    /// Payload exceeds the configured limit
    #[error("payload of {actual} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { actual: usize, limit: usize },

    #[error("CSV decode error: {0}")]
    Csv(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Lake(#[from] LakeError),
}

/// Knobs for a single ingest call.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Replace an existing table instead of failing on collision.
    pub overwrite: bool,
    /// Append the current date (yyyymmdd) to the table name.
    pub date_suffix: bool,
    /// Reject payloads larger than this many bytes, if set.
    pub max_payload_bytes: Option<usize>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            date_suffix: true,
            max_payload_bytes: None,
        }
    }
}

/// Outcome of a successful ingest.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Final (sanitized, possibly date-suffixed) table name.
    pub table: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub elapsed_seconds: f64,
}

/// Convert a user-supplied table name into a safe storage identifier.
pub fn sanitize_table_name(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '-'], "_")
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let leading_ok = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic());
    leading_ok && name.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Decode CSV bytes into a single record batch, inferring the schema from the
/// content. A header row is required.
pub fn read_csv(data: &[u8]) -> Result<RecordBatch, IngestError> {
    let format = Format::default().with_header(true);

    let mut cursor = Cursor::new(data);
    let (schema, _) = format.infer_schema(&mut cursor, None)?;
    cursor.set_position(0);

    let reader = ReaderBuilder::new(Arc::new(schema))
        .with_format(format)
        .build(cursor)?;
    let batches = reader.collect::<Result<Vec<_>, _>>()?;

    let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    if batches.is_empty() || total_rows == 0 {
        return Err(IngestError::EmptyCsv);
    }

    let schema = batches[0].schema();
    Ok(arrow::compute::concat_batches(&schema, &batches)?)
}

/// Ingest CSV bytes as a lake table.
pub async fn ingest_csv(
    writer: &TableWriter,
    data: &[u8],
    table_name: &str,
    options: &IngestOptions,
) -> Result<IngestReport, IngestError> {
    let start = Instant::now();

    if let Some(limit) = options.max_payload_bytes {
        if data.len() > limit {
            return Err(IngestError::PayloadTooLarge {
                actual: data.len(),
                limit,
            });
        }
    }

    let sanitized = sanitize_table_name(table_name);
    if !is_valid_identifier(&sanitized) {
        return Err(IngestError::InvalidTableName { name: sanitized });
    }

    let table = if options.date_suffix {
        format!("{}_{}", sanitized, chrono::Utc::now().format("%Y%m%d"))
    } else {
        sanitized
    };

    let batch = read_csv(data)?;
    let mode = if options.overwrite {
        WriteMode::Overwrite
    } else {
        WriteMode::ErrorIfExists
    };

    writer.write(&batch, &table, mode, None).await?;

    let report = IngestReport {
        table,
        rows: batch.num_rows(),
        columns: batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect(),
        elapsed_seconds: start.elapsed().as_secs_f64(),
    };
    info!(
        table = %report.table,
        rows = report.rows,
        "ingested CSV upload"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use csv2lake_core::{Operator, Predicate, TableReader};

    fn memory_writer_reader() -> (TableWriter, TableReader) {
        let op = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        (
            TableWriter::from_operator(op.clone(), "lake"),
            TableReader::from_operator(op, "lake"),
        )
    }

    const ORDERS_CSV: &[u8] = b"customer,total\nAlice,100\nBob,600\n";

    #[test]
    fn sanitize_lowercases_and_replaces_separators() {
        assert_eq!(sanitize_table_name("My Table-Name"), "my_table_name");
        assert_eq!(sanitize_table_name("  orders "), "orders");
        assert_eq!(sanitize_table_name("UPLOADED_DATA"), "uploaded_data");
    }

    #[test]
    fn identifier_validation_rejects_leading_digits_and_symbols() {
        assert!(is_valid_identifier("orders_2024"));
        assert!(is_valid_identifier("_private"));
        assert!(!is_valid_identifier("2024_orders"));
        assert!(!is_valid_identifier("orders!"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn read_csv_infers_column_types() {
        let batch = read_csv(ORDERS_CSV).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(0).name(), "customer");
        assert_eq!(
            batch.schema().field(1).data_type(),
            &arrow::datatypes::DataType::Int64
        );
    }

    #[test]
    fn read_csv_rejects_header_only_input() {
        assert!(matches!(
            read_csv(b"customer,total\n"),
            Err(IngestError::EmptyCsv)
        ));
    }

    #[tokio::test]
    async fn ingest_writes_table_and_reports_shape() {
        let (writer, reader) = memory_writer_reader();
        let options = IngestOptions {
            date_suffix: false,
            ..Default::default()
        };

        let report = ingest_csv(&writer, ORDERS_CSV, "Uploaded Data", &options)
            .await
            .unwrap();
        assert_eq!(report.table, "uploaded_data");
        assert_eq!(report.rows, 2);
        assert_eq!(report.columns, vec!["customer", "total"]);

        let result = reader
            .scan("uploaded_data")
            .filter(Predicate::gt("total", 300))
            .collect()
            .await
            .unwrap();
        assert_eq!(result.num_rows(), 1);
    }

    #[tokio::test]
    async fn ingest_respects_error_mode_on_collision() {
        let (writer, _) = memory_writer_reader();
        let options = IngestOptions {
            overwrite: false,
            date_suffix: false,
            ..Default::default()
        };

        ingest_csv(&writer, ORDERS_CSV, "orders", &options)
            .await
            .unwrap();
        let err = ingest_csv(&writer, ORDERS_CSV, "orders", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Lake(LakeError::TableExists { .. })));
    }

    #[tokio::test]
    async fn ingest_rejects_invalid_names_and_oversized_payloads() {
        let (writer, _) = memory_writer_reader();

        let err = ingest_csv(&writer, ORDERS_CSV, "123 bad", &IngestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidTableName { .. }));

        let tiny_limit = IngestOptions {
            max_payload_bytes: Some(4),
            ..Default::default()
        };
        let err = ingest_csv(&writer, ORDERS_CSV, "orders", &tiny_limit)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::PayloadTooLarge { .. }));
    }
}
