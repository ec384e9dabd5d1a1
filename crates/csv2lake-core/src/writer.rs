// Table writes
//
// One write call = encode the batch to a Parquet file, upload it, then commit
// a new snapshot. The commit is the last step, so a failed write leaves at
// worst an orphaned data file that no reader can see.

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use opendal::Operator;
use tracing::{debug, info};
use uuid::Uuid;

use csv2lake_config::StorageConfig;

use crate::encoding;
use crate::error::{LakeError, Result};
use crate::log::{latest_commit, table_root, write_commit, CommitEntry, CommitOperation};
use crate::schema;
use crate::storage::build_operator;

const DEFAULT_ROW_GROUP_SIZE: usize = 32 * 1024;

/// How a write interacts with an existing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Add rows to the existing table.
    Append,
    /// Replace the table contents with the new data.
    Overwrite,
    /// If the table already exists, do nothing.
    Ignore,
    /// If the table already exists, fail.
    ErrorIfExists,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Append => "append",
            WriteMode::Overwrite => "overwrite",
            WriteMode::Ignore => "ignore",
            WriteMode::ErrorIfExists => "error",
        }
    }
}

impl std::str::FromStr for WriteMode {
    type Err = LakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "append" => Ok(WriteMode::Append),
            "overwrite" => Ok(WriteMode::Overwrite),
            "ignore" => Ok(WriteMode::Ignore),
            "error" => Ok(WriteMode::ErrorIfExists),
            other => Err(LakeError::Config(format!(
                "unknown write mode '{}'; expected append, overwrite, ignore or error",
                other
            ))),
        }
    }
}

/// How to reconcile the incoming schema with an existing table's schema.
/// Absent means the store's default compatibility check applies: the write
/// fails if the schemas do not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaMode {
    /// Replace the existing schema. Only valid together with WriteMode::Overwrite.
    Overwrite,
    /// Union the existing and the incoming schema.
    Merge,
}

/// Writes record batches to lake tables. Stateless between calls; cheap to
/// clone and share.
#[derive(Clone)]
pub struct TableWriter {
    op: Operator,
    prefix: String,
    row_group_size: usize,
}

impl TableWriter {
    /// Build a writer (and its own operator handle) from storage config.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let op = build_operator(config)?;
        Ok(Self {
            op,
            prefix: config.prefix.clone(),
            row_group_size: config.parquet_row_group_size,
        })
    }

    /// Build a writer over an existing operator (tests, shared handles).
    pub fn from_operator(op: Operator, prefix: impl Into<String>) -> Self {
        Self {
            op,
            prefix: prefix.into(),
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    /// Write a batch to the logical table with the requested mode.
    pub async fn write(
        &self,
        batch: &RecordBatch,
        table: &str,
        mode: WriteMode,
        schema_mode: Option<SchemaMode>,
    ) -> Result<()> {
        validate_table_name(table)?;
        let root = table_root(&self.prefix, table);
        let existing = latest_commit(&self.op, &root, table).await?;

        let (version, operation, mut files, conformed) = match (&existing, mode) {
            (Some(_), WriteMode::Ignore) => {
                debug!(table, "table exists; ignore mode is a no-op");
                return Ok(());
            }
            (Some(_), WriteMode::ErrorIfExists) => {
                return Err(LakeError::TableExists {
                    table: table.to_string(),
                });
            }
            (Some(commit), WriteMode::Append) => {
                let conformed = self
                    .reconcile_schema(table, &root, commit, batch, mode, schema_mode)
                    .await?;
                (
                    commit.version + 1,
                    CommitOperation::Append,
                    commit.files.clone(),
                    conformed,
                )
            }
            (Some(commit), WriteMode::Overwrite) => {
                let conformed = self
                    .reconcile_schema(table, &root, commit, batch, mode, schema_mode)
                    .await?;
                (commit.version + 1, CommitOperation::Overwrite, Vec::new(), conformed)
            }
            (None, _) => (0, CommitOperation::Create, Vec::new(), None),
        };
        let batch = conformed.as_ref().unwrap_or(batch);

        let file_name = format!("part-{:05}-{}.parquet", version, Uuid::new_v4());
        let payload = encoding::encode_batch(batch, self.row_group_size)?;
        self.op.write(&format!("{}{}", root, file_name), payload).await?;
        files.push(file_name);

        let commit = CommitEntry {
            version,
            operation,
            files,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        };
        write_commit(&self.op, &root, table, &commit).await?;

        info!(
            table,
            mode = mode.as_str(),
            version,
            rows = batch.num_rows(),
            "committed write"
        );
        Ok(())
    }

    /// Check the incoming schema against the table's. Returns a replacement
    /// batch when the write must carry a different schema than the caller's.
    async fn reconcile_schema(
        &self,
        table: &str,
        root: &str,
        commit: &CommitEntry,
        batch: &RecordBatch,
        mode: WriteMode,
        schema_mode: Option<SchemaMode>,
    ) -> Result<Option<RecordBatch>> {
        match schema_mode {
            Some(SchemaMode::Overwrite) => {
                // Replacing the file set replaces the schema; nothing to check
                // beyond the mode pairing.
                if mode != WriteMode::Overwrite {
                    return Err(LakeError::SchemaMismatch {
                        table: table.to_string(),
                        reason: "schema overwrite requires the overwrite write mode".to_string(),
                    });
                }
                Ok(None)
            }
            Some(SchemaMode::Merge) => {
                if let Some(existing) = self.existing_schema(root, commit).await? {
                    schema::check_mergeable(table, &existing, batch.schema().as_ref())?;
                    if mode == WriteMode::Overwrite {
                        // An overwrite drops the old files, so the replacement
                        // file itself must carry the unioned schema. Columns
                        // the incoming batch lacks are null-padded.
                        let target =
                            schema::merge_file_schemas(table, &[existing, batch.schema()])?;
                        return Ok(Some(schema::conform_batch(batch, &target)?));
                    }
                }
                Ok(None)
            }
            None => {
                if let Some(existing) = self.existing_schema(root, commit).await? {
                    schema::check_compatible(table, &existing, batch.schema().as_ref())?;
                }
                Ok(None)
            }
        }
    }

    /// Schema of the current snapshot, read from the first data file's footer.
    async fn existing_schema(&self, root: &str, commit: &CommitEntry) -> Result<Option<SchemaRef>> {
        let Some(first) = commit.files.first() else {
            return Ok(None);
        };
        let data = self.op.read(&format!("{}{}", root, first)).await?.to_bytes();
        Ok(Some(encoding::read_file_schema(data)?))
    }
}

fn validate_table_name(table: &str) -> Result<()> {
    if table.is_empty() {
        return Err(LakeError::InvalidTableName {
            name: table.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}
