// Lazy table scans
//
// `TableReader::scan` does no I/O. It returns a plan object; filter/select/
// sort calls append operation descriptors, and the terminal `collect` resolves
// the latest snapshot and executes the plan in one pass. The view reflects the
// table's state at collect time, not at scan construction time.

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, Scalar, StringArray,
};
use arrow::compute::kernels::cmp;
use arrow::compute::{self, SortOptions};
use arrow::datatypes::{DataType, Schema};
use opendal::Operator;
use std::sync::Arc;
use tracing::debug;

use csv2lake_config::StorageConfig;

use crate::encoding;
use crate::error::{LakeError, Result};
use crate::log::{latest_commit, table_root};
use crate::schema;
use crate::storage::build_operator;

/// Comparison operators for scan predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Typed scalar a column is compared against. Cast to the column's type
/// before evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
}

impl ScalarValue {
    fn to_array(&self) -> ArrayRef {
        match self {
            ScalarValue::Int64(v) => Arc::new(Int64Array::from(vec![*v])),
            ScalarValue::Float64(v) => Arc::new(Float64Array::from(vec![*v])),
            ScalarValue::Utf8(v) => Arc::new(StringArray::from(vec![v.as_str()])),
            ScalarValue::Boolean(v) => Arc::new(BooleanArray::from(vec![*v])),
        }
    }

    /// Cast the literal to the target type. None when the cast has no
    /// representation there (e.g. a non-numeric string against an integer
    /// column), which callers must reject rather than compare against null.
    fn to_scalar(&self, target: &DataType) -> Result<Option<Scalar<ArrayRef>>> {
        let array = self.to_array();
        if array.data_type() == target {
            return Ok(Some(Scalar::new(array)));
        }
        let cast = compute::cast(&array, target)?;
        if cast.is_null(0) {
            return Ok(None);
        }
        Ok(Some(Scalar::new(cast)))
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int64(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Int64(v as i64)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float64(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Utf8(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Utf8(v)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Boolean(v)
    }
}

/// A single column-vs-scalar comparison.
#[derive(Debug, Clone)]
pub struct Predicate {
    column: String,
    op: CmpOp,
    value: ScalarValue,
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: CmpOp, value: impl Into<ScalarValue>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::new(column, CmpOp::Eq, value)
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::new(column, CmpOp::NotEq, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::new(column, CmpOp::Lt, value)
    }

    pub fn lt_eq(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::new(column, CmpOp::LtEq, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::new(column, CmpOp::Gt, value)
    }

    pub fn gt_eq(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::new(column, CmpOp::GtEq, value)
    }
}

#[derive(Debug, Clone)]
enum ScanOp {
    Filter(Predicate),
    Select(Vec<String>),
    Sort { column: String, descending: bool },
}

/// Opens lazy scans over lake tables.
#[derive(Clone)]
pub struct TableReader {
    op: Operator,
    prefix: String,
}

impl TableReader {
    /// Build a reader (and its own operator handle) from storage config.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        Ok(Self {
            op: build_operator(config)?,
            prefix: config.prefix.clone(),
        })
    }

    /// Build a reader over an existing operator (tests, shared handles).
    pub fn from_operator(op: Operator, prefix: impl Into<String>) -> Self {
        Self {
            op,
            prefix: prefix.into(),
        }
    }

    /// Start a lazy scan. No I/O happens until `collect`; a missing table
    /// surfaces there, not here.
    pub fn scan(&self, table: &str) -> TableScan {
        TableScan {
            op: self.op.clone(),
            table: table.to_string(),
            root: table_root(&self.prefix, table),
            ops: Vec::new(),
        }
    }

    /// List logical table names under the configured prefix.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let prefix = self.prefix.trim_matches('/');
        let dir = if prefix.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", prefix)
        };

        let entries = match self.op.list(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut tables: Vec<String> = entries
            .iter()
            .filter(|e| e.metadata().is_dir())
            .map(|e| e.name().trim_end_matches('/').to_string())
            .filter(|name| !name.is_empty())
            .collect();
        tables.sort();
        Ok(tables)
    }
}

/// A deferred scan plan. Intermediate calls only append op descriptors.
#[derive(Clone)]
pub struct TableScan {
    op: Operator,
    table: String,
    root: String,
    ops: Vec<ScanOp>,
}

impl TableScan {
    /// Keep only rows matching the predicate.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.ops.push(ScanOp::Filter(predicate));
        self
    }

    /// Keep only the named columns, in the given order.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ops
            .push(ScanOp::Select(columns.into_iter().map(Into::into).collect()));
        self
    }

    /// Sort by a single column.
    pub fn sort(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.ops.push(ScanOp::Sort {
            column: column.into(),
            descending,
        });
        self
    }

    /// Materialize: resolve the latest snapshot, read its files, and run the
    /// composed plan in order.
    pub async fn collect(self) -> Result<RecordBatch> {
        let commit = latest_commit(&self.op, &self.root, &self.table)
            .await?
            .ok_or_else(|| LakeError::TableNotFound {
                table: self.table.clone(),
            })?;

        debug!(
            table = %self.table,
            version = commit.version,
            files = commit.files.len(),
            "materializing scan"
        );

        let mut schemas = Vec::new();
        let mut batches = Vec::new();
        for file in &commit.files {
            let data = self.op.read(&format!("{}{}", self.root, file)).await?.to_bytes();
            let (file_schema, file_batches) = encoding::decode_file(data)?;
            schemas.push(file_schema);
            batches.extend(file_batches);
        }

        if schemas.is_empty() {
            return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
        }

        let target = schema::merge_file_schemas(&self.table, &schemas)?;
        let conformed: Vec<RecordBatch> = batches
            .iter()
            .map(|b| schema::conform_batch(b, &target))
            .collect::<Result<_>>()?;
        let mut batch = compute::concat_batches(&target, &conformed)?;

        for op in &self.ops {
            batch = match op {
                ScanOp::Filter(predicate) => apply_filter(&self.table, &batch, predicate)?,
                ScanOp::Select(columns) => apply_select(&self.table, &batch, columns)?,
                ScanOp::Sort { column, descending } => {
                    apply_sort(&self.table, &batch, column, *descending)?
                }
            };
        }

        Ok(batch)
    }
}

fn column_index(table: &str, batch: &RecordBatch, column: &str) -> Result<usize> {
    batch
        .schema()
        .index_of(column)
        .map_err(|_| LakeError::ColumnNotFound {
            table: table.to_string(),
            column: column.to_string(),
        })
}

fn apply_filter(table: &str, batch: &RecordBatch, predicate: &Predicate) -> Result<RecordBatch> {
    let idx = column_index(table, batch, &predicate.column)?;
    let column = batch.column(idx);

    // Float literals against integer columns compare in f64 space; casting
    // the literal down would truncate it and change the result set.
    let target = if matches!(predicate.value, ScalarValue::Float64(_))
        && column.data_type().is_integer()
    {
        DataType::Float64
    } else {
        column.data_type().clone()
    };
    let column = if column.data_type() == &target {
        column.clone()
    } else {
        compute::cast(column, &target)?
    };
    let scalar = predicate.value.to_scalar(&target)?.ok_or_else(|| {
        LakeError::InvalidPredicate {
            table: table.to_string(),
            column: predicate.column.clone(),
            reason: format!("literal {:?} does not cast to {}", predicate.value, target),
        }
    })?;

    let mask: BooleanArray = match predicate.op {
        CmpOp::Eq => cmp::eq(&column, &scalar)?,
        CmpOp::NotEq => cmp::neq(&column, &scalar)?,
        CmpOp::Lt => cmp::lt(&column, &scalar)?,
        CmpOp::LtEq => cmp::lt_eq(&column, &scalar)?,
        CmpOp::Gt => cmp::gt(&column, &scalar)?,
        CmpOp::GtEq => cmp::gt_eq(&column, &scalar)?,
    };

    Ok(compute::filter_record_batch(batch, &mask)?)
}

fn apply_select(table: &str, batch: &RecordBatch, columns: &[String]) -> Result<RecordBatch> {
    let indices: Vec<usize> = columns
        .iter()
        .map(|c| column_index(table, batch, c))
        .collect::<Result<_>>()?;
    Ok(batch.project(&indices)?)
}

fn apply_sort(
    table: &str,
    batch: &RecordBatch,
    column: &str,
    descending: bool,
) -> Result<RecordBatch> {
    let idx = column_index(table, batch, column)?;
    let options = SortOptions {
        descending,
        nulls_first: false,
    };
    let indices = compute::sort_to_indices(batch.column(idx), Some(options), None)?;
    let columns = batch
        .columns()
        .iter()
        .map(|c| compute::take(c.as_ref(), &indices, None))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(RecordBatch::try_new(batch.schema(), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::AsArray;
    use arrow::datatypes::{Field, Int64Type};

    fn orders_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("customer", DataType::Utf8, true),
            Field::new("total", DataType::Int64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["Alice", "Bob", "Carol"])),
                Arc::new(Int64Array::from(vec![100, 600, 350])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn filter_compares_against_casted_scalar() {
        let batch = orders_batch();
        // i32 literal against an Int64 column
        let filtered = apply_filter("orders", &batch, &Predicate::gt("total", 300)).unwrap();
        assert_eq!(filtered.num_rows(), 2);

        // f64 literal against an Int64 column compares in f64 space
        let filtered =
            apply_filter("orders", &batch, &Predicate::lt_eq("total", 350.0)).unwrap();
        assert_eq!(filtered.num_rows(), 2);
    }

    #[test]
    fn float_literal_against_int_column_is_not_truncated() {
        let batch = orders_batch();
        // Truncating 100.5 to 100 would turn this into `total < 100` and
        // drop Alice's row.
        let filtered = apply_filter("orders", &batch, &Predicate::lt("total", 100.5)).unwrap();
        assert_eq!(filtered.num_rows(), 1);
        assert_eq!(
            filtered.column(1).as_primitive::<Int64Type>().value(0),
            100
        );
    }

    #[test]
    fn uncastable_literal_errors_instead_of_matching_nothing() {
        let batch = orders_batch();
        let err = apply_filter("orders", &batch, &Predicate::eq("total", "abc")).unwrap_err();
        assert!(matches!(err, LakeError::InvalidPredicate { .. }));
    }

    #[test]
    fn filter_unknown_column_errors() {
        let batch = orders_batch();
        let err = apply_filter("orders", &batch, &Predicate::eq("missing", 1)).unwrap_err();
        assert!(matches!(err, LakeError::ColumnNotFound { .. }));
    }

    #[test]
    fn select_projects_in_requested_order() {
        let batch = orders_batch();
        let projected =
            apply_select("orders", &batch, &["total".to_string(), "customer".to_string()])
                .unwrap();
        assert_eq!(projected.schema().field(0).name(), "total");
        assert_eq!(projected.schema().field(1).name(), "customer");
    }

    #[test]
    fn sort_orders_rows() {
        let batch = orders_batch();
        let sorted = apply_sort("orders", &batch, "total", true).unwrap();
        let totals: Vec<i64> = sorted
            .column(1)
            .as_primitive::<Int64Type>()
            .values()
            .to_vec();
        assert_eq!(totals, vec![600, 350, 100]);
    }

    #[test]
    fn string_predicate_matches_exactly() {
        let batch = orders_batch();
        let filtered = apply_filter("orders", &batch, &Predicate::eq("customer", "Bob")).unwrap();
        assert_eq!(filtered.num_rows(), 1);
        let customers = filtered.column(0).as_string::<i32>();
        assert_eq!(customers.value(0), "Bob");
    }
}
