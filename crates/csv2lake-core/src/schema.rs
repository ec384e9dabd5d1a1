// Schema reconciliation
//
// Write-time checks (default compatibility, merge) and the read-time merge
// that unions file schemas and null-pads columns a file never had.

use arrow::array::{new_null_array, ArrayRef, RecordBatch};
use arrow::datatypes::{Field, Schema, SchemaRef};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{LakeError, Result};

fn column_types(schema: &Schema) -> BTreeMap<&str, &arrow::datatypes::DataType> {
    schema
        .fields()
        .iter()
        .map(|f| (f.name().as_str(), f.data_type()))
        .collect()
}

fn column_names(schema: &Schema) -> Vec<&str> {
    schema.fields().iter().map(|f| f.name().as_str()).collect()
}

/// Default compatibility check: same column names and types. Column order is
/// not significant; the commit log tracks files, not column positions.
pub(crate) fn check_compatible(table: &str, existing: &Schema, incoming: &Schema) -> Result<()> {
    if column_types(existing) != column_types(incoming) {
        return Err(LakeError::SchemaMismatch {
            table: table.to_string(),
            reason: format!(
                "existing columns {:?} are incompatible with incoming columns {:?}; \
                 pass a schema mode to merge or overwrite",
                column_names(existing),
                column_names(incoming)
            ),
        });
    }
    Ok(())
}

/// Merge check for SchemaMode::Merge: the union of both schemas must be
/// well-formed (no same-named column with conflicting types).
pub(crate) fn check_mergeable(table: &str, existing: &Schema, incoming: &Schema) -> Result<()> {
    Schema::try_merge(vec![existing.clone(), incoming.clone()]).map_err(|e| {
        LakeError::SchemaMismatch {
            table: table.to_string(),
            reason: e.to_string(),
        }
    })?;
    Ok(())
}

/// Union of the file schemas of a table snapshot. A column missing from any
/// file is forced nullable so its rows can be null-padded at read time.
pub(crate) fn merge_file_schemas(table: &str, schemas: &[SchemaRef]) -> Result<SchemaRef> {
    let merged = Schema::try_merge(schemas.iter().map(|s| s.as_ref().clone())).map_err(|e| {
        LakeError::SchemaMismatch {
            table: table.to_string(),
            reason: e.to_string(),
        }
    })?;

    let fields: Vec<Field> = merged
        .fields()
        .iter()
        .map(|field| {
            let in_every_file = schemas
                .iter()
                .all(|s| s.field_with_name(field.name()).is_ok());
            if in_every_file {
                field.as_ref().clone()
            } else {
                field.as_ref().clone().with_nullable(true)
            }
        })
        .collect();

    Ok(Arc::new(Schema::new(fields)))
}

/// Reorder a batch's columns to the target schema, null-padding columns the
/// batch does not have.
pub(crate) fn conform_batch(batch: &RecordBatch, target: &SchemaRef) -> Result<RecordBatch> {
    let source = batch.schema();
    let columns: Vec<ArrayRef> = target
        .fields()
        .iter()
        .map(|field| match source.index_of(field.name()) {
            Ok(idx) => batch.column(idx).clone(),
            Err(_) => new_null_array(field.data_type(), batch.num_rows()),
        })
        .collect();

    Ok(RecordBatch::try_new(target.clone(), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array};
    use arrow::datatypes::DataType;

    fn schema(fields: &[(&str, DataType)]) -> SchemaRef {
        Arc::new(Schema::new(
            fields
                .iter()
                .map(|(name, dt)| Field::new(*name, dt.clone(), true))
                .collect::<Vec<_>>(),
        ))
    }

    #[test]
    fn compatible_ignores_column_order() {
        let a = schema(&[("x", DataType::Int64), ("y", DataType::Utf8)]);
        let b = schema(&[("y", DataType::Utf8), ("x", DataType::Int64)]);
        assert!(check_compatible("t", &a, &b).is_ok());
    }

    #[test]
    fn incompatible_on_extra_or_retyped_column() {
        let a = schema(&[("x", DataType::Int64)]);
        let extra = schema(&[("x", DataType::Int64), ("y", DataType::Utf8)]);
        let retyped = schema(&[("x", DataType::Float64)]);
        assert!(check_compatible("t", &a, &extra).is_err());
        assert!(check_compatible("t", &a, &retyped).is_err());
    }

    #[test]
    fn mergeable_allows_new_columns_but_not_conflicts() {
        let a = schema(&[("x", DataType::Int64)]);
        let wider = schema(&[("x", DataType::Int64), ("y", DataType::Utf8)]);
        let conflict = schema(&[("x", DataType::Utf8)]);
        assert!(check_mergeable("t", &a, &wider).is_ok());
        assert!(check_mergeable("t", &a, &conflict).is_err());
    }

    #[test]
    fn merged_schema_forces_partial_columns_nullable() {
        let narrow = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
        let wide = Arc::new(Schema::new(vec![
            Field::new("x", DataType::Int64, false),
            Field::new("y", DataType::Utf8, false),
        ]));
        let merged = merge_file_schemas("t", &[narrow, wide]).unwrap();
        assert!(!merged.field_with_name("x").unwrap().is_nullable());
        assert!(merged.field_with_name("y").unwrap().is_nullable());
    }

    #[test]
    fn conform_null_pads_missing_columns() {
        let narrow = schema(&[("x", DataType::Int64)]);
        let batch = RecordBatch::try_new(
            narrow,
            vec![Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef],
        )
        .unwrap();

        let target = schema(&[("x", DataType::Int64), ("y", DataType::Utf8)]);
        let conformed = conform_batch(&batch, &target).unwrap();
        assert_eq!(conformed.num_columns(), 2);
        assert_eq!(conformed.column(1).null_count(), 2);
    }
}
