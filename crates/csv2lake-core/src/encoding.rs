// Parquet encode/decode for table data files
//
// Snappy compression, dictionary encoding, page statistics. Row group size
// comes from StorageConfig and is fixed per writer.

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::{EnabledStatistics, WriterProperties};

use crate::error::Result;

fn writer_properties(row_group_size: usize) -> WriterProperties {
    WriterProperties::builder()
        .set_dictionary_enabled(true)
        .set_statistics_enabled(EnabledStatistics::Page)
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(row_group_size)
        .build()
}

/// Encode a single batch into an in-memory Parquet file.
pub(crate) fn encode_batch(batch: &RecordBatch, row_group_size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(
        &mut buf,
        batch.schema(),
        Some(writer_properties(row_group_size)),
    )?;
    writer.write(batch)?;
    writer.close()?;
    Ok(buf)
}

/// Decode a Parquet file into its Arrow schema and batches.
pub(crate) fn decode_file(data: Bytes) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    Ok((schema, batches))
}

/// Read only the Arrow schema from a Parquet file footer.
pub(crate) fn read_file_schema(data: Bytes) -> Result<SchemaRef> {
    Ok(ParquetRecordBatchReaderBuilder::try_new(data)?
        .schema()
        .clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn sample_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("customer", DataType::Utf8, true),
            Field::new("total", DataType::Int64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["Alice", "Bob"])),
                Arc::new(Int64Array::from(vec![100, 600])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn encode_decode_preserves_rows_and_schema() {
        let batch = sample_batch();
        let bytes = encode_batch(&batch, 32 * 1024).unwrap();

        let (schema, batches) = decode_file(Bytes::from(bytes)).unwrap();
        assert_eq!(schema.as_ref(), batch.schema().as_ref());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 2);
        let totals = batches[0]
            .column(1)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(totals.values().to_vec(), vec![100, 600]);
    }

    #[test]
    fn footer_schema_matches_batch_schema() {
        let batch = sample_batch();
        let bytes = encode_batch(&batch, 32 * 1024).unwrap();
        let schema = read_file_schema(Bytes::from(bytes)).unwrap();
        assert_eq!(schema.as_ref(), batch.schema().as_ref());
    }
}
