// Central-bank series decoding
//
// The SGS CSV export uses ';' as separator, dd/mm/yyyy dates and
// decimal commas:
//
//   data;valor
//   02/01/2024;4,85
//
// Rate series become (date, currency, rate); the monthly inflation series
// becomes (month_date, monthly_inflation) with dates pinned to the first of
// the month.

use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, Date32Array, Float64Array, RecordBatch, StringArray};
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use chrono::NaiveDate;
use std::io::Cursor;
use std::sync::Arc;

pub(crate) const DATE_FORMAT: &str = "%d/%m/%Y";

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

pub(crate) fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

pub(crate) fn date_from_days(days: i32) -> NaiveDate {
    epoch() + chrono::Duration::days(days as i64)
}

/// Read a raw SGS CSV export into (date, value) pairs.
fn read_series(data: &[u8]) -> Result<Vec<(NaiveDate, f64)>> {
    let format = Format::default().with_header(true).with_delimiter(b';');

    let mut cursor = Cursor::new(data);
    let (schema, _) = format
        .infer_schema(&mut cursor, None)
        .context("Failed to infer schema of series CSV")?;
    anyhow::ensure!(
        schema.fields().len() >= 2,
        "series CSV must have a date and a value column, got {} columns",
        schema.fields().len()
    );
    cursor.set_position(0);

    let reader = ReaderBuilder::new(Arc::new(schema))
        .with_format(format)
        .build(cursor)?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.context("Failed to decode series CSV")?;
        let dates = string_column(&batch, 0)?;
        for idx in 0..batch.num_rows() {
            let date = NaiveDate::parse_from_str(&dates[idx], DATE_FORMAT)
                .with_context(|| format!("Invalid series date '{}'", dates[idx]))?;
            let value = value_at(&batch, 1, idx)?;
            rows.push((date, value));
        }
    }

    anyhow::ensure!(!rows.is_empty(), "series CSV has no data rows");
    Ok(rows)
}

fn string_column(batch: &RecordBatch, idx: usize) -> Result<Vec<String>> {
    let column = batch.column(idx);
    let strings = arrow::compute::cast(column, &DataType::Utf8)?;
    let strings = strings
        .as_any()
        .downcast_ref::<StringArray>()
        .context("series column did not cast to strings")?;
    Ok((0..strings.len())
        .map(|i| strings.value(i).to_string())
        .collect())
}

/// Numeric cell value, tolerating both decimal commas (Utf8 column) and
/// already-numeric columns.
fn value_at(batch: &RecordBatch, idx: usize, row: usize) -> Result<f64> {
    let column = batch.column(idx);
    match column.data_type() {
        DataType::Utf8 => {
            let strings = column
                .as_any()
                .downcast_ref::<StringArray>()
                .context("expected a string column")?;
            let raw = strings.value(row).trim().replace(',', ".");
            raw.parse::<f64>()
                .with_context(|| format!("Invalid series value '{}'", strings.value(row)))
        }
        _ => {
            let floats = arrow::compute::cast(column, &DataType::Float64)?;
            let floats = floats
                .as_any()
                .downcast_ref::<Float64Array>()
                .context("series value column did not cast to f64")?;
            Ok(floats.value(row))
        }
    }
}

/// Schema of a decoded exchange-rate series.
pub fn rate_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("currency", DataType::Utf8, false),
        Field::new("rate", DataType::Float64, false),
    ]))
}

/// Decode one currency's exchange-rate series.
pub fn parse_rate_series(data: &[u8], currency: &str) -> Result<RecordBatch> {
    let rows = read_series(data)
        .with_context(|| format!("Failed to parse {} exchange-rate series", currency))?;

    let dates: Date32Array = rows.iter().map(|(d, _)| Some(days_since_epoch(*d))).collect();
    let currencies = StringArray::from(vec![currency; rows.len()]);
    let rates: Float64Array = rows.iter().map(|(_, v)| Some(*v)).collect();

    Ok(RecordBatch::try_new(
        rate_schema(),
        vec![
            Arc::new(dates) as ArrayRef,
            Arc::new(currencies),
            Arc::new(rates),
        ],
    )?)
}

/// Schema of the decoded monthly inflation series.
pub fn inflation_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("month_date", DataType::Date32, false),
        Field::new("monthly_inflation", DataType::Float64, false),
    ]))
}

/// Decode the monthly inflation series, truncating dates to month starts.
pub fn parse_inflation_series(data: &[u8]) -> Result<RecordBatch> {
    let rows = read_series(data).context("Failed to parse inflation series")?;

    let months: Date32Array = rows
        .iter()
        .map(|(d, _)| {
            let month_start = NaiveDate::from_ymd_opt(
                chrono::Datelike::year(d),
                chrono::Datelike::month(d),
                1,
            )
            .unwrap();
            Some(days_since_epoch(month_start))
        })
        .collect();
    let values: Float64Array = rows.iter().map(|(_, v)| Some(*v)).collect();

    Ok(RecordBatch::try_new(
        inflation_schema(),
        vec![Arc::new(months) as ArrayRef, Arc::new(values)],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::AsArray;
    use arrow::datatypes::{Date32Type, Float64Type};

    const USD_CSV: &[u8] = b"data;valor\n02/01/2024;4,85\n03/01/2024;4,91\n";
    const IPCA_CSV: &[u8] = b"data;valor\n01/01/2024;0,42\n01/02/2024;0,83\n";

    #[test]
    fn parses_rate_series_with_decimal_commas() {
        let batch = parse_rate_series(USD_CSV, "USD").unwrap();
        assert_eq!(batch.num_rows(), 2);

        let dates = batch.column(0).as_primitive::<Date32Type>();
        assert_eq!(
            date_from_days(dates.value(0)),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert_eq!(batch.column(1).as_string::<i32>().value(0), "USD");
        let rates = batch.column(2).as_primitive::<Float64Type>();
        assert!((rates.value(0) - 4.85).abs() < 1e-9);
        assert!((rates.value(1) - 4.91).abs() < 1e-9);
    }

    #[test]
    fn inflation_dates_are_month_starts() {
        let batch = parse_inflation_series(IPCA_CSV).unwrap();
        let months = batch.column(0).as_primitive::<Date32Type>();
        assert_eq!(
            date_from_days(months.value(0)),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert_eq!(
            date_from_days(months.value(1)),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );
    }

    #[test]
    fn rejects_empty_and_malformed_series() {
        assert!(parse_rate_series(b"data;valor\n", "USD").is_err());
        assert!(parse_rate_series(b"data;valor\nnot-a-date;1,0\n", "USD").is_err());
    }
}
