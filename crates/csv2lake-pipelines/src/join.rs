// Rates-with-inflation join
//
// Left join: every rate row is kept; monthly_inflation is null for months the
// inflation series does not cover.

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, AsArray, Date32Array, Float64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Date32Type, Field, Float64Type, Schema};
use chrono::Datelike;
use std::collections::HashMap;
use std::sync::Arc;

use crate::bcb::{date_from_days, days_since_epoch};

/// Schema of the joined exchange-rate table.
pub fn joined_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("currency", DataType::Utf8, false),
        Field::new("rate", DataType::Float64, false),
        Field::new("monthly_inflation", DataType::Float64, true),
    ]))
}

/// Concatenate per-currency rate batches into one.
pub fn concat_rate_batches(batches: &[RecordBatch]) -> Result<RecordBatch> {
    anyhow::ensure!(!batches.is_empty(), "no rate series to concatenate");
    let schema = batches[0].schema();
    arrow::compute::concat_batches(&schema, batches).context("Failed to concatenate rate series")
}

fn month_start_days(days: i32) -> i32 {
    let date = date_from_days(days);
    let month_start = chrono::NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap();
    days_since_epoch(month_start)
}

/// Left-join rate rows with the monthly inflation series on month start.
pub fn join_rates_with_inflation(
    rates: &RecordBatch,
    inflation: &RecordBatch,
) -> Result<RecordBatch> {
    let month_idx = inflation
        .schema()
        .index_of("month_date")
        .context("inflation batch is missing 'month_date'")?;
    let value_idx = inflation
        .schema()
        .index_of("monthly_inflation")
        .context("inflation batch is missing 'monthly_inflation'")?;

    let months = inflation.column(month_idx).as_primitive::<Date32Type>();
    let values = inflation.column(value_idx).as_primitive::<Float64Type>();
    let mut by_month: HashMap<i32, f64> = HashMap::with_capacity(inflation.num_rows());
    for idx in 0..inflation.num_rows() {
        by_month.insert(months.value(idx), values.value(idx));
    }

    let date_idx = rates
        .schema()
        .index_of("date")
        .context("rates batch is missing 'date'")?;
    let currency_idx = rates
        .schema()
        .index_of("currency")
        .context("rates batch is missing 'currency'")?;
    let rate_idx = rates
        .schema()
        .index_of("rate")
        .context("rates batch is missing 'rate'")?;

    let dates = rates.column(date_idx).as_primitive::<Date32Type>();
    let currencies = rates.column(currency_idx).as_string::<i32>();
    let rate_values = rates.column(rate_idx).as_primitive::<Float64Type>();

    let mut joined_inflation: Vec<Option<f64>> = Vec::with_capacity(rates.num_rows());
    for idx in 0..rates.num_rows() {
        let month = month_start_days(dates.value(idx));
        joined_inflation.push(by_month.get(&month).copied());
    }

    let out_dates: Date32Array = (0..rates.num_rows()).map(|i| Some(dates.value(i))).collect();
    let out_currencies: StringArray =
        (0..rates.num_rows()).map(|i| Some(currencies.value(i))).collect();
    let out_rates: Float64Array =
        (0..rates.num_rows()).map(|i| Some(rate_values.value(i))).collect();
    let out_inflation = Float64Array::from(joined_inflation);

    Ok(RecordBatch::try_new(
        joined_schema(),
        vec![
            Arc::new(out_dates) as ArrayRef,
            Arc::new(out_currencies),
            Arc::new(out_rates),
            Arc::new(out_inflation),
        ],
    )?)
}
