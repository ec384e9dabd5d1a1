// csv2lake-pipelines - Exchange-rate ETL
//
// Decodes central-bank CSV series, joins daily exchange rates with monthly
// inflation, and persists the result as a lake table. Fetching the series
// over HTTP is out of scope; callers hand in the raw CSV bytes.

use anyhow::{Context, Result};
use tracing::info;

use csv2lake_core::{SchemaMode, TableWriter, WriteMode};

mod bcb;
mod join;

pub use bcb::{parse_inflation_series, parse_rate_series};
pub use join::{concat_rate_batches, join_rates_with_inflation, joined_schema};

/// One currency's raw series bytes, as exported by the SGS API.
pub struct RateSeries<'a> {
    pub currency: &'a str,
    pub csv: &'a [u8],
}

/// Decode, join and persist exchange rates with inflation. The table is
/// replaced wholesale on every run, schema included, so reruns are idempotent.
/// Returns the number of rows written.
pub async fn run_exchange_rate_pipeline(
    writer: &TableWriter,
    rates: &[RateSeries<'_>],
    inflation_csv: &[u8],
    table: &str,
) -> Result<usize> {
    let rate_batches = rates
        .iter()
        .map(|series| bcb::parse_rate_series(series.csv, series.currency))
        .collect::<Result<Vec<_>>>()?;
    let all_rates = join::concat_rate_batches(&rate_batches)?;
    info!(rows = all_rates.num_rows(), currencies = rates.len(), "decoded rate series");

    let inflation = bcb::parse_inflation_series(inflation_csv)?;
    info!(months = inflation.num_rows(), "decoded inflation series");

    let joined = join::join_rates_with_inflation(&all_rates, &inflation)?;
    writer
        .write(
            &joined,
            table,
            WriteMode::Overwrite,
            Some(SchemaMode::Overwrite),
        )
        .await
        .with_context(|| format!("Failed to persist joined rates to table '{}'", table))?;

    info!(table, rows = joined.num_rows(), "exchange-rate pipeline finished");
    Ok(joined.num_rows())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::AsArray;
    use arrow::datatypes::Float64Type;
    use csv2lake_core::{Operator, Predicate, TableReader};

    #[tokio::test]
    async fn pipeline_writes_joined_table() {
        let op = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        let writer = TableWriter::from_operator(op.clone(), "lake");
        let reader = TableReader::from_operator(op, "lake");

        let rates = [
            RateSeries {
                currency: "USD",
                csv: b"data;valor\n02/01/2024;4,85\n05/02/2024;4,91\n",
            },
            RateSeries {
                currency: "EUR",
                csv: b"data;valor\n02/01/2024;5,32\n",
            },
        ];
        let inflation = b"data;valor\n01/01/2024;0,42\n";

        let rows = run_exchange_rate_pipeline(&writer, &rates, inflation, "exchange_rates")
            .await
            .unwrap();
        assert_eq!(rows, 3);

        let result = reader
            .scan("exchange_rates")
            .filter(Predicate::eq("currency", "USD"))
            .sort("date", false)
            .collect()
            .await
            .unwrap();
        assert_eq!(result.num_rows(), 2);
        let rate_col = result.column(2).as_primitive::<Float64Type>();
        assert!((rate_col.value(0) - 4.85).abs() < 1e-9);

        // Rerun replaces rather than appends.
        let rows = run_exchange_rate_pipeline(&writer, &rates[..1], inflation, "exchange_rates")
            .await
            .unwrap();
        assert_eq!(rows, 2);
        let result = reader.scan("exchange_rates").collect().await.unwrap();
        assert_eq!(result.num_rows(), 2);
    }
}
