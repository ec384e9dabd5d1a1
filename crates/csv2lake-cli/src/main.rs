use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use csv2lake_config::RuntimeConfig;
use csv2lake_core::{CmpOp, Predicate, ScalarValue, TableReader, TableWriter};
use csv2lake_ingest::{ingest_csv, IngestOptions};
use csv2lake_pipelines::{run_exchange_rate_pipeline, RateSeries};

mod init;

/// CSV ingestion and ETL into a Parquet data lake on object storage
#[derive(Parser)]
#[command(name = "csv2lake")]
#[command(version)]
#[command(about = "CSV ingestion and ETL into a Parquet data lake", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a CSV file into a lake table
    Ingest {
        /// CSV file to upload
        file: PathBuf,

        /// Logical table name (will be sanitized)
        #[arg(short, long)]
        table: String,

        /// Fail if the table already exists instead of replacing it
        #[arg(long)]
        no_overwrite: bool,

        /// Do not append the current date to the table name
        #[arg(long)]
        no_date_suffix: bool,
    },

    /// Join exchange-rate series with monthly inflation and persist the result
    Etl {
        /// Rate series as CURRENCY=path.csv (repeatable)
        #[arg(long = "rates", value_name = "CUR=FILE", required = true)]
        rates: Vec<String>,

        /// Monthly inflation series CSV
        #[arg(long, value_name = "FILE")]
        inflation: PathBuf,

        /// Destination table name
        #[arg(long, default_value = "exchange_rates")]
        table: String,
    },

    /// Print the contents of a table
    Show {
        table: String,

        /// Filter expression, e.g. "total > 300"
        #[arg(short, long)]
        filter: Option<String>,

        /// Print at most this many rows
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List tables under the configured prefix
    Tables,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RuntimeConfig::load_or_default().context("Failed to load configuration")?
    };

    if let Some(level) = &cli.log_level {
        config.log.get_or_insert_with(Default::default).level = level.clone();
    }

    init::init_tracing(&config);
    config.validate()?;

    match cli.command {
        Command::Ingest {
            file,
            table,
            no_overwrite,
            no_date_suffix,
        } => {
            let writer = TableWriter::new(&config.storage)?;
            let data = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let options = IngestOptions {
                overwrite: !no_overwrite,
                date_suffix: !no_date_suffix,
                max_payload_bytes: Some(config.ingest.max_payload_bytes),
            };

            let report = ingest_csv(&writer, &data, &table, &options).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Etl {
            rates,
            inflation,
            table,
        } => {
            let writer = TableWriter::new(&config.storage)?;

            let mut series_bytes = Vec::new();
            for spec in &rates {
                let (currency, path) = parse_rate_spec(spec)?;
                let data = std::fs::read(path)
                    .with_context(|| format!("Failed to read rate series '{}'", spec))?;
                series_bytes.push((currency.to_string(), data));
            }
            let series: Vec<RateSeries<'_>> = series_bytes
                .iter()
                .map(|(currency, data)| RateSeries {
                    currency,
                    csv: data,
                })
                .collect();

            let inflation_data = std::fs::read(&inflation)
                .with_context(|| format!("Failed to read {}", inflation.display()))?;

            let rows =
                run_exchange_rate_pipeline(&writer, &series, &inflation_data, &table).await?;
            println!("wrote {} rows to '{}'", rows, table);
        }

        Command::Show {
            table,
            filter,
            limit,
        } => {
            let reader = TableReader::new(&config.storage)?;
            let mut scan = reader.scan(&table);
            if let Some(expr) = &filter {
                scan = scan.filter(parse_filter(expr)?);
            }

            let mut batch = scan.collect().await?;
            if let Some(limit) = limit {
                batch = batch.slice(0, limit.min(batch.num_rows()));
            }
            println!("{}", arrow::util::pretty::pretty_format_batches(&[batch])?);
        }

        Command::Tables => {
            let reader = TableReader::new(&config.storage)?;
            for table in reader.list_tables().await? {
                println!("{}", table);
            }
        }
    }

    Ok(())
}

fn parse_rate_spec(spec: &str) -> Result<(&str, &str)> {
    spec.split_once('=')
        .map(|(currency, path)| (currency.trim(), path.trim()))
        .filter(|(currency, path)| !currency.is_empty() && !path.is_empty())
        .with_context(|| format!("Invalid rate spec '{}'; expected CURRENCY=FILE", spec))
}

/// Parse a `column OP value` filter expression.
fn parse_filter(expr: &str) -> Result<Predicate> {
    let mut parts = expr.split_whitespace();
    let (Some(column), Some(op), Some(value), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        anyhow::bail!("Invalid filter '{}'; expected 'column OP value'", expr);
    };

    let op = match op {
        "=" | "==" => CmpOp::Eq,
        "!=" => CmpOp::NotEq,
        "<" => CmpOp::Lt,
        "<=" => CmpOp::LtEq,
        ">" => CmpOp::Gt,
        ">=" => CmpOp::GtEq,
        other => anyhow::bail!("Unknown comparison operator '{}'", other),
    };

    Ok(Predicate::new(column, op, parse_scalar(value)))
}

fn parse_scalar(raw: &str) -> ScalarValue {
    if let Ok(v) = raw.parse::<i64>() {
        return ScalarValue::Int64(v);
    }
    if let Ok(v) = raw.parse::<f64>() {
        return ScalarValue::Float64(v);
    }
    match raw {
        "true" => ScalarValue::Boolean(true),
        "false" => ScalarValue::Boolean(false),
        _ => ScalarValue::Utf8(raw.trim_matches('\'').trim_matches('"').to_string()),
    }
}
