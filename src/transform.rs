use crate::error::{PipelineError, Result};
use crate::logger::ProgressLog;
use crate::structs::{Cell, EnrichedTable, ExchangeRates, RawTable, TransformConfig};
use log::debug;
use serde::Deserialize;
use std::{fs::File, path::Path};

#[derive(Debug, Deserialize)]
struct RateRecord {
    #[serde(rename = "Currency")]
    currency: String,
    #[serde(rename = "Rate")]
    rate: f64,
}

/// Converts the market-cap column of `table` into every configured currency.
///
/// Reads the exchange rates from `rates_path`, then appends one
/// `MC_<CODE>_Billion` column per currency in `config`. Rows and their order
/// are left untouched.
///
/// # Arguments
///
/// * `table` - Table produced by the extractor
/// * `rates_path` - CSV file with `Currency` and `Rate` columns
/// * `config` - Market-cap column name and target currencies
/// * `log` - Progress log; one entry is written on success
///
/// # Errors
///
/// Returns `PipelineError` if:
/// - The rate file is missing or malformed (`Config`)
/// - The market-cap column is absent (`MissingColumn`)
/// - A configured currency has no rate (`MissingRate`)
/// - A market-cap cell is not numeric (`Data`)
pub fn transform(
    table: RawTable,
    rates_path: &Path,
    config: &TransformConfig,
    log: &mut ProgressLog,
) -> Result<EnrichedTable> {
    let rates = load_exchange_rates(rates_path)?;
    let enriched = convert_market_cap(table, &rates, config)?;
    log.log_progress("Data transformation complete. Initiating Loading process");
    Ok(enriched)
}

/// Reads the exchange-rate CSV into a currency → rate mapping.
///
/// # Errors
///
/// Returns `PipelineError::Config` if the file cannot be opened, lacks the
/// `Currency` or `Rate` header, or holds a row that does not parse.
pub fn load_exchange_rates(path: &Path) -> Result<ExchangeRates> {
    debug!("Reading exchange rates: {}", path.display());
    let file = File::open(path).map_err(|e| {
        PipelineError::Config(format!(
            "cannot open exchange rate file {}: {e}",
            path.display()
        ))
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader.headers().map_err(|e| {
        PipelineError::Config(format!("cannot read header of {}: {e}", path.display()))
    })?;
    for required in ["Currency", "Rate"] {
        if !headers.iter().any(|h| h == required) {
            return Err(PipelineError::Config(format!(
                "exchange rate file {} has no `{required}` column",
                path.display()
            )));
        }
    }

    let mut rates = ExchangeRates::default();
    for (i, record) in reader.deserialize::<RateRecord>().enumerate() {
        let record = record.map_err(|e| {
            PipelineError::Config(format!(
                "malformed row {} in {}: {e}",
                i + 2,
                path.display()
            ))
        })?;
        rates.insert(record.currency, record.rate);
    }

    debug!("Loaded {} exchange rates", rates.len());
    Ok(rates)
}

/// Appends the converted market-cap columns using already-loaded `rates`.
///
/// Every rate is resolved before any column is added, so on error the input
/// is never partially enriched.
pub fn convert_market_cap(
    mut table: RawTable,
    rates: &ExchangeRates,
    config: &TransformConfig,
) -> Result<EnrichedTable> {
    let column = &config.market_cap_column;
    let index = table
        .column_index(column)
        .ok_or_else(|| PipelineError::MissingColumn(column.clone()))?;

    let conversions = config
        .currencies
        .iter()
        .map(|code| {
            rates
                .rate(code)
                .map(|rate| (config.derived_column(code), rate))
        })
        .collect::<Result<Vec<_>>>()?;

    let market_caps = table
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            row[index].as_f64().ok_or_else(|| {
                PipelineError::Data(format!(
                    "row {}: `{column}` value `{}` is not numeric",
                    i + 1,
                    row[index]
                ))
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    for (name, rate) in conversions {
        debug!("Adding {name} at rate {rate}");
        let values = market_caps
            .iter()
            .map(|usd| Cell::Float(round_to_cents(usd * rate)))
            .collect();
        table.add_column(name, values)?;
    }

    Ok(table)
}

/// Rounds to two decimal places, ties away from zero (`f64::round`).
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
