use clap::Parser;
use lib::{
    Driver, EtlConfig, PipelineError, SimpleLogger, TableSelector, TransformConfig,
    default_queries,
};
use log::{debug, error};
use std::io;
use std::path::PathBuf;
use std::time::Instant;

static LOGGER: SimpleLogger = SimpleLogger;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Page holding the bank ranking table
    #[arg(long, default_value = lib::structs::DEFAULT_URL)]
    url: String,

    /// Class attribute of the table to scrape
    #[arg(long, default_value = "wikitable")]
    table_class: String,

    /// Exchange rate CSV with Currency and Rate columns
    #[arg(long, default_value = "data/exchange_rate.csv")]
    rates: PathBuf,

    /// Output CSV file (overwritten on every run)
    #[arg(long, default_value = "data/final_data.csv")]
    output_csv: PathBuf,

    /// SQLite database file
    #[arg(long, default_value = "Banks.db")]
    database: PathBuf,

    /// Table replaced in the database
    #[arg(long, default_value = lib::structs::DEFAULT_TABLE_NAME)]
    table_name: String,

    /// Progress log file (appended to)
    #[arg(long, default_value = "code_log.txt")]
    log_file: PathBuf,

    /// Currency codes to convert market cap into (e.g., GBP,EUR,INR)
    #[arg(short, long, value_delimiter = ',', default_value = "GBP,EUR,INR")]
    currencies: Vec<String>,

    /// Log level for output
    #[arg(long, default_value = "false")]
    debug: bool,
}

impl Args {
    fn into_config(self) -> EtlConfig {
        let transform = TransformConfig {
            currencies: self.currencies,
            ..TransformConfig::default()
        };
        EtlConfig {
            url: self.url,
            table_selector: TableSelector::any().with("class", self.table_class),
            rates_path: self.rates,
            csv_path: self.output_csv,
            db_path: self.database,
            queries: default_queries(&self.table_name, &transform),
            table_name: self.table_name,
            log_path: self.log_file,
            transform,
        }
    }
}

fn main() -> Result<(), PipelineError> {
    let total_start = Instant::now();
    let args = Args::parse();

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(if args.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        });
    }

    let config = args.into_config();
    debug!("Source: {} | Selector: {}", config.url, config.table_selector.to_css());
    debug!(
        "Rates: {} | CSV: {} | DB: {} ({})",
        config.rates_path.display(),
        config.csv_path.display(),
        config.db_path.display(),
        config.table_name
    );

    println!("Largest banks ETL");
    let mut driver = Driver::new(&config);
    let outcome = driver.run(&mut io::stdout().lock());
    match outcome {
        Ok(count) => {
            println!(
                "Loaded {} banks in {:.2?}",
                count,
                total_start.elapsed()
            );
            Ok(())
        }
        Err(e) => {
            error!("Run halted after stage `{}`", driver.stage());
            Err(e)
        }
    }
}
