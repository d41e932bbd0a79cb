pub mod error;
pub mod extract;
pub mod load;
pub mod logger;
pub mod pipeline;
pub mod query;
pub mod structs;
pub mod transform;

// Re-export public API
pub use error::{PipelineError, Result};
pub use extract::{extract, fetch_html, parse_table};
pub use load::{load_to_csv, load_to_db, open_database, read_csv, replace_table, write_csv};
pub use logger::{ProgressLog, SimpleLogger};
pub use pipeline::{Driver, Stage};
pub use query::{QueryResult, query, run_query};
pub use structs::{
    Cell, ColumnType, EnrichedTable, EtlConfig, ExchangeRates, RawTable, Table, TableSelector,
    TransformConfig, default_queries, sql_identifier,
};
pub use transform::{convert_market_cap, load_exchange_rates, round_to_cents, transform};
