#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Transport Error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Parse Error: {0}")]
    Parse(String),
    #[error("Config Error: {0}")]
    Config(String),
    #[error("Missing Column: {0}")]
    MissingColumn(String),
    #[error("Missing Rate: no exchange rate for currency {0}")]
    MissingRate(String),
    #[error("Data Error: {0}")]
    Data(String),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Storage Error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
