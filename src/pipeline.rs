use crate::error::{PipelineError, Result};
use crate::extract::extract;
use crate::load::{load_to_csv, load_to_db, open_database};
use crate::logger::ProgressLog;
use crate::query::run_query;
use crate::structs::EtlConfig;
use crate::transform::transform;
use log::debug;
use std::fmt;
use std::io::Write;

/// Position of the driver in the linear run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Extracted,
    Transformed,
    PersistedCsv,
    PersistedDb,
    Queried,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::Extracted => "extracted",
            Stage::Transformed => "transformed",
            Stage::PersistedCsv => "persisted(csv)",
            Stage::PersistedDb => "persisted(db)",
            Stage::Queried => "queried",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Runs extract → transform → load-to-csv → load-to-db → queries, in order.
///
/// Any failure stops the run where it is; artifacts written by earlier
/// stages are left in place. [`Driver::stage`] reports the last stage that
/// completed.
pub struct Driver<'a> {
    config: &'a EtlConfig,
    stage: Stage,
}

impl<'a> Driver<'a> {
    pub fn new(config: &'a EtlConfig) -> Self {
        Self {
            config,
            stage: Stage::Start,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, next: Stage) {
        debug!("Stage {} -> {}", self.stage, next);
        self.stage = next;
    }

    /// Executes the whole job, printing query output to `out`.
    ///
    /// # Returns
    /// Returns the number of bank records loaded.
    ///
    /// # Errors
    /// Returns the first `PipelineError` raised by any stage.
    pub fn run(&mut self, out: &mut dyn Write) -> Result<usize> {
        let config = self.config;
        let mut log = ProgressLog::open(&config.log_path)?;
        let mut conn = open_database(&config.db_path)?;
        log.log_progress("Preliminaries complete. Initiating ETL process");

        let raw = extract(&config.url, &config.table_selector, &mut log)?;
        self.advance(Stage::Extracted);

        let enriched = transform(raw, &config.rates_path, &config.transform, &mut log)?;
        self.advance(Stage::Transformed);

        load_to_csv(&enriched, &config.csv_path, &mut log)?;
        self.advance(Stage::PersistedCsv);

        let loaded = load_to_db(&enriched, &mut conn, &config.table_name, &mut log)?;
        self.advance(Stage::PersistedDb);

        for sql in &config.queries {
            run_query(&conn, sql, out)?;
        }
        self.advance(Stage::Queried);

        log.log_progress("Process Complete");
        conn.close().map_err(|(_, e)| PipelineError::Storage(e))?;
        log.log_progress("Server Connection closed");
        log.close()?;
        self.advance(Stage::Done);

        Ok(loaded)
    }
}
