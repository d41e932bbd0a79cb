use crate::error::Result;
use chrono::Local;
use log::{Log, Metadata, Record, info, warn};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Simple logger implementation for console diagnostics
pub struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Append-only progress trail, one `<timestamp> : <message>` line per event.
///
/// Opened once by the driver and closed when the run finishes. Each entry is
/// flushed immediately so a failed run still leaves the lines logged so far.
pub struct ProgressLog {
    sink: Box<dyn Write>,
}

impl ProgressLog {
    /// Opens `path` for appending, creating it if needed.
    ///
    /// # Errors
    /// Returns error if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(file))
    }

    pub fn from_writer<W: Write + 'static>(writer: W) -> Self {
        Self {
            sink: Box::new(writer),
        }
    }

    /// Records a progress message. Write failures are reported as warnings
    /// and never returned to the caller.
    pub fn log_progress(&mut self, message: &str) {
        info!("{message}");
        let line = format!("{} : {}\n", Local::now().format(TIMESTAMP_FORMAT), message);
        if let Err(e) = self
            .sink
            .write_all(line.as_bytes())
            .and_then(|_| self.sink.flush())
        {
            warn!("Failed to write progress log entry: {e}");
        }
    }

    pub fn close(mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use std::fs;

    #[test]
    fn appends_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("code_log.txt");

        let mut log = ProgressLog::open(&path).unwrap();
        log.log_progress("Preliminaries complete. Initiating ETL process");
        log.close().unwrap();

        let mut log = ProgressLog::open(&path).unwrap();
        log.log_progress("Process Complete");
        log.close().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let (stamp, message) = lines[0].split_once(" : ").unwrap();
        assert!(NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S,%3f").is_ok());
        assert_eq!(message, "Preliminaries complete. Initiating ETL process");
        assert!(lines[1].ends_with(" : Process Complete"));
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_are_swallowed() {
        let mut log = ProgressLog::from_writer(BrokenWriter);
        log.log_progress("still fine");
        assert!(log.close().is_ok());
    }
}
