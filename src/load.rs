use crate::error::{PipelineError, Result};
use crate::logger::ProgressLog;
use crate::structs::{Cell, EnrichedTable, Table};
use csv::{Reader, Writer};
use log::debug;
use rusqlite::Connection;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use std::{fs::File, path::Path};

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Null => ToSqlOutput::Owned(Value::Null),
            Cell::Int(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            Cell::Float(v) => ToSqlOutput::Owned(Value::Real(*v)),
            Cell::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Writes `table` to a CSV file: one header row, one line per record, no
/// index column. An existing file at `output_path` is overwritten.
///
/// # Errors
/// Returns error if file cannot be created or written to.
pub fn write_csv(table: &Table, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }

    writer.flush()?;
    Ok(())
}

/// Saves the enriched table as CSV and records the step in the progress log.
pub fn load_to_csv(table: &EnrichedTable, output_path: &Path, log: &mut ProgressLog) -> Result<()> {
    debug!(
        "Writing {} rows to {}",
        table.len(),
        output_path.display()
    );
    write_csv(table, output_path)?;
    log.log_progress("Data saved to CSV file");
    Ok(())
}

/// Reads a CSV snapshot back, applying the same numeric coercion as extraction.
pub fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = Reader::from_path(path)?;
    let columns = reader.headers()?.iter().map(String::from).collect();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(String::from).collect());
    }
    Table::from_text_rows(columns, rows)
}

pub fn open_database(path: &Path) -> Result<Connection> {
    debug!("Opening database {}", path.display());
    Ok(Connection::open(path)?)
}

/// Loads the enriched table into `table_name`, replacing any existing table.
///
/// # Arguments
/// * `table` - Rows to persist
/// * `conn` - Open database connection, owned by the driver
/// * `table_name` - Destination table
/// * `log` - Progress log; one entry before and one after the load
///
/// # Returns
/// Returns the number of rows inserted.
///
/// # Errors
/// Returns `PipelineError::Storage` if any statement fails. The replacement
/// runs in one transaction, so a failed load leaves the previous table.
pub fn load_to_db(
    table: &EnrichedTable,
    conn: &mut Connection,
    table_name: &str,
    log: &mut ProgressLog,
) -> Result<usize> {
    log.log_progress("SQL Connection initiated");
    let count = replace_table(conn, table, table_name)?;
    debug!("Inserted {count} rows into {table_name}");
    log.log_progress("Data loaded to Database as a table, Executing queries");
    Ok(count)
}

/// Drops `table_name`, recreates it with one column per table column (type
/// inferred from the cells) and inserts every row in order.
pub fn replace_table(conn: &mut Connection, table: &Table, table_name: &str) -> Result<usize> {
    if table.columns().is_empty() {
        return Err(PipelineError::Data(format!(
            "cannot create `{table_name}` without columns"
        )));
    }

    let name = quote_identifier(table_name);
    let column_defs = table
        .columns()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            format!(
                "{} {}",
                quote_identifier(column),
                table.column_type(i).sql_name()
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; table.columns().len()].join(", ");

    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {name}; CREATE TABLE {name} ({column_defs});"
    ))?;
    {
        let mut insert = tx.prepare(&format!("INSERT INTO {name} VALUES ({placeholders})"))?;
        for row in table.rows() {
            insert.execute(rusqlite::params_from_iter(row.iter()))?;
        }
    }
    tx.commit()?;

    Ok(table.len())
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
