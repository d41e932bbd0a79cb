use crate::error::Result;
use crate::structs::Cell;
use log::debug;
use rusqlite::Connection;
use rusqlite::types::Value;
use std::io::Write;

/// Column names and every row returned by a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Integer(v) => Cell::Int(v),
            Value::Real(v) => Cell::Float(v),
            Value::Text(s) => Cell::Text(s),
            Value::Blob(b) => Cell::Text(format!("<blob {} bytes>", b.len())),
        }
    }
}

/// Executes `sql` and fetches the full result set.
pub fn query(conn: &Connection, sql: &str) -> Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| row.get::<_, Value>(i).map(Cell::from))
                .collect::<rusqlite::Result<Vec<Cell>>>()
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debug!("{} rows from `{sql}`", rows.len());
    Ok(QueryResult { columns, rows })
}

/// Runs `sql`, then prints the statement followed by its result set to `out`.
///
/// # Errors
/// Returns `PipelineError::Storage` if the statement is invalid or fails,
/// `PipelineError::Io` if `out` cannot be written.
pub fn run_query(conn: &Connection, sql: &str, out: &mut dyn Write) -> Result<QueryResult> {
    let result = query(conn, sql)?;

    writeln!(out, "Query Statement: {sql}")?;
    writeln!(out, "Query Result:")?;
    let header = result.columns.join(" | ");
    writeln!(out, "{header}")?;
    writeln!(out, "{}", "-".repeat(header.len()))?;
    for row in &result.rows {
        let line = row
            .iter()
            .map(|cell| match cell {
                Cell::Null => "NULL".to_string(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" | ");
        writeln!(out, "{line}")?;
    }
    writeln!(out, "({} rows)\n", result.rows.len())?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn banks(gbp: &[f64]) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Largest_banks (\"Bank name\" TEXT, MC_GBP_Billion REAL);",
        )
        .unwrap();
        for (i, value) in gbp.iter().enumerate() {
            conn.execute(
                "INSERT INTO Largest_banks VALUES (?1, ?2)",
                rusqlite::params![format!("Bank {i}"), value],
            )
            .unwrap();
        }
        conn
    }

    #[test]
    fn average_of_gbp_column() {
        let conn = banks(&[10.0, 20.0, 30.0]);
        let result = query(&conn, "SELECT AVG(MC_GBP_Billion) FROM Largest_banks").unwrap();
        assert_eq!(result.rows, vec![vec![Cell::Float(20.0)]]);
    }

    #[test]
    fn limit_returns_first_rows_in_order() {
        let conn = banks(&[1.0; 10]);
        let result = query(&conn, "SELECT \"Bank name\" FROM Largest_banks LIMIT 5").unwrap();

        assert_eq!(result.columns, ["Bank name"]);
        let names: Vec<_> = result.rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(
            names,
            (0..5)
                .map(|i| Cell::Text(format!("Bank {i}")))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn pragma_lists_schema() {
        let conn = banks(&[]);
        let result = query(&conn, "PRAGMA table_info(Largest_banks);").unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0][1], Cell::Text("Bank name".into()));
        assert_eq!(result.rows[1][2], Cell::Text("REAL".into()));
        assert_eq!(result.rows[0][4], Cell::Null);
    }

    #[test]
    fn invalid_sql_is_storage_error() {
        let conn = banks(&[]);
        let mut out = Vec::<u8>::new();
        let err = run_query(&conn, "SELECT * FROM Missing_table", &mut out).unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn prints_statement_and_rows() {
        let conn = banks(&[10.0, 20.5]);
        let mut out = Vec::<u8>::new();
        run_query(&conn, "SELECT * FROM Largest_banks", &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Query Statement: SELECT * FROM Largest_banks");
        assert_eq!(lines[2], "Bank name | MC_GBP_Billion");
        assert_eq!(lines[4], "Bank 0 | 10.0");
        assert_eq!(lines[5], "Bank 1 | 20.5");
        assert_eq!(lines[6], "(2 rows)");
    }
}
