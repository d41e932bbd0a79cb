use lib::{
    Cell, Driver, EtlConfig, PipelineError, Stage, TransformConfig, default_queries,
    open_database, query, read_csv,
};
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;

const PAGE: &str = r#"<!DOCTYPE html>
<html><body>
<table class="wikitable">
<tbody>
<tr><th>Rank</th><th>Bank name</th><th>Market cap<br />(US$ billion)</th></tr>
<tr><td>1</td><td><a href="/wiki/JPMorgan_Chase">JPMorgan Chase</a></td><td>432.92</td></tr>
<tr><td>2</td><td><a href="/wiki/Bank_of_America">Bank of America</a></td><td>231.52</td></tr>
<tr><td>3</td><td><a href="/wiki/ICBC">Industrial and Commercial Bank of China</a></td><td>194.56</td></tr>
<tr><td>4</td><td><a href="/wiki/Agricultural_Bank_of_China">Agricultural Bank of China</a></td><td>160.68</td></tr>
<tr><td>5</td><td><a href="/wiki/HDFC_Bank">HDFC Bank</a></td><td>157.91</td></tr>
<tr><td>6</td><td><a href="/wiki/Wells_Fargo">Wells Fargo</a></td><td>155.87</td></tr>
</tbody>
</table>
</body></html>"#;

/// Serves exactly one HTTP response on a random local port.
fn serve_once(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = [0u8; 4096];
        let _ = stream.read(&mut request);
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).unwrap();
    });
    format!("http://{addr}/wiki/List_of_largest_banks")
}

fn config_in(dir: &Path, url: String) -> EtlConfig {
    let rates_path = dir.join("exchange_rate.csv");
    fs::write(&rates_path, "Currency,Rate\nEUR,0.93\nGBP,0.8\nINR,82.95\n").unwrap();
    EtlConfig {
        url,
        rates_path,
        csv_path: dir.join("final_data.csv"),
        db_path: dir.join("Banks.db"),
        log_path: dir.join("code_log.txt"),
        ..EtlConfig::default()
    }
}

#[test]
fn full_run_writes_csv_database_and_log() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), serve_once("200 OK", PAGE));

    let mut out = Vec::<u8>::new();
    let mut driver = Driver::new(&config);
    let loaded = driver.run(&mut out).unwrap();
    assert_eq!(loaded, 6);
    assert_eq!(driver.stage(), Stage::Done);

    // CSV snapshot
    let csv = read_csv(&config.csv_path).unwrap();
    assert_eq!(
        csv.columns(),
        &[
            "Rank",
            "Bank name",
            "Market cap (US$ billion)",
            "MC_GBP_Billion",
            "MC_EUR_Billion",
            "MC_INR_Billion"
        ]
        .map(String::from)
    );
    assert_eq!(
        csv.rows()[0],
        vec![
            Cell::Int(1),
            Cell::Text("JPMorgan Chase".into()),
            Cell::Float(432.92),
            Cell::Float(346.34),
            Cell::Float(402.62),
            Cell::Float(35910.71),
        ]
    );

    // Database table mirrors the CSV
    let conn = open_database(&config.db_path).unwrap();
    let all = query(&conn, "SELECT * FROM Largest_banks").unwrap();
    assert_eq!(all.columns, csv.columns());
    assert_eq!(all.rows, csv.rows());

    let top5 = query(&conn, "SELECT \"Bank name\" FROM Largest_banks LIMIT 5").unwrap();
    assert_eq!(top5.rows.len(), 5);
    assert_eq!(top5.rows[4][0], Cell::Text("HDFC Bank".into()));

    // Query output
    let printed = String::from_utf8(out).unwrap();
    for sql in &config.queries {
        assert!(printed.contains(&format!("Query Statement: {sql}")));
    }

    // Progress trail
    let trail = fs::read_to_string(&config.log_path).unwrap();
    let messages: Vec<&str> = trail
        .lines()
        .filter_map(|line| line.split_once(" : ").map(|(_, m)| m))
        .collect();
    assert_eq!(
        messages,
        [
            "Preliminaries complete. Initiating ETL process",
            "Data extraction complete. Initiating Transformation process",
            "Data transformation complete. Initiating Loading process",
            "Data saved to CSV file",
            "SQL Connection initiated",
            "Data loaded to Database as a table, Executing queries",
            "Process Complete",
            "Server Connection closed",
        ]
    );
}

#[test]
fn rerun_replaces_table() {
    let dir = tempfile::tempdir().unwrap();

    for _ in 0..2 {
        let config = config_in(dir.path(), serve_once("200 OK", PAGE));
        Driver::new(&config).run(&mut Vec::<u8>::new()).unwrap();
    }

    let conn = open_database(&dir.path().join("Banks.db")).unwrap();
    let count = query(&conn, "SELECT COUNT(*) FROM Largest_banks").unwrap();
    assert_eq!(count.rows, vec![vec![Cell::Int(6)]]);
}

#[test]
fn http_error_status_is_transport_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), serve_once("404 Not Found", "gone"));

    let mut driver = Driver::new(&config);
    let err = driver.run(&mut Vec::<u8>::new()).unwrap_err();

    assert!(matches!(err, PipelineError::Transport(_)));
    assert_eq!(driver.stage(), Stage::Start);
}

#[test]
fn page_without_table_halts_before_transform() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(
        dir.path(),
        serve_once("200 OK", "<html><body><p>No tables here</p></body></html>"),
    );

    let mut driver = Driver::new(&config);
    let err = driver.run(&mut Vec::<u8>::new()).unwrap_err();

    assert!(matches!(err, PipelineError::Parse(_)));
    assert!(!config.csv_path.exists());
}

#[test]
fn missing_rate_halts_after_extract() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), serve_once("200 OK", PAGE));
    fs::write(&config.rates_path, "Currency,Rate\nEUR,0.93\nGBP,0.8\n").unwrap();

    let mut driver = Driver::new(&config);
    let err = driver.run(&mut Vec::<u8>::new()).unwrap_err();

    assert!(matches!(err, PipelineError::MissingRate(code) if code == "INR"));
    assert_eq!(driver.stage(), Stage::Extracted);
    assert!(!config.csv_path.exists());
}

#[test]
fn currency_subset_drives_columns_and_average_query() {
    let dir = tempfile::tempdir().unwrap();
    let transform = TransformConfig {
        currencies: vec!["EUR".into()],
        ..TransformConfig::default()
    };
    let config = EtlConfig {
        queries: default_queries("Largest_banks", &transform),
        transform,
        ..config_in(dir.path(), serve_once("200 OK", PAGE))
    };

    let mut out = Vec::<u8>::new();
    let mut driver = Driver::new(&config);
    assert_eq!(driver.run(&mut out).unwrap(), 6);
    assert_eq!(driver.stage(), Stage::Done);

    let csv = read_csv(&config.csv_path).unwrap();
    assert_eq!(csv.columns().last().map(String::as_str), Some("MC_EUR_Billion"));
    assert!(csv.column_index("MC_GBP_Billion").is_none());

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains("Query Statement: SELECT AVG(MC_EUR_Billion) FROM Largest_banks"));
}

#[test]
fn table_name_with_space_is_loaded_and_queried() {
    let dir = tempfile::tempdir().unwrap();
    let table_name = "Top banks".to_string();
    let config = EtlConfig {
        queries: default_queries(&table_name, &TransformConfig::default()),
        table_name,
        ..config_in(dir.path(), serve_once("200 OK", PAGE))
    };

    let mut out = Vec::<u8>::new();
    let mut driver = Driver::new(&config);
    assert_eq!(driver.run(&mut out).unwrap(), 6);

    let conn = open_database(&config.db_path).unwrap();
    let count = query(&conn, r#"SELECT COUNT(*) FROM "Top banks""#).unwrap();
    assert_eq!(count.rows, vec![vec![Cell::Int(6)]]);

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains(r#"Query Statement: PRAGMA table_info("Top banks");"#));
}
