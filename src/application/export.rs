// src/application/export.rs
// Trade history export to CSV or JSON files

use chrono::{NaiveDate, Utc};
use csv::{QuoteStyle, WriterBuilder};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::domain::errors::{ExportError, ExportResult};
use crate::domain::models::Trade;

const CSV_HEADER: [&str; 11] = [
    "ID",
    "Symbol",
    "Type",
    "Entry Time",
    "Entry Price",
    "Exit Time",
    "Exit Price",
    "Volume",
    "Profit/Loss",
    "Commission",
    "Comment",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Rendered export, ready to be written
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub filename: String,
    pub mime_type: &'static str,
    pub contents: Vec<u8>,
}

/// `trades_YYYY-MM-DD.<ext>`
pub fn default_filename(format: ExportFormat, date: NaiveDate) -> String {
    format!("trades_{}.{}", date.format("%Y-%m-%d"), format.extension())
}

pub fn render_trades(
    trades: &[Trade],
    format: ExportFormat,
    filename: Option<&str>,
) -> ExportResult<ExportedFile> {
    let filename = match filename {
        Some(name) => validate_filename(name)?,
        None => default_filename(format, Utc::now().date_naive()),
    };

    let contents = match format {
        ExportFormat::Csv => to_csv(trades)?,
        ExportFormat::Json => serde_json::to_vec_pretty(trades)?,
    };

    Ok(ExportedFile {
        filename,
        mime_type: format.mime_type(),
        contents,
    })
}

/// Render and write the export into `dir`, returning the written path
pub fn export_trades(
    trades: &[Trade],
    format: ExportFormat,
    filename: Option<&str>,
    dir: &Path,
) -> ExportResult<PathBuf> {
    let file = render_trades(trades, format, filename)?;
    let path = dir.join(&file.filename);

    {
        // Handle is closed as soon as the bytes are flushed
        let mut handle = File::create(&path)?;
        handle.write_all(&file.contents)?;
        handle.flush()?;
    }

    log::info!(
        "Exported {} trades to {} ({})",
        trades.len(),
        path.display(),
        file.mime_type
    );
    Ok(path)
}

fn to_csv(trades: &[Trade]) -> ExportResult<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;

    for trade in trades {
        writer.write_record([
            trade.id.clone(),
            trade.symbol.clone(),
            trade.order_type.to_string(),
            trade.entry_time.to_rfc3339(),
            trade.entry_price.to_string(),
            optional(trade.exit_time.map(|t| t.to_rfc3339())),
            optional(trade.exit_price),
            trade.volume.to_string(),
            optional(trade.profit_loss),
            optional(trade.commission),
            trade.comment.clone().unwrap_or_default(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn validate_filename(name: &str) -> ExportResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.contains(&['/', '\\'][..]) || trimmed == ".." {
        return Err(ExportError::InvalidFilename(name.to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::OrderType;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn trades() -> Vec<Trade> {
        vec![
            Trade {
                id: "t1".to_string(),
                symbol: "EURUSD".to_string(),
                order_type: OrderType::Buy,
                entry_time: Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap(),
                entry_price: 1.0832,
                exit_time: Some(Utc.with_ymd_and_hms(2024, 2, 1, 15, 30, 0).unwrap()),
                exit_price: Some(1.0871),
                volume: 1.0,
                profit_loss: Some(39.0),
                commission: Some(2.5),
                comment: Some("London open, \"clean\" break".to_string()),
            },
            Trade {
                id: "t2".to_string(),
                symbol: "GBPUSD".to_string(),
                order_type: OrderType::Sell,
                entry_time: Utc.with_ymd_and_hms(2024, 2, 2, 9, 0, 0).unwrap(),
                entry_price: 1.2644,
                exit_time: None,
                exit_price: None,
                volume: 0.5,
                profit_loss: None,
                commission: None,
                comment: None,
            },
        ]
    }

    #[test]
    fn csv_has_header_plus_one_row_per_trade() {
        let file = render_trades(&trades(), ExportFormat::Csv, Some("history.csv")).unwrap();
        assert_eq!(file.filename, "history.csv");
        assert_eq!(file.mime_type, "text/csv");

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(file.contents.as_slice());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][0], "ID");
        assert_eq!(&rows[1][10], "London open, \"clean\" break");
        assert_eq!(&rows[2][8], "");
    }

    #[test]
    fn every_csv_field_is_quoted() {
        let file = render_trades(&trades(), ExportFormat::Csv, None).unwrap();
        let text = String::from_utf8(file.contents).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("\"ID\",\"Symbol\",\"Type\""));
        assert!(lines[2].starts_with("\"t2\",\"GBPUSD\",\"SELL\""));
        assert!(lines[2].ends_with(",\"\""));
        for line in &lines {
            assert!(line.starts_with('"') && line.ends_with('"'));
        }
    }

    #[test]
    fn json_is_the_full_list() {
        let file = render_trades(&trades(), ExportFormat::Json, None).unwrap();
        let text = String::from_utf8(file.contents.clone()).unwrap();
        assert!(text.contains("\n  "));

        let parsed: Vec<Trade> = serde_json::from_slice(&file.contents).unwrap();
        assert_eq!(parsed, trades());
    }

    #[test]
    fn default_filename_is_date_stamped() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 9).unwrap();
        assert_eq!(default_filename(ExportFormat::Csv, date), "trades_2024-07-09.csv");
        assert_eq!(default_filename(ExportFormat::Json, date), "trades_2024-07-09.json");

        let file = render_trades(&[], ExportFormat::Json, None).unwrap();
        assert!(file.filename.starts_with("trades_") && file.filename.ends_with(".json"));
    }

    #[test]
    fn rejects_path_like_filenames() {
        assert!(matches!(
            render_trades(&[], ExportFormat::Csv, Some("../etc/passwd")),
            Err(ExportError::InvalidFilename(_))
        ));
        assert!("xml".parse::<ExportFormat>().is_err());
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
    }

    #[test]
    fn writes_into_export_dir() {
        let dir = TempDir::new().unwrap();

        let path = export_trades(&trades(), ExportFormat::Csv, Some("out.csv"), dir.path()).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();

        assert_eq!(written.lines().count(), 3);
    }
}
