//! Payout report export
//!
//! CSV is generated here. PDF and Sheets only return a placeholder payload.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{NewsdeskError, Result};
use crate::schemas::PayoutData;

pub const CSV_HEADER: &str = "source,author,articles,rate,total,type";
pub const CSV_FILENAME: &str = "payout-report.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Pdf,
    Sheets,
}

impl FromStr for ExportFormat {
    type Err = NewsdeskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "pdf" => Ok(Self::Pdf),
            "sheets" => Ok(Self::Sheets),
            _ => Err(NewsdeskError::ValidationError(
                "Invalid export format".to_string(),
            )),
        }
    }
}

/// Body of `POST /api/export`
#[derive(Debug, Clone, Deserialize)]
pub struct ExportRequest {
    pub format: String,
    #[serde(default)]
    pub data: Vec<PayoutData>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutput {
    Csv(String),
    Placeholder(serde_json::Value),
}

pub fn export(request: &ExportRequest) -> Result<ExportOutput> {
    let output = match request.format.parse::<ExportFormat>()? {
        ExportFormat::Csv => ExportOutput::Csv(generate_csv(&request.data)?),
        ExportFormat::Pdf => ExportOutput::Placeholder(serde_json::json!({
            "message": "PDF generation is not available",
            "downloadUrl": "#",
        })),
        ExportFormat::Sheets => ExportOutput::Placeholder(serde_json::json!({
            "message": "Google Sheets export is not available",
            "sheetUrl": "#",
        })),
    };
    Ok(output)
}

/// One CSV line; `author` stays a column even when empty
#[derive(Serialize)]
struct CsvRow<'a> {
    source: &'a str,
    author: Option<&'a str>,
    articles: usize,
    rate: f64,
    total: f64,
    #[serde(rename = "type")]
    payout_type: &'static str,
}

impl<'a> From<&'a PayoutData> for CsvRow<'a> {
    fn from(row: &'a PayoutData) -> Self {
        Self {
            source: &row.source,
            author: row.author.as_deref(),
            articles: row.articles,
            rate: row.rate,
            total: row.total,
            payout_type: row.payout_type.as_str(),
        }
    }
}

/// CSV report with a header line; empty input yields an empty document
pub fn generate_csv(rows: &[PayoutData]) -> Result<String> {
    if rows.is_empty() {
        return Ok(String::new());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(CsvRow::from(row))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| NewsdeskError::IoError(e.into_error()))?;

    String::from_utf8(bytes)
        .map_err(|e| NewsdeskError::StorageError(format!("CSV output is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::RateType;

    fn row(source: &str, author: Option<&str>, articles: usize, rate: f64) -> PayoutData {
        PayoutData {
            source: source.to_string(),
            author: author.map(str::to_string),
            articles,
            rate,
            total: articles as f64 * rate,
            payout_type: if author.is_some() { RateType::Author } else { RateType::Source },
        }
    }

    #[test]
    fn test_csv() {
        let csv = generate_csv(&[
            row("The New York Times", None, 2, 75.0),
            row("BBC", Some("Jane \"JD\" Doe"), 1, 32.5),
            row("Smith, Jones & Co", None, 3, 10.0),
        ])
        .unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "The New York Times,,2,75.0,150.0,source");
        assert_eq!(lines[2], "BBC,\"Jane \"\"JD\"\" Doe\",1,32.5,32.5,author");
        assert_eq!(lines[3], "\"Smith, Jones & Co\",,3,10.0,30.0,source");
    }

    #[test]
    fn test_empty_csv() {
        assert_eq!(generate_csv(&[]).unwrap(), "");
    }

    #[test]
    fn test_formats() {
        let request = ExportRequest {
            format: "pdf".to_string(),
            data: Vec::new(),
        };
        match export(&request).unwrap() {
            ExportOutput::Placeholder(body) => assert_eq!(body["downloadUrl"], "#"),
            other => panic!("unexpected output: {other:?}"),
        }

        let bad = ExportRequest {
            format: "xlsx".to_string(),
            data: Vec::new(),
        };
        assert!(export(&bad).unwrap_err().is_validation());
    }
}
