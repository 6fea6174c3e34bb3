//! Export a user's score records as JSON or CSV.
//!
//! CSV output starts with a UTF-8 byte order mark so spreadsheet tools
//! detect the encoding of the Vietnamese labels, and quotes fields the
//! RFC 4180 way.

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::Config;
use crate::models::ScoreRecord;
use crate::scores::{ScoreFilter, ScoreStore};

const CSV_HEADER: [&str; 5] = ["username", "Time", "Score", "Content", "Total_guess"];
const UTF8_BOM: &str = "\u{feff}";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!("unknown export format '{}' (expected json or csv)", other),
        }
    }
}

pub fn render(records: &[ScoreRecord], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        ExportFormat::Csv => Ok(to_csv(records)),
    }
}

fn to_csv(records: &[ScoreRecord]) -> String {
    let mut out = String::from(UTF8_BOM);
    out.push_str(&CSV_HEADER.join(","));
    out.push_str("\r\n");
    for r in records {
        let fields = [&r.username, &r.time, &r.score, &r.content, &r.total_guess];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push_str("\r\n");
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Export `username`'s records matching `filter`.
///
/// Writes to `output` when given, otherwise to stdout. Returns the number
/// of records exported.
pub fn run_export(
    config: &Config,
    username: &str,
    filter: &ScoreFilter,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<usize> {
    let store = ScoreStore::new(&config.paths.scores_file);
    let records = filter.apply(store.list_for(username));
    let rendered = render(&records, format)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &rendered)?;
            eprintln!(
                "Exported {} score records for {} to {}",
                records.len(),
                username,
                path.display()
            );
        }
        None => {
            println!("{}", rendered);
        }
    }

    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreLabel;
    use tempfile::TempDir;

    fn record(content: &str) -> ScoreRecord {
        ScoreRecord {
            username: "alice".to_string(),
            time: "2024-05-01 08:00:00".to_string(),
            score: "trung bình".to_string(),
            content: content.to_string(),
            total_guess: "lo âu nhẹ".to_string(),
        }
    }

    #[test]
    fn csv_has_bom_header_and_quoting() {
        let csv = render(&[record("mất ngủ, \"mệt\"\nkéo dài")], ExportFormat::Csv).unwrap();
        assert!(csv.starts_with('\u{feff}'));
        let mut lines = csv.trim_start_matches('\u{feff}').split("\r\n");
        assert_eq!(lines.next(), Some("username,Time,Score,Content,Total_guess"));
        assert!(csv.contains("\"mất ngủ, \"\"mệt\"\"\nkéo dài\""));
        assert!(csv.contains(",trung bình,"));
    }

    #[test]
    fn json_keeps_unicode() {
        let json = render(&[record("buồn")], ExportFormat::Json).unwrap();
        assert!(json.contains("\"Content\": \"buồn\""));
        assert!(json.contains("lo âu nhẹ"));
    }

    #[test]
    fn parse_format() {
        assert_eq!(ExportFormat::parse("CSV").unwrap(), ExportFormat::Csv);
        assert!(ExportFormat::parse("xml").is_err());
    }

    #[test]
    fn export_to_file_applies_filter() {
        let tmp = TempDir::new().unwrap();
        let config = Config::rooted_at(tmp.path());
        let store = ScoreStore::new(&config.paths.scores_file);
        store.append(record("a")).unwrap();
        let mut good = record("b");
        good.score = "tốt".to_string();
        store.append(good).unwrap();

        let out = tmp.path().join("out/alice.json");
        let filter = ScoreFilter {
            labels: vec![ScoreLabel::Good],
            ..Default::default()
        };
        let n = run_export(&config, "alice", &filter, ExportFormat::Json, Some(&out)).unwrap();
        assert_eq!(n, 1);
        let written: Vec<ScoreRecord> =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written[0].content, "b");
    }
}
