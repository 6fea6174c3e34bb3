//! Append-only wellness score store and its read-side statistics.
//!
//! Records live in a single JSON array. Reads filter the full list by
//! username (an O(n) scan); writes read, append and rewrite the file.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::models::{ScoreLabel, ScoreRecord};

pub struct ScoreStore {
    path: PathBuf,
}

impl ScoreStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// All records in append order. Missing or corrupt file ⇒ empty.
    pub fn load_all(&self) -> Vec<ScoreRecord> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) if !c.trim().is_empty() => c,
            _ => return Vec::new(),
        };
        match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "score file unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    pub fn append(&self, record: ScoreRecord) -> Result<()> {
        let mut records = self.load_all();
        info!(username = %record.username, score = %record.score, "saving score record");
        records.push(record);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&records)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write scores: {}", self.path.display()))?;
        Ok(())
    }

    pub fn list_for(&self, username: &str) -> Vec<ScoreRecord> {
        self.load_all()
            .into_iter()
            .filter(|r| r.username == username)
            .collect()
    }
}

/// Build a record stamped with `now` (local time in the caller).
pub fn new_record(
    username: &str,
    label: ScoreLabel,
    content: &str,
    total_guess: &str,
    now: NaiveDateTime,
) -> ScoreRecord {
    ScoreRecord {
        username: username.to_string(),
        time: now.format(ScoreRecord::TIME_FORMAT).to_string(),
        score: label.as_str().to_string(),
        content: content.to_string(),
        total_guess: total_guess.to_string(),
    }
}

// ============ Filtering ============

/// Inclusive date range and label filter over a user's records.
#[derive(Debug, Clone, Default)]
pub struct ScoreFilter {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    /// Empty means every label.
    pub labels: Vec<ScoreLabel>,
}

impl ScoreFilter {
    pub fn matches(&self, record: &ScoreRecord) -> bool {
        if self.since.is_some() || self.until.is_some() {
            let Some(date) = record.timestamp().map(|t| t.date()) else {
                return false;
            };
            if self.since.is_some_and(|s| date < s) || self.until.is_some_and(|u| date > u) {
                return false;
            }
        }
        if !self.labels.is_empty() {
            match record.label() {
                Some(label) => self.labels.contains(&label),
                None => false,
            }
        } else {
            true
        }
    }

    pub fn apply(&self, records: Vec<ScoreRecord>) -> Vec<ScoreRecord> {
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}

// ============ Statistics ============

/// Advice tier derived from the last week of assessments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Excellent,
    Stable,
    NeedsAttention,
    Concerning,
}

impl Recommendation {
    fn from_mean(mean: f64) -> Self {
        if mean >= 3.5 {
            Recommendation::Excellent
        } else if mean >= 2.5 {
            Recommendation::Stable
        } else if mean >= 1.5 {
            Recommendation::NeedsAttention
        } else {
            Recommendation::Concerning
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub latest: Option<ScoreRecord>,
    pub average: Option<String>,
    pub last_7_days: usize,
    pub recommendation: Option<Recommendation>,
}

/// Summarize a user's records as of `now`.
///
/// Records with an unknown label count towards `total` but not the average.
/// The average label rounds half to even. A recommendation needs at least two
/// records in the last 7 days and is taken from the labelled ones among them.
pub fn health_summary(records: &[ScoreRecord], now: NaiveDateTime) -> HealthSummary {
    let latest = records
        .iter()
        .filter(|r| r.timestamp().is_some())
        .max_by_key(|r| r.timestamp())
        .or_else(|| records.last())
        .cloned();

    let average = mean_value(records.iter())
        .and_then(|m| ScoreLabel::from_value(m.round_ties_even() as u8))
        .map(|l| l.as_str().to_string());

    let week_ago = now - Duration::days(7);
    let recent: Vec<&ScoreRecord> = records
        .iter()
        .filter(|r| r.timestamp().is_some_and(|t| t >= week_ago))
        .collect();

    let recommendation = if recent.len() >= 2 {
        mean_value(recent.iter().copied()).map(Recommendation::from_mean)
    } else {
        None
    };

    HealthSummary {
        total: records.len(),
        latest,
        average,
        last_7_days: recent.len(),
        recommendation,
    }
}

fn mean_value<'a>(records: impl Iterator<Item = &'a ScoreRecord>) -> Option<f64> {
    let values: Vec<f64> = records
        .filter_map(|r| r.label())
        .map(|l| l.value() as f64)
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
