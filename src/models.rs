//! Core data models shared by the ingestion pipeline, the stores and the agent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw document produced by the loader before chunking.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Stable identifier: the source file name.
    pub id: String,
    pub path: String,
    pub content_type: String,
    pub body: String,
}

/// A chunk of a source document plus everything derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub source_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// Hex SHA-256 of `text`.
    pub hash: String,
    pub summary: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

/// A node returned by the vector index together with its similarity.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredNode {
    pub id: String,
    pub source_id: String,
    pub text: String,
    pub summary: Option<String>,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One persisted chat message. Ordering is given by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// The four qualitative wellness labels, worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScoreLabel {
    Poor,
    Fair,
    Normal,
    Good,
}

impl ScoreLabel {
    pub const ALL: [ScoreLabel; 4] = [
        ScoreLabel::Poor,
        ScoreLabel::Fair,
        ScoreLabel::Normal,
        ScoreLabel::Good,
    ];

    /// Label as written in the score file.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreLabel::Poor => "kém",
            ScoreLabel::Fair => "trung bình",
            ScoreLabel::Normal => "bình thường",
            ScoreLabel::Good => "tốt",
        }
    }

    pub fn value(&self) -> u8 {
        match self {
            ScoreLabel::Poor => 1,
            ScoreLabel::Fair => 2,
            ScoreLabel::Normal => 3,
            ScoreLabel::Good => 4,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            1 => Some(ScoreLabel::Poor),
            2 => Some(ScoreLabel::Fair),
            3 => Some(ScoreLabel::Normal),
            4 => Some(ScoreLabel::Good),
            _ => None,
        }
    }

    /// Case-insensitive parse of a stored label.
    pub fn parse(s: &str) -> Option<Self> {
        let lowered = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|l| l.as_str() == lowered)
    }
}

impl fmt::Display for ScoreLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted wellness assessment. Field names match the score file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreRecord {
    pub username: String,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Score")]
    pub score: String,
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "Total_guess")]
    pub total_guess: String,
}

impl ScoreRecord {
    pub const TIME_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";

    pub fn label(&self) -> Option<ScoreLabel> {
        ScoreLabel::parse(&self.score)
    }

    pub fn timestamp(&self) -> Option<chrono::NaiveDateTime> {
        chrono::NaiveDateTime::parse_from_str(&self.time, Self::TIME_FORMAT).ok()
    }
}

/// Public profile fields of a registered user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub gender: String,
}

impl UserProfile {
    /// One-line description substituted into the agent instruction.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.email.is_empty() {
            parts.push(format!("email: {}", self.email));
        }
        if !self.age.is_empty() {
            parts.push(format!("tuổi: {}", self.age));
        }
        if !self.gender.is_empty() {
            parts.push(format!("giới tính: {}", self.gender));
        }
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_parse_is_case_insensitive() {
        assert_eq!(ScoreLabel::parse("Kém"), Some(ScoreLabel::Poor));
        assert_eq!(ScoreLabel::parse(" TỐT "), Some(ScoreLabel::Good));
        assert_eq!(ScoreLabel::parse("Bình thường"), Some(ScoreLabel::Normal));
        assert_eq!(ScoreLabel::parse("excellent"), None);
    }

    #[test]
    fn label_ordering_follows_value() {
        assert!(ScoreLabel::Poor < ScoreLabel::Fair);
        assert!(ScoreLabel::Normal < ScoreLabel::Good);
        for label in ScoreLabel::ALL {
            assert_eq!(ScoreLabel::from_value(label.value()), Some(label));
        }
    }

    #[test]
    fn score_record_uses_file_field_names() {
        let record = ScoreRecord {
            username: "alice".to_string(),
            time: "2024-05-01 10:00:00".to_string(),
            score: "tốt".to_string(),
            content: "ngủ ngon".to_string(),
            total_guess: "ổn định".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["Time"], "2024-05-01 10:00:00");
        assert_eq!(json["Score"], "tốt");
        assert_eq!(json["Total_guess"], "ổn định");
        assert!(record.timestamp().is_some());
    }

    #[test]
    fn chat_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn empty_profile_summary() {
        assert_eq!(UserProfile::default().summary(), "");
        let p = UserProfile {
            email: String::new(),
            age: "30".to_string(),
            gender: "Nữ".to_string(),
        };
        assert_eq!(p.summary(), "tuổi: 30, giới tính: Nữ");
    }
}
