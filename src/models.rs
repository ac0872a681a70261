use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::StudyError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub text: String,
    pub start_time_seconds: f64,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>, start_time_seconds: f64) -> Self {
        Self {
            text: text.into(),
            start_time_seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = StudyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(StudyError::InvalidInput(format!(
                "Unknown difficulty '{}', expected easy, medium or hard",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option_index: usize,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizDefinition {
    pub questions: Vec<QuizQuestion>,
}

/// Where a study module came from. Fallback modules are schema-valid but
/// built from the transcript alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleSource {
    #[default]
    Generated,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyModule {
    pub summary: String,
    pub key_terms: Vec<String>,
    pub quiz: QuizDefinition,
    #[serde(default)]
    pub source: ModuleSource,
    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
}

impl StudyModule {
    pub const OPTIONS_PER_QUESTION: usize = 4;

    /// Check the module against the shape every consumer relies on.
    ///
    /// Questions are reported by their 1-based position so the message can
    /// be shown as-is.
    pub fn validate(&self) -> Result<(), StudyError> {
        if self.summary.trim().is_empty() {
            return Err(StudyError::SchemaViolation {
                question: None,
                reason: "summary must be a non-empty string".to_string(),
            });
        }

        if self.quiz.questions.is_empty() {
            return Err(StudyError::SchemaViolation {
                question: None,
                reason: "quiz must contain at least one question".to_string(),
            });
        }

        for (index, question) in self.quiz.questions.iter().enumerate() {
            let position = Some(index + 1);
            if question.options.len() != Self::OPTIONS_PER_QUESTION {
                return Err(StudyError::SchemaViolation {
                    question: position,
                    reason: format!(
                        "expected {} options, found {}",
                        Self::OPTIONS_PER_QUESTION,
                        question.options.len()
                    ),
                });
            }
            if question.correct_option_index >= Self::OPTIONS_PER_QUESTION {
                return Err(StudyError::SchemaViolation {
                    question: position,
                    reason: format!(
                        "correct option index {} is out of range",
                        question.correct_option_index
                    ),
                });
            }
            if question.explanation.trim().is_empty() {
                return Err(StudyError::SchemaViolation {
                    question: position,
                    reason: "explanation must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItem {
    pub item_id: String,
    pub title: String,
    pub channel: String,
    pub thumbnail_url: String,
    pub added_at: DateTime<Utc>,
    pub study_count: u32,
    pub last_studied_at: Option<DateTime<Utc>>,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    pub notes: String,
}

/// Partial library item accepted by upsert. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItemUpdate {
    pub item_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl LibraryItemUpdate {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

impl LibraryItem {
    /// Build a fresh record from an update, filling the documented defaults.
    pub fn from_update(update: LibraryItemUpdate, now: DateTime<Utc>) -> Self {
        Self {
            item_id: update.item_id,
            title: update.title.unwrap_or_default(),
            channel: update.channel.unwrap_or_default(),
            thumbnail_url: update.thumbnail_url.unwrap_or_default(),
            added_at: now,
            study_count: 0,
            last_studied_at: None,
            difficulty: update.difficulty.unwrap_or_default(),
            tags: dedup_tags(update.tags.unwrap_or_default()),
            notes: update.notes.unwrap_or_default(),
        }
    }

    /// Field-wise overwrite producing a new record; study metadata is kept.
    pub fn merged_with(&self, update: LibraryItemUpdate) -> Self {
        Self {
            item_id: self.item_id.clone(),
            title: update.title.unwrap_or_else(|| self.title.clone()),
            channel: update.channel.unwrap_or_else(|| self.channel.clone()),
            thumbnail_url: update
                .thumbnail_url
                .unwrap_or_else(|| self.thumbnail_url.clone()),
            added_at: self.added_at,
            study_count: self.study_count,
            last_studied_at: self.last_studied_at,
            difficulty: update.difficulty.unwrap_or(self.difficulty),
            tags: update
                .tags
                .map(dedup_tags)
                .unwrap_or_else(|| self.tags.clone()),
            notes: update.notes.unwrap_or_else(|| self.notes.clone()),
        }
    }
}

// Tags behave as a set but keep the caller's order.
fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    seen
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSchedule {
    pub next_review_at: DateTime<Utc>,
    pub interval_days: u32,
    pub ease_factor: f64,
    pub repetitions: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueReview {
    pub item_id: String,
    pub schedule: ReviewSchedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuizOutcome {
    pub score: usize,
    pub total: usize,
    pub percentage: f64,
}
