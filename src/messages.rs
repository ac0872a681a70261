use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Difficulty, DueReview, LibraryItem, LibraryItemUpdate, QuizOutcome, QuizQuestion, ReviewSchedule,
    StudyModule, TranscriptSegment,
};
use crate::quiz_session::QuizState;

/// Requests accepted from the browser-side caller.
///
/// Serialized as `{"action": "...", "payload": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "action",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum StudyRequest {
    GenerateStudyModule {
        transcript: Vec<TranscriptSegment>,
        #[serde(default)]
        highlights: Vec<String>,
        #[serde(default)]
        difficulty: Difficulty,
    },
    StartQuiz {
        module: StudyModule,
        #[serde(default)]
        item_id: Option<String>,
    },
    SelectOption {
        session_id: Uuid,
        choice: usize,
    },
    SubmitAnswer {
        session_id: Uuid,
    },
    AdvanceQuiz {
        session_id: Uuid,
    },
    RetakeQuiz {
        session_id: Uuid,
    },
    GetQuiz {
        session_id: Uuid,
    },
    FinishQuiz {
        session_id: Uuid,
    },
    UpsertItem(LibraryItemUpdate),
    GetItem {
        item_id: String,
    },
    RemoveItem {
        item_id: String,
    },
    RecordStudySession {
        item_id: String,
    },
    ListLibrary {
        #[serde(default)]
        tag: Option<String>,
    },
    ScheduleReview {
        item_id: String,
        when: DateTime<Utc>,
    },
    CancelReview {
        item_id: String,
    },
    DueReviews {
        #[serde(default)]
        now: Option<DateTime<Utc>>,
    },
}

impl StudyRequest {
    pub fn action(&self) -> &'static str {
        match self {
            StudyRequest::GenerateStudyModule { .. } => "generate_study_module",
            StudyRequest::StartQuiz { .. } => "start_quiz",
            StudyRequest::SelectOption { .. } => "select_option",
            StudyRequest::SubmitAnswer { .. } => "submit_answer",
            StudyRequest::AdvanceQuiz { .. } => "advance_quiz",
            StudyRequest::RetakeQuiz { .. } => "retake_quiz",
            StudyRequest::GetQuiz { .. } => "get_quiz",
            StudyRequest::FinishQuiz { .. } => "finish_quiz",
            StudyRequest::UpsertItem(_) => "upsert_item",
            StudyRequest::GetItem { .. } => "get_item",
            StudyRequest::RemoveItem { .. } => "remove_item",
            StudyRequest::RecordStudySession { .. } => "record_study_session",
            StudyRequest::ListLibrary { .. } => "list_library",
            StudyRequest::ScheduleReview { .. } => "schedule_review",
            StudyRequest::CancelReview { .. } => "cancel_review",
            StudyRequest::DueReviews { .. } => "due_reviews",
        }
    }
}

/// Snapshot of a running quiz as the caller sees it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizView {
    pub session_id: Uuid,
    pub item_id: Option<String>,
    pub status: QuizState,
    pub score: usize,
    pub total_questions: usize,
    pub progress: f64,
    pub current_question: Option<QuizQuestion>,
    pub outcome: Option<QuizOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedQuiz {
    pub outcome: QuizOutcome,
    pub item: LibraryItem,
    pub schedule: ReviewSchedule,
}

/// Replies, one per request action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "action",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum StudyResponse {
    GenerateStudyModule(StudyModule),
    StartQuiz(QuizView),
    SelectOption(QuizView),
    SubmitAnswer(QuizView),
    AdvanceQuiz(QuizView),
    RetakeQuiz(QuizView),
    GetQuiz(QuizView),
    FinishQuiz(FinishedQuiz),
    UpsertItem(LibraryItem),
    GetItem(LibraryItem),
    RemoveItem { removed: bool },
    RecordStudySession(LibraryItem),
    ListLibrary(Vec<LibraryItem>),
    ScheduleReview(ReviewSchedule),
    CancelReview { cancelled: bool },
    DueReviews(Vec<DueReview>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request: StudyRequest = serde_json::from_value(json!({
            "action": "select_option",
            "payload": {"sessionId": "67e55044-10b1-426f-9247-bb680e5fe0c8", "choice": 2}
        }))
        .unwrap();

        match request {
            StudyRequest::SelectOption { session_id, choice } => {
                assert_eq!(session_id.to_string(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
                assert_eq!(choice, 2);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_generate_request_defaults() {
        let request: StudyRequest = serde_json::from_value(json!({
            "action": "generate_study_module",
            "payload": {"transcript": [{"text": "hello", "startTimeSeconds": 0.0}]}
        }))
        .unwrap();

        match request {
            StudyRequest::GenerateStudyModule { transcript, highlights, difficulty } => {
                assert_eq!(transcript.len(), 1);
                assert!(highlights.is_empty());
                assert_eq!(difficulty, Difficulty::Medium);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_upsert_payload_is_partial_item() {
        let request: StudyRequest = serde_json::from_value(json!({
            "action": "upsert_item",
            "payload": {"itemId": "vid-1", "notes": "rewatch"}
        }))
        .unwrap();

        assert_eq!(request.action(), "upsert_item");
        let StudyRequest::UpsertItem(update) = request else {
            panic!("expected upsert");
        };
        assert_eq!(update.item_id, "vid-1");
        assert_eq!(update.notes.as_deref(), Some("rewatch"));
        assert!(update.title.is_none());
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result: Result<StudyRequest, _> =
            serde_json::from_value(json!({"action": "delete_everything", "payload": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_response_wire_format() {
        let json = serde_json::to_value(StudyResponse::RemoveItem { removed: true }).unwrap();
        assert_eq!(json, json!({"action": "remove_item", "payload": {"removed": true}}));
    }
}
