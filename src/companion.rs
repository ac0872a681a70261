use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::StudyError;
use crate::library_store::LibraryStore;
use crate::messages::{FinishedQuiz, QuizView, StudyRequest, StudyResponse};
use crate::models::{Difficulty, DueReview, LibraryItem, StudyModule, TranscriptSegment};
use crate::quiz_session::{QuizSession, QuizState};
use crate::review_scheduler::{ReviewScheduler, ReviewTrigger};
use crate::storage::StudyStore;
use crate::study_generator::StudyModuleGenerator;
use crate::{log_service_start, log_service_success};

struct ActiveQuiz {
    item_id: Option<String>,
    session: QuizSession,
    // Study session already counted for this completion; a retried finish
    // only reschedules.
    recorded: Option<LibraryItem>,
}

/// Entry point for the host: owns the generator, the library, the scheduler
/// and every running quiz. Dropping it releases the review trigger.
pub struct StudyCompanion {
    generator: StudyModuleGenerator,
    library: LibraryStore,
    scheduler: ReviewScheduler,
    sessions: Mutex<HashMap<Uuid, ActiveQuiz>>,
}

impl StudyCompanion {
    pub fn new(
        generator: StudyModuleGenerator,
        store: StudyStore,
        trigger: Arc<dyn ReviewTrigger>,
    ) -> Self {
        let scheduler = ReviewScheduler::new(store.clone(), trigger);
        let library = LibraryStore::new(store, scheduler.clone());
        Self {
            generator,
            library,
            scheduler,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn library(&self) -> &LibraryStore {
        &self.library
    }

    pub fn scheduler(&self) -> &ReviewScheduler {
        &self.scheduler
    }

    pub fn generator(&self) -> &StudyModuleGenerator {
        &self.generator
    }

    pub async fn generate_study_module(
        &self,
        transcript: &[TranscriptSegment],
        highlights: &[String],
        difficulty: Difficulty,
    ) -> Result<StudyModule, StudyError> {
        self.generator.generate(transcript, highlights, difficulty).await
    }

    /// Start a quiz over `module`, optionally tied to a library item so it
    /// can be finished into a study session and a review.
    pub async fn start_quiz(
        &self,
        module: StudyModule,
        item_id: Option<String>,
    ) -> Result<QuizView, StudyError> {
        if let Some(id) = &item_id {
            if self.library.get(id).await?.is_none() {
                return Err(StudyError::NotFound(format!("library item '{}'", id)));
            }
        }

        let session = QuizSession::new(module)?;
        let session_id = Uuid::new_v4();
        let active = ActiveQuiz {
            item_id,
            session,
            recorded: None,
        };
        let view = quiz_view(session_id, &active);

        self.sessions.lock().await.insert(session_id, active);
        log_service_success!(
            "study_companion",
            "start_quiz",
            format!("session {} with {} questions", session_id, view.total_questions)
        );
        Ok(view)
    }

    pub async fn select_option(&self, session_id: Uuid, choice: usize) -> Result<QuizView, StudyError> {
        self.with_session(session_id, |session| session.select_option(choice))
            .await
    }

    pub async fn submit_answer(&self, session_id: Uuid) -> Result<QuizView, StudyError> {
        self.with_session(session_id, QuizSession::submit).await
    }

    pub async fn advance_quiz(&self, session_id: Uuid) -> Result<QuizView, StudyError> {
        self.with_session(session_id, QuizSession::advance).await
    }

    /// Restart from the first question. A later finish counts as a new
    /// study session.
    pub async fn retake_quiz(&self, session_id: Uuid) -> Result<QuizView, StudyError> {
        let mut sessions = self.sessions.lock().await;
        let active = sessions
            .get_mut(&session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        active.session.retake();
        active.recorded = None;
        Ok(quiz_view(session_id, active))
    }

    pub async fn get_quiz(&self, session_id: Uuid) -> Result<QuizView, StudyError> {
        let sessions = self.sessions.lock().await;
        let active = sessions.get(&session_id).ok_or_else(|| session_not_found(session_id))?;
        Ok(quiz_view(session_id, active))
    }

    /// Close a completed quiz: count a study session for its item and
    /// schedule the next review. The session is dropped only on success;
    /// retrying after a scheduling failure does not count the session twice.
    pub async fn finish_quiz(&self, session_id: Uuid) -> Result<FinishedQuiz, StudyError> {
        log_service_start!("study_companion", "finish_quiz");

        let mut sessions = self.sessions.lock().await;
        let active = sessions
            .get_mut(&session_id)
            .ok_or_else(|| session_not_found(session_id))?;

        let outcome = active.session.outcome().ok_or_else(|| StudyError::InvalidTransition {
            operation: "finish",
            state: active.session.state().to_string(),
        })?;
        let item_id = active.item_id.clone().ok_or_else(|| {
            StudyError::InvalidInput("quiz session is not bound to a library item".to_string())
        })?;

        let item = match active.recorded.clone() {
            Some(item) => item,
            None => {
                let item = self.library.record_study_session(&item_id).await?;
                active.recorded = Some(item.clone());
                item
            }
        };
        let when = self.scheduler.next_review_time(&item_id, Utc::now()).await?;
        let schedule = self.scheduler.schedule_review(&item_id, when).await?;

        sessions.remove(&session_id);
        log_service_success!(
            "study_companion",
            "finish_quiz",
            item_id = item_id,
            format!("scored {}/{}", outcome.score, outcome.total)
        );

        Ok(FinishedQuiz {
            outcome,
            item,
            schedule,
        })
    }

    /// Resolve a fired review trigger: the item and its schedule, or `None`
    /// when the item left the library or the review was cancelled.
    pub async fn review_due(
        &self,
        item_id: &str,
    ) -> Result<Option<(LibraryItem, DueReview)>, StudyError> {
        let Some(item) = self.library.get(item_id).await? else {
            return Ok(None);
        };
        let Some(schedule) = self.scheduler.get_schedule(item_id).await? else {
            return Ok(None);
        };
        Ok(Some((
            item,
            DueReview {
                item_id: item_id.to_string(),
                schedule,
            },
        )))
    }

    pub async fn active_quiz_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Route one tagged request to the matching operation.
    pub async fn dispatch(&self, request: StudyRequest) -> Result<StudyResponse, StudyError> {
        log_service_start!("study_companion", request.action());

        let response = match request {
            StudyRequest::GenerateStudyModule {
                transcript,
                highlights,
                difficulty,
            } => StudyResponse::GenerateStudyModule(
                self.generate_study_module(&transcript, &highlights, difficulty)
                    .await?,
            ),
            StudyRequest::StartQuiz { module, item_id } => {
                StudyResponse::StartQuiz(self.start_quiz(module, item_id).await?)
            }
            StudyRequest::SelectOption { session_id, choice } => {
                StudyResponse::SelectOption(self.select_option(session_id, choice).await?)
            }
            StudyRequest::SubmitAnswer { session_id } => {
                StudyResponse::SubmitAnswer(self.submit_answer(session_id).await?)
            }
            StudyRequest::AdvanceQuiz { session_id } => {
                StudyResponse::AdvanceQuiz(self.advance_quiz(session_id).await?)
            }
            StudyRequest::RetakeQuiz { session_id } => {
                StudyResponse::RetakeQuiz(self.retake_quiz(session_id).await?)
            }
            StudyRequest::GetQuiz { session_id } => {
                StudyResponse::GetQuiz(self.get_quiz(session_id).await?)
            }
            StudyRequest::FinishQuiz { session_id } => {
                StudyResponse::FinishQuiz(self.finish_quiz(session_id).await?)
            }
            StudyRequest::UpsertItem(update) => {
                StudyResponse::UpsertItem(self.library.upsert(update).await?)
            }
            StudyRequest::GetItem { item_id } => StudyResponse::GetItem(
                self.library
                    .get(&item_id)
                    .await?
                    .ok_or_else(|| StudyError::NotFound(format!("library item '{}'", item_id)))?,
            ),
            StudyRequest::RemoveItem { item_id } => StudyResponse::RemoveItem {
                removed: self.library.remove(&item_id).await?,
            },
            StudyRequest::RecordStudySession { item_id } => {
                StudyResponse::RecordStudySession(self.library.record_study_session(&item_id).await?)
            }
            StudyRequest::ListLibrary { tag } => StudyResponse::ListLibrary(match tag {
                Some(tag) => self.library.list_by_tag(&tag).await?,
                None => self.library.list_all().await?,
            }),
            StudyRequest::ScheduleReview { item_id, when } => {
                StudyResponse::ScheduleReview(self.scheduler.schedule_review(&item_id, when).await?)
            }
            StudyRequest::CancelReview { item_id } => StudyResponse::CancelReview {
                cancelled: self.scheduler.cancel_review(&item_id).await?,
            },
            StudyRequest::DueReviews { now } => StudyResponse::DueReviews(
                self.scheduler
                    .due_reviews(now.unwrap_or_else(Utc::now))
                    .await?,
            ),
        };

        Ok(response)
    }

    async fn with_session<F>(&self, session_id: Uuid, step: F) -> Result<QuizView, StudyError>
    where
        F: FnOnce(&mut QuizSession) -> Result<QuizState, StudyError>,
    {
        let mut sessions = self.sessions.lock().await;
        let active = sessions
            .get_mut(&session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        step(&mut active.session)?;
        Ok(quiz_view(session_id, active))
    }
}

fn session_not_found(session_id: Uuid) -> StudyError {
    StudyError::NotFound(format!("quiz session '{}'", session_id))
}

fn quiz_view(session_id: Uuid, active: &ActiveQuiz) -> QuizView {
    let session = &active.session;
    QuizView {
        session_id,
        item_id: active.item_id.clone(),
        status: session.state(),
        score: session.score(),
        total_questions: session.total_questions(),
        progress: session.progress(),
        current_question: session.current_question().cloned(),
        outcome: session.outcome(),
    }
}
