pub mod api;
pub mod companion;
pub mod config;
pub mod errors;
pub mod fallback_generator;
pub mod library_store;
pub mod llm_providers;
pub mod logging;
pub mod messages;
pub mod models;
pub mod quiz_session;
pub mod review_scheduler;
pub mod storage;
pub mod study_generator;

pub use companion::StudyCompanion;
pub use errors::*;
pub use library_store::LibraryStore;
pub use llm_providers::{JsonResponseParser, LLMProvider, LLMProviderFactory, LLMProviderType, PromptService};
pub use messages::{FinishedQuiz, QuizView, StudyRequest, StudyResponse};
pub use models::*;
pub use quiz_session::{QuizSession, QuizState};
pub use review_scheduler::{next_interval, NoopTrigger, ReviewScheduler, ReviewTrigger, TimerTrigger};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore, StudyStore};
pub use study_generator::StudyModuleGenerator;
