use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::errors::StudyError;
use crate::fallback_generator;
use crate::llm_providers::{JsonResponseParser, PromptService};
use crate::models::{Difficulty, ModuleSource, QuizDefinition, StudyModule, TranscriptSegment};
use crate::{log_llm_operation, log_service_start, log_service_success, log_validation};

const SYSTEM_MESSAGE: &str = "You are a patient tutor who turns video transcripts into study material. \
Always respond with a single valid JSON object in the requested format.";

/// Metadata sent alongside the transcript
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub segment_count: usize,
    pub total_duration_seconds: f64,
    pub difficulty: Difficulty,
    pub generated_at: DateTime<Utc>,
}

/// Everything the service needs to build one study module
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest<'a> {
    pub transcript: &'a [TranscriptSegment],
    pub highlights: &'a [String],
    pub metadata: GenerationMetadata,
}

/// Shape expected back from the service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedModule {
    summary: String,
    #[serde(alias = "key_terms")]
    key_terms: Vec<String>,
    quiz: QuizDefinition,
}

#[derive(Clone)]
pub struct StudyModuleGenerator {
    service: Arc<dyn PromptService>,
    json_parser: JsonResponseParser,
    request_timeout: Option<Duration>,
}

impl StudyModuleGenerator {
    pub fn new(service: Arc<dyn PromptService>) -> Self {
        Self {
            service,
            json_parser: JsonResponseParser,
            request_timeout: None,
        }
    }

    /// Bound the service call; a timeout counts as a service failure.
    pub fn with_timeout(mut self, request_timeout: Option<Duration>) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.service.provider_name()
    }

    /// Produce a study module for the transcript.
    ///
    /// Only an empty transcript is an error. Service failures, unparseable
    /// responses and schema violations all fall back to the local heuristic
    /// module, which always validates.
    pub async fn generate(
        &self,
        transcript: &[TranscriptSegment],
        highlights: &[String],
        difficulty: Difficulty,
    ) -> Result<StudyModule, StudyError> {
        ensure_transcript(transcript)?;
        log_service_start!("study_generator", "generate", segment_count = transcript.len());

        match self.generate_with_service(transcript, highlights, difficulty).await {
            Ok(module) => Ok(module),
            Err(e) if e.is_recoverable_generation_failure() => {
                log_llm_operation!(
                    fallback,
                    "generate_study_module",
                    provider = self.provider_name(),
                    error = e
                );
                Ok(fallback_generator::generate(transcript))
            }
            Err(e) => Err(e),
        }
    }

    /// The service path alone, surfacing `Service`, `ResponseParse` and
    /// `SchemaViolation` instead of falling back.
    pub async fn generate_with_service(
        &self,
        transcript: &[TranscriptSegment],
        highlights: &[String],
        difficulty: Difficulty,
    ) -> Result<StudyModule, StudyError> {
        ensure_transcript(transcript)?;

        let request = build_request(transcript, highlights, difficulty, Utc::now());
        let prompt = build_prompt(&request)?;

        log_llm_operation!(
            start,
            "generate_study_module",
            provider = self.provider_name(),
            prompt_length = prompt.len()
        );
        let started = Instant::now();

        let call = self.service.send_prompt(Some(SYSTEM_MESSAGE), &prompt);
        let response = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| StudyError::Service(format!("request timed out after {:?}", limit)))?,
            None => call.await,
        }
        .map_err(|e| StudyError::Service(e.to_string()))?;

        debug!(
            provider = self.provider_name(),
            response_length = response.len(),
            "Raw response received for study module"
        );

        let module = self.parse_module(&response)?;

        log_llm_operation!(
            success,
            "generate_study_module",
            provider = self.provider_name(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        log_service_success!(
            "study_generator",
            "generate",
            format!("{} questions, {} key terms", module.quiz.questions.len(), module.key_terms.len())
        );
        Ok(module)
    }

    fn parse_module(&self, response: &str) -> Result<StudyModule, StudyError> {
        let generated: GeneratedModule = self
            .json_parser
            .parse_json_response(response)
            .map_err(|e| StudyError::ResponseParse(e.to_string()))?;

        let module = StudyModule {
            summary: generated.summary,
            key_terms: generated.key_terms,
            quiz: generated.quiz,
            source: ModuleSource::Generated,
            generated_at: Utc::now(),
        };

        module.validate().inspect_err(|e| {
            log_validation!(failure, "study_module", error = e);
        })?;
        log_validation!(success, "study_module", "generated module validated");

        Ok(module)
    }
}

fn ensure_transcript(transcript: &[TranscriptSegment]) -> Result<(), StudyError> {
    if transcript.is_empty() {
        return Err(StudyError::InvalidInput(
            "transcript must contain at least one segment".to_string(),
        ));
    }
    Ok(())
}

pub fn build_request<'a>(
    transcript: &'a [TranscriptSegment],
    highlights: &'a [String],
    difficulty: Difficulty,
    now: DateTime<Utc>,
) -> GenerationRequest<'a> {
    GenerationRequest {
        transcript,
        highlights,
        metadata: GenerationMetadata {
            segment_count: transcript.len(),
            total_duration_seconds: transcript
                .last()
                .map(|segment| segment.start_time_seconds)
                .unwrap_or(0.0),
            difficulty,
            generated_at: now,
        },
    }
}

fn build_prompt(request: &GenerationRequest<'_>) -> Result<String, StudyError> {
    let payload = serde_json::to_string_pretty(request)
        .map_err(|e| StudyError::InvalidInput(format!("transcript could not be encoded: {}", e)))?;

    let highlight_note = if request.highlights.is_empty() {
        ""
    } else {
        "\n- Give the learner's highlights extra weight in the summary and the quiz"
    };

    Ok(format!(
        r#"Create a study module for the video transcript below, pitched at {difficulty} difficulty.

Input:
{payload}

Respond with a JSON object in exactly this format:
{{
    "summary": "A few paragraphs summarising the video",
    "keyTerms": ["8 to 12 important terms"],
    "quiz": {{
        "questions": [
            {{
                "prompt": "Question text",
                "options": ["Option 1", "Option 2", "Option 3", "Option 4"],
                "correctOptionIndex": 0,
                "explanation": "Why the correct option is right"
            }}
        ]
    }}
}}

Guidelines:
- Every question has exactly 4 options and correctOptionIndex is between 0 and 3
- Every question has a non-empty explanation
- Base every question on the transcript content{highlight_note}"#,
        difficulty = request.metadata.difficulty,
    ))
}
