use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::StudyError;
use crate::log_quiz_transition;
use crate::models::{QuizOutcome, QuizQuestion, StudyModule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QuizState {
    Presenting { index: usize },
    AnswerSelected { index: usize, choice: usize },
    Feedback { index: usize, choice: usize, correct: bool },
    Complete { score: usize, total: usize },
}

impl fmt::Display for QuizState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuizState::Presenting { index } => write!(f, "presenting question {}", index + 1),
            QuizState::AnswerSelected { index, choice } => {
                write!(f, "answer {} selected for question {}", choice, index + 1)
            }
            QuizState::Feedback { index, correct, .. } => write!(
                f,
                "showing {} feedback for question {}",
                if *correct { "correct" } else { "incorrect" },
                index + 1
            ),
            QuizState::Complete { score, total } => write!(f, "complete ({}/{})", score, total),
        }
    }
}

/// Walks a learner through one study module's questions in order.
#[derive(Debug, Clone)]
pub struct QuizSession {
    module: StudyModule,
    state: QuizState,
    score: usize,
}

impl QuizSession {
    /// Only modules that pass `StudyModule::validate` can be quizzed; a
    /// module handed in by the caller is bad input, not a service fault.
    pub fn new(module: StudyModule) -> Result<Self, StudyError> {
        module
            .validate()
            .map_err(|e| StudyError::InvalidInput(format!("study module rejected: {}", e)))?;
        Ok(Self {
            module,
            state: QuizState::Presenting { index: 0 },
            score: 0,
        })
    }

    pub fn state(&self) -> QuizState {
        self.state
    }

    pub fn module(&self) -> &StudyModule {
        &self.module
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn total_questions(&self) -> usize {
        self.module.quiz.questions.len()
    }

    /// The question on screen, or `None` once the quiz is complete
    pub fn current_question(&self) -> Option<&QuizQuestion> {
        match self.state {
            QuizState::Presenting { index }
            | QuizState::AnswerSelected { index, .. }
            | QuizState::Feedback { index, .. } => self.module.quiz.questions.get(index),
            QuizState::Complete { .. } => None,
        }
    }

    /// Fraction of questions answered, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        let answered = match self.state {
            QuizState::Presenting { index } | QuizState::AnswerSelected { index, .. } => index,
            QuizState::Feedback { index, .. } => index + 1,
            QuizState::Complete { total, .. } => total,
        };
        answered as f64 / self.total_questions() as f64
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, QuizState::Complete { .. })
    }

    pub fn outcome(&self) -> Option<QuizOutcome> {
        match self.state {
            QuizState::Complete { score, total } => Some(QuizOutcome {
                score,
                total,
                percentage: (score as f64 / total as f64 * 100.0).round(),
            }),
            _ => None,
        }
    }

    pub fn select_option(&mut self, choice: usize) -> Result<QuizState, StudyError> {
        let index = match self.state {
            QuizState::Presenting { index } | QuizState::AnswerSelected { index, .. } => index,
            state => return Err(invalid("select an option", state)),
        };
        if choice >= StudyModule::OPTIONS_PER_QUESTION {
            return Err(StudyError::InvalidInput(format!(
                "option {} is out of range 0..{}",
                choice,
                StudyModule::OPTIONS_PER_QUESTION
            )));
        }

        self.transition("select_option", QuizState::AnswerSelected { index, choice });
        Ok(self.state)
    }

    pub fn submit(&mut self) -> Result<QuizState, StudyError> {
        let QuizState::AnswerSelected { index, choice } = self.state else {
            return Err(invalid("submit", self.state));
        };

        let correct = self.module.quiz.questions[index].correct_option_index == choice;
        if correct {
            self.score += 1;
        }

        self.transition("submit", QuizState::Feedback { index, choice, correct });
        Ok(self.state)
    }

    pub fn advance(&mut self) -> Result<QuizState, StudyError> {
        let QuizState::Feedback { index, .. } = self.state else {
            return Err(invalid("advance", self.state));
        };

        let next = if index + 1 >= self.total_questions() {
            QuizState::Complete {
                score: self.score,
                total: self.total_questions(),
            }
        } else {
            QuizState::Presenting { index: index + 1 }
        };

        self.transition("advance", next);
        Ok(self.state)
    }

    /// Start over from the first question; allowed from any state.
    pub fn retake(&mut self) -> QuizState {
        self.score = 0;
        self.transition("retake", QuizState::Presenting { index: 0 });
        self.state
    }

    fn transition(&mut self, operation: &str, next: QuizState) {
        log_quiz_transition!(operation, from = self.state, to = next);
        self.state = next;
    }
}

fn invalid(operation: &'static str, state: QuizState) -> StudyError {
    StudyError::InvalidTransition {
        operation,
        state: state.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModuleSource, QuizDefinition};
    use chrono::Utc;

    fn create_test_module() -> StudyModule {
        let questions = [2, 0, 3]
            .into_iter()
            .enumerate()
            .map(|(i, correct)| QuizQuestion {
                prompt: format!("Question {}", i + 1),
                options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
                correct_option_index: correct,
                explanation: format!("Because of reason {}", i + 1),
            })
            .collect();

        StudyModule {
            summary: "Three questions about borrowing".to_string(),
            key_terms: vec!["borrow".to_string()],
            quiz: QuizDefinition { questions },
            source: ModuleSource::Generated,
            generated_at: Utc::now(),
        }
    }

    fn answer(session: &mut QuizSession, choice: usize) -> QuizState {
        session.select_option(choice).unwrap();
        session.submit().unwrap()
    }

    #[test]
    fn test_full_run_counts_correct_answers() {
        let mut session = QuizSession::new(create_test_module()).unwrap();
        assert_eq!(session.state(), QuizState::Presenting { index: 0 });

        assert_eq!(
            answer(&mut session, 2),
            QuizState::Feedback { index: 0, choice: 2, correct: true }
        );
        assert_eq!(session.advance().unwrap(), QuizState::Presenting { index: 1 });

        assert_eq!(
            answer(&mut session, 1),
            QuizState::Feedback { index: 1, choice: 1, correct: false }
        );
        session.advance().unwrap();

        answer(&mut session, 3);
        assert_eq!(session.advance().unwrap(), QuizState::Complete { score: 2, total: 3 });

        let outcome = session.outcome().unwrap();
        assert_eq!(outcome.score, 2);
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.percentage, 67.0);
        assert!(session.current_question().is_none());
    }

    #[test]
    fn test_always_choosing_zero() {
        let mut session = QuizSession::new(create_test_module()).unwrap();
        for _ in 0..3 {
            answer(&mut session, 0);
            session.advance().unwrap();
        }
        // Only the second question has option 0 as its answer
        assert_eq!(session.state(), QuizState::Complete { score: 1, total: 3 });
    }

    #[test]
    fn test_selection_can_change_before_submit() {
        let mut session = QuizSession::new(create_test_module()).unwrap();
        session.select_option(1).unwrap();
        session.select_option(2).unwrap();
        assert_eq!(
            session.submit().unwrap(),
            QuizState::Feedback { index: 0, choice: 2, correct: true }
        );
        assert_eq!(session.score(), 1);
    }

    #[test]
    fn test_out_of_range_choice_rejected() {
        let mut session = QuizSession::new(create_test_module()).unwrap();
        assert!(matches!(session.select_option(4), Err(StudyError::InvalidInput(_))));
        assert_eq!(session.state(), QuizState::Presenting { index: 0 });
    }

    #[test]
    fn test_transitions_cannot_skip_feedback() {
        let mut session = QuizSession::new(create_test_module()).unwrap();

        assert!(matches!(session.submit(), Err(StudyError::InvalidTransition { .. })));
        assert!(matches!(session.advance(), Err(StudyError::InvalidTransition { .. })));

        session.select_option(0).unwrap();
        assert!(matches!(session.advance(), Err(StudyError::InvalidTransition { .. })));

        session.submit().unwrap();
        assert!(matches!(session.select_option(1), Err(StudyError::InvalidTransition { .. })));
        assert!(matches!(session.submit(), Err(StudyError::InvalidTransition { .. })));
    }

    #[test]
    fn test_retake_resets_without_touching_module() {
        let module = create_test_module();
        let mut session = QuizSession::new(module.clone()).unwrap();
        for choice in [2, 0, 3] {
            answer(&mut session, choice);
            session.advance().unwrap();
        }
        assert_eq!(session.state(), QuizState::Complete { score: 3, total: 3 });

        assert_eq!(session.retake(), QuizState::Presenting { index: 0 });
        assert_eq!(session.score(), 0);
        assert_eq!(session.module(), &module);
        assert_eq!(session.current_question().unwrap().prompt, "Question 1");
    }

    #[test]
    fn test_retake_mid_session() {
        let mut session = QuizSession::new(create_test_module()).unwrap();
        answer(&mut session, 2);
        session.advance().unwrap();
        session.select_option(1).unwrap();

        session.retake();
        assert_eq!(session.state(), QuizState::Presenting { index: 0 });
        assert_eq!(session.score(), 0);
    }

    #[test]
    fn test_progress() {
        let mut session = QuizSession::new(create_test_module()).unwrap();
        assert_eq!(session.progress(), 0.0);

        answer(&mut session, 0);
        assert!((session.progress() - 1.0 / 3.0).abs() < f64::EPSILON);

        session.advance().unwrap();
        answer(&mut session, 0);
        session.advance().unwrap();
        answer(&mut session, 0);
        session.advance().unwrap();
        assert_eq!(session.progress(), 1.0);
    }

    #[test]
    fn test_empty_module_rejected() {
        let mut module = create_test_module();
        module.quiz.questions.clear();
        assert!(matches!(QuizSession::new(module), Err(StudyError::InvalidInput(_))));
    }

    #[test]
    fn test_malformed_module_rejected() {
        let mut module = create_test_module();
        module.quiz.questions[1].options.truncate(2);
        module.quiz.questions[1].correct_option_index = 7;

        let Err(StudyError::InvalidInput(message)) = QuizSession::new(module) else {
            panic!("expected a malformed module to be rejected");
        };
        assert!(message.contains("question 2"), "message: {}", message);

        let mut module = create_test_module();
        module.quiz.questions[0].explanation = "  ".to_string();
        assert!(matches!(QuizSession::new(module), Err(StudyError::InvalidInput(_))));

        let mut module = create_test_module();
        module.summary.clear();
        assert!(matches!(QuizSession::new(module), Err(StudyError::InvalidInput(_))));
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let json = serde_json::to_value(QuizState::Feedback { index: 1, choice: 2, correct: false }).unwrap();
        assert_eq!(json["state"], "feedback");
        assert_eq!(json["index"], 1);
        assert_eq!(json["correct"], false);
    }
}
