//! Local study-module heuristics used when the generation service is
//! unavailable or its answer cannot be used.
//!
//! Everything here is a pure function of the transcript, so the same input
//! always yields the same module (apart from `generated_at`).

use chrono::Utc;
use std::collections::HashMap;

use crate::models::{ModuleSource, QuizDefinition, QuizQuestion, StudyModule, TranscriptSegment};

pub const MAX_KEY_TERMS: usize = 8;
const SEGMENT_EXCERPT_CHARS: usize = 200;
const OPENING_SEGMENTS: usize = 3;
const CLOSING_SEGMENTS: usize = 2;
const MIN_TERM_CHARS: usize = 5;
const CONTENT_TYPE_MIN_SEGMENTS: usize = 6;

const STOP_WORDS: &[&str] = &[
    "about", "actually", "after", "again", "already", "always", "another", "because", "before",
    "being", "could", "doing", "every", "going", "gonna", "little", "maybe", "other", "really",
    "right", "should", "something", "their", "there", "these", "thing", "things", "think",
    "those", "through", "wanna", "where", "which", "while", "would",
];

/// Build a degraded but schema-valid module from the transcript alone.
/// The transcript must not be empty.
pub fn generate(transcript: &[TranscriptSegment]) -> StudyModule {
    StudyModule {
        summary: build_summary(transcript),
        key_terms: extract_key_terms(transcript),
        quiz: build_quiz(transcript.len()),
        source: ModuleSource::Fallback,
        generated_at: Utc::now(),
    }
}

pub fn build_summary(transcript: &[TranscriptSegment]) -> String {
    let count = transcript.len();
    let opening = excerpt(transcript.iter().take(OPENING_SEGMENTS));
    let closing = excerpt(transcript.iter().skip(count.saturating_sub(CLOSING_SEGMENTS)));

    format!(
        "This video contains {} segments of content. It opens with: \"{}\" and wraps up with: \"{}\". \
         Review the key terms below and take the quiz to check your understanding.",
        count, opening, closing
    )
}

fn excerpt<'a>(segments: impl Iterator<Item = &'a TranscriptSegment>) -> String {
    segments
        .map(|segment| truncate_chars(segment.text.trim(), SEGMENT_EXCERPT_CHARS))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// The most frequent long words, most frequent first; ties keep the order
/// in which the words first appear.
pub fn extract_key_terms(transcript: &[TranscriptSegment]) -> Vec<String> {
    // word -> (count, first position)
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut position = 0;

    for segment in transcript {
        for raw in segment.text.split_whitespace() {
            let word = raw
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.chars().count() < MIN_TERM_CHARS
                || !word.chars().all(char::is_alphabetic)
                || STOP_WORDS.contains(&word.as_str())
            {
                continue;
            }
            counts.entry(word).or_insert((0, position)).0 += 1;
            position += 1;
        }
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(MAX_KEY_TERMS)
        .map(|(word, _, _)| word)
        .collect()
}

pub fn build_quiz(segment_count: usize) -> QuizDefinition {
    let mut questions = vec![
        QuizQuestion {
            prompt: "What is discussed at the beginning of this video?".to_string(),
            options: vec![
                "An introduction to the main topic".to_string(),
                "The final conclusions".to_string(),
                "A list of credits".to_string(),
                "An unrelated advertisement".to_string(),
            ],
            correct_option_index: 0,
            explanation: "The opening segments introduce the topic that the rest of the video builds on."
                .to_string(),
        },
        QuizQuestion {
            prompt: "How many transcript segments does this video contain?".to_string(),
            options: vec![
                format!("{} segments", segment_count),
                format!("{} segments", segment_count + 10),
                format!("{} segments", segment_count * 3 + 5),
                "The transcript has no segments".to_string(),
            ],
            correct_option_index: 0,
            explanation: format!(
                "The transcript is split into {} timed segments.",
                segment_count
            ),
        },
    ];

    if segment_count >= CONTENT_TYPE_MIN_SEGMENTS {
        questions.push(QuizQuestion {
            prompt: "What type of content is this?".to_string(),
            options: vec![
                "Educational or informational content".to_string(),
                "A music video without speech".to_string(),
                "A silent film".to_string(),
                "A still image slideshow".to_string(),
            ],
            correct_option_index: 0,
            explanation: "The video carries a spoken transcript explaining its subject, which marks it as educational or informational."
                .to_string(),
        });
    }

    QuizDefinition { questions }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(texts: &[&str]) -> Vec<TranscriptSegment> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| TranscriptSegment::new(*text, i as f64 * 5.0))
            .collect()
    }

    #[test]
    fn test_key_terms_ranked_by_frequency_then_first_seen() {
        let segments = transcript(&[
            "Closures capture variables. Traits describe behaviour.",
            "Closures borrow or move. Traits again, closures everywhere.",
            "Lifetimes matter",
        ]);

        let terms = extract_key_terms(&segments);
        assert_eq!(
            terms,
            vec!["closures", "traits", "capture", "variables", "describe", "behaviour", "borrow", "everywhere"]
        );
    }

    #[test]
    fn test_key_terms_filters_short_stop_and_non_alphabetic_words() {
        let segments = transcript(&["the rust2024 edition would really change things, about 1000 items"]);
        let terms = extract_key_terms(&segments);
        assert_eq!(terms, vec!["edition", "change", "items"]);
    }

    #[test]
    fn test_key_terms_deterministic() {
        let segments = transcript(&[
            "alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima",
            "mike november oscar papa quebec romeo sierra tango uniform victor whiskey",
        ]);
        let first = extract_key_terms(&segments);
        for _ in 0..5 {
            assert_eq!(extract_key_terms(&segments), first);
        }
        assert_eq!(first.len(), MAX_KEY_TERMS);
    }

    #[test]
    fn test_summary_uses_opening_and_closing_segments() {
        let segments = transcript(&["one", "two", "three", "four", "five", "six"]);
        let summary = build_summary(&segments);

        assert!(summary.contains("6 segments of content"));
        assert!(summary.contains("\"one two three\""));
        assert!(summary.contains("\"five six\""));
        assert!(!summary.contains("four"));
    }

    #[test]
    fn test_summary_truncates_long_segments() {
        let long = "é".repeat(250);
        let segments = transcript(&[long.as_str()]);
        let summary = build_summary(&segments);

        assert!(summary.contains(&"é".repeat(200)));
        assert!(!summary.contains(&"é".repeat(201)));
    }

    #[test]
    fn test_quiz_shape_depends_on_segment_count() {
        assert_eq!(build_quiz(5).questions.len(), 2);

        let quiz = build_quiz(6);
        assert_eq!(quiz.questions.len(), 3);
        assert_eq!(quiz.questions[1].options[0], "6 segments");
        assert_eq!(quiz.questions[2].prompt, "What type of content is this?");
    }

    #[test]
    fn test_fallback_module_is_valid() {
        for count in 1..=12 {
            let texts: Vec<String> = (0..count).map(|i| format!("segment number {}", i)).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let module = generate(&transcript(&refs));
            assert!(module.validate().is_ok(), "count {}", count);
            assert_eq!(module.source, ModuleSource::Fallback);
        }
    }
}
