use serde::{Deserialize, Serialize};

use super::config::AdaptationConfig;
use super::types::DifficultyBias;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub questions_answered: i64,
    pub correct_answers: i64,
    pub accuracy_percentage: f64,
}

impl SessionProgress {
    pub fn from_counts(questions_answered: i64, correct_answers: i64) -> Self {
        Self {
            questions_answered,
            correct_answers,
            accuracy_percentage: accuracy_percentage(questions_answered, correct_answers),
        }
    }

    /// Live difficulty bias for the next draw of an adaptive session.
    pub fn suggested_bias(&self, config: &AdaptationConfig) -> Option<DifficultyBias> {
        if self.questions_answered < config.min_answers {
            return None;
        }
        if self.accuracy_percentage >= config.harder_above {
            Some(DifficultyBias::Harder)
        } else if self.accuracy_percentage <= config.easier_below {
            Some(DifficultyBias::Easier)
        } else {
            None
        }
    }
}

/// Rounded to two decimals; zero before the first answer.
pub fn accuracy_percentage(questions_answered: i64, correct_answers: i64) -> f64 {
    if questions_answered <= 0 {
        return 0.0;
    }
    let raw = correct_answers as f64 / questions_answered as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Compares a submitted answer with the stored key, ignoring case and
/// surrounding or repeated whitespace.
pub fn judge_answer(user_answer: &str, correct_answer: &str) -> bool {
    normalize_answer(user_answer) == normalize_answer(correct_answer)
}

fn normalize_answer(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
