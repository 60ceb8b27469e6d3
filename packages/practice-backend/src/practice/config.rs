use serde::{Deserialize, Serialize};

pub const DEFAULT_WEAK_THRESHOLD: f64 = 60.0;
pub const DEFAULT_WEAK_MIN_ATTEMPTS: i64 = 2;
pub const DEFAULT_EXCLUDE_RECENT_DAYS: u32 = 15;
pub const DEFAULT_MAX_COUNT: usize = 100;
/// Longest recency window accepted from requests or the environment.
pub const MAX_EXCLUDE_RECENT_DAYS: u32 = 3650;

/// Selection thresholds passed explicitly into every ranking call.
///
/// `weak_threshold` is a percentage: an item is weak when its success rate
/// times 100 is strictly below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionConfig {
    pub weak_threshold: f64,
    pub weak_min_attempts: i64,
    pub exclude_recent_days: u32,
    pub max_count: usize,
    pub adaptation: AdaptationConfig,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            weak_threshold: DEFAULT_WEAK_THRESHOLD,
            weak_min_attempts: DEFAULT_WEAK_MIN_ATTEMPTS,
            exclude_recent_days: DEFAULT_EXCLUDE_RECENT_DAYS,
            max_count: DEFAULT_MAX_COUNT,
            adaptation: AdaptationConfig::default(),
        }
    }
}

impl SelectionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            weak_threshold: env_f64("PRACTICE_WEAK_THRESHOLD", defaults.weak_threshold)
                .clamp(0.0, 100.0),
            weak_min_attempts: env_i64("PRACTICE_WEAK_MIN_ATTEMPTS", defaults.weak_min_attempts)
                .max(1),
            exclude_recent_days: env_u32(
                "PRACTICE_EXCLUDE_RECENT_DAYS",
                defaults.exclude_recent_days,
            )
            .min(MAX_EXCLUDE_RECENT_DAYS),
            max_count: env_usize("PRACTICE_MAX_COUNT", defaults.max_count).max(1),
            adaptation: AdaptationConfig::from_env(),
        }
    }
}

/// Thresholds turning live session accuracy into a difficulty bias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptationConfig {
    pub min_answers: i64,
    pub harder_above: f64,
    pub easier_below: f64,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            min_answers: 3,
            harder_above: 80.0,
            easier_below: 50.0,
        }
    }
}

impl AdaptationConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_answers: env_i64("PRACTICE_ADAPT_MIN_ANSWERS", defaults.min_answers).max(1),
            harder_above: env_f64("PRACTICE_ADAPT_HARDER_ABOVE", defaults.harder_above),
            easier_below: env_f64("PRACTICE_ADAPT_EASIER_BELOW", defaults.easier_below),
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}
