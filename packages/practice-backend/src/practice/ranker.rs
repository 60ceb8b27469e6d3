use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::config::SelectionConfig;
use super::types::{ContentItem, ContentItemId, DifficultyBias, UserItemSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    NeverSeen,
    Weak,
    EligibleSeen,
    RecentlyExcluded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectOptions {
    pub exclude_recent_days: u32,
    pub weak_area_mode: bool,
    pub weak_threshold: f64,
    pub weak_min_attempts: i64,
    pub difficulty_bias: Option<DifficultyBias>,
    pub already_delivered: HashSet<ContentItemId>,
}

impl SelectOptions {
    pub fn from_config(config: &SelectionConfig) -> Self {
        Self {
            exclude_recent_days: config.exclude_recent_days,
            weak_area_mode: false,
            weak_threshold: config.weak_threshold,
            weak_min_attempts: config.weak_min_attempts,
            difficulty_bias: None,
            already_delivered: HashSet::new(),
        }
    }
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self::from_config(&SelectionConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierBreakdown {
    pub never_seen: usize,
    pub weak: usize,
    pub eligible_seen: usize,
    pub recently_excluded: usize,
}

impl TierBreakdown {
    fn count(&mut self, tier: Tier) {
        match tier {
            Tier::NeverSeen => self.never_seen += 1,
            Tier::Weak => self.weak += 1,
            Tier::EligibleSeen => self.eligible_seen += 1,
            Tier::RecentlyExcluded => self.recently_excluded += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.never_seen + self.weak + self.eligible_seen + self.recently_excluded
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub items: Vec<ContentItemId>,
    pub partial: bool,
    pub recency_exclusion_violated: bool,
    pub breakdown: TierBreakdown,
}

/// Disjoint split of the undelivered pool. Seen tiers are already ordered
/// oldest-practiced first; `never_seen` is in pool order until drawn.
#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub never_seen: Vec<&'a ContentItem>,
    pub weak: Vec<&'a ContentItem>,
    pub eligible_seen: Vec<&'a ContentItem>,
    pub recently_excluded: Vec<&'a ContentItem>,
}

impl Partition<'_> {
    pub fn len(&self) -> usize {
        self.never_seen.len()
            + self.weak.len()
            + self.eligible_seen.len()
            + self.recently_excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn is_weak(signal: &UserItemSignal, options: &SelectOptions) -> bool {
    if signal.total_attempts < options.weak_min_attempts {
        return false;
    }
    signal
        .success_rate()
        .is_some_and(|rate| rate * 100.0 < options.weak_threshold)
}

fn is_recent(signal: &UserItemSignal, options: &SelectOptions, now: DateTime<Utc>) -> bool {
    if options.exclude_recent_days == 0 {
        return false;
    }
    let window = Duration::days(i64::from(options.exclude_recent_days));
    let Some(cutoff) = now.checked_sub_signed(window) else {
        // A window reaching past the representable range covers every attempt.
        return signal.last_attempt_at.is_some();
    };
    signal.last_attempt_at.is_some_and(|last| last > cutoff)
}

/// Weak items are reinforcement targets, so in weak-area mode they are not
/// held back by the recency window. Outside weak-area mode they are ordinary
/// seen items.
pub fn classify(
    signal: Option<&UserItemSignal>,
    options: &SelectOptions,
    now: DateTime<Utc>,
) -> Tier {
    let Some(signal) = signal.filter(|signal| !signal.is_never_seen()) else {
        return Tier::NeverSeen;
    };
    if options.weak_area_mode && is_weak(signal, options) {
        return Tier::Weak;
    }
    if is_recent(signal, options, now) {
        return Tier::RecentlyExcluded;
    }
    Tier::EligibleSeen
}

pub fn partition<'a>(
    pool: &'a [ContentItem],
    signals: &HashMap<ContentItemId, UserItemSignal>,
    options: &SelectOptions,
    now: DateTime<Utc>,
) -> Partition<'a> {
    let mut out = Partition::default();
    let mut seen_ids: HashSet<&str> = HashSet::with_capacity(pool.len());

    for item in pool {
        if options.already_delivered.contains(&item.id) || !seen_ids.insert(item.id.as_str()) {
            continue;
        }
        match classify(signals.get(&item.id), options, now) {
            Tier::NeverSeen => out.never_seen.push(item),
            Tier::Weak => out.weak.push(item),
            Tier::EligibleSeen => out.eligible_seen.push(item),
            Tier::RecentlyExcluded => out.recently_excluded.push(item),
        }
    }

    let last_attempt = |item: &ContentItem| signals.get(&item.id).and_then(|s| s.last_attempt_at);
    for tier in [
        &mut out.weak,
        &mut out.eligible_seen,
        &mut out.recently_excluded,
    ] {
        tier.sort_by(|a, b| {
            last_attempt(*a)
                .cmp(&last_attempt(*b))
                .then_with(|| a.id.cmp(&b.id))
        });
    }

    out
}

/// Stable split: items matching the bias first, the rest behind them as the
/// tier's own fallback.
fn apply_bias(tier: Vec<&ContentItem>, bias: Option<DifficultyBias>) -> Vec<&ContentItem> {
    let Some(bias) = bias else {
        return tier;
    };
    let (mut preferred, fallback): (Vec<_>, Vec<_>) =
        tier.into_iter().partition(|item| bias.admits(item.difficulty));
    preferred.extend(fallback);
    preferred
}

/// Draws up to `count` items: never-seen, then weak (weak-area mode only),
/// then eligible seen items. Recently practiced items are used only when the
/// other tiers cannot fill `count`, and doing so flags the result.
pub fn select<R: Rng + ?Sized>(
    pool: &[ContentItem],
    signals: &HashMap<ContentItemId, UserItemSignal>,
    count: usize,
    options: &SelectOptions,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Selection {
    let Partition {
        mut never_seen,
        weak,
        eligible_seen,
        recently_excluded,
    } = partition(pool, signals, options, now);

    never_seen.shuffle(rng);

    let bias = options.difficulty_bias;
    let ordered = [
        (Tier::NeverSeen, apply_bias(never_seen, bias)),
        (Tier::Weak, apply_bias(weak, bias)),
        (Tier::EligibleSeen, apply_bias(eligible_seen, bias)),
        (Tier::RecentlyExcluded, apply_bias(recently_excluded, bias)),
    ];

    let mut items = Vec::with_capacity(count);
    let mut breakdown = TierBreakdown::default();
    for (tier, candidates) in ordered {
        if items.len() >= count {
            break;
        }
        for item in candidates.into_iter().take(count - items.len()) {
            items.push(item.id.clone());
            breakdown.count(tier);
        }
    }

    Selection {
        partial: items.len() < count,
        recency_exclusion_violated: breakdown.recently_excluded > 0,
        items,
        breakdown,
    }
}
