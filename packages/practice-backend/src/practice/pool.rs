use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::ContentItem;

/// Hard constraints applied before ranking. Each flag is independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConstraints {
    pub active_only: bool,
    pub exclude_flagged_review: bool,
    pub official_only: bool,
    pub essential_only: bool,
}

impl Default for PoolConstraints {
    fn default() -> Self {
        Self {
            active_only: true,
            exclude_flagged_review: true,
            official_only: false,
            essential_only: false,
        }
    }
}

impl PoolConstraints {
    pub fn admits(&self, item: &ContentItem) -> bool {
        if self.active_only && !item.is_active {
            return false;
        }
        if self.exclude_flagged_review && item.review_status.is_defective() {
            return false;
        }
        if self.official_only && !item.is_official {
            return false;
        }
        if self.essential_only && !item.is_essential {
            return false;
        }
        true
    }
}

/// Deduplicated by id and ordered by id, so equal inputs give equal pools.
pub fn filter(items: &[ContentItem], constraints: &PoolConstraints) -> Vec<ContentItem> {
    let mut by_id: BTreeMap<&str, &ContentItem> = BTreeMap::new();
    for item in items.iter().filter(|item| constraints.admits(item)) {
        by_id.entry(item.id.as_str()).or_insert(item);
    }
    by_id.into_values().cloned().collect()
}
