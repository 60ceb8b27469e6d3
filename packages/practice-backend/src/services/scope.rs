use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::db::operations::{
    select_items_by_source_units, select_item, select_scope_fingerprint, select_scope_units,
    select_source_units, select_topics, ScopeFingerprint,
};
use crate::db::DatabaseProxy;
use crate::practice::scope::ScopeIndex;
use crate::practice::types::{ContentItem, TopicId, TopicSelector};

struct CachedIndex {
    fingerprint: ScopeFingerprint,
    index: Arc<ScopeIndex>,
}

/// Topic-to-unit index shared across requests. Rebuilt only when the
/// curriculum tables change, which the fingerprint detects.
#[derive(Default)]
pub struct ScopeResolver {
    cached: RwLock<Option<CachedIndex>>,
}

impl ScopeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn index(&self, proxy: &DatabaseProxy) -> Result<Arc<ScopeIndex>, sqlx::Error> {
        let pool = proxy.pool();
        let fingerprint = select_scope_fingerprint(pool).await?;

        let hit = {
            let guard = self.cached.read();
            guard
                .as_ref()
                .filter(|cached| cached.fingerprint == fingerprint)
                .map(|cached| Arc::clone(&cached.index))
        };
        if let Some(index) = hit {
            return Ok(index);
        }

        let topics = select_topics(pool).await?;
        let scope_units = select_scope_units(pool).await?;
        let source_units = select_source_units(pool).await?;
        let index = Arc::new(ScopeIndex::build(&topics, &scope_units, &source_units));

        debug!(
            topics = index.topic_count(),
            mapped_units = index.mapped_unit_count(),
            "scope index rebuilt"
        );

        *self.cached.write() = Some(CachedIndex {
            fingerprint,
            index: Arc::clone(&index),
        });
        Ok(index)
    }

    /// Content items of every source unit covered by the selected topics,
    /// before any eligibility filtering.
    pub async fn resolve(
        &self,
        proxy: &DatabaseProxy,
        selector: &TopicSelector,
    ) -> Result<Vec<ContentItem>, sqlx::Error> {
        let index = self.index(proxy).await?;
        let units: Vec<String> = index.source_units_for(selector).into_iter().collect();
        if units.is_empty() {
            return Ok(Vec::new());
        }
        select_items_by_source_units(proxy.pool(), &units).await
    }

    /// Reverse lookup: every topic whose scope covers the item's source unit.
    /// `None` when the item does not exist.
    pub async fn topics_for_item(
        &self,
        proxy: &DatabaseProxy,
        item_id: &str,
    ) -> Result<Option<BTreeSet<TopicId>>, sqlx::Error> {
        let Some(item) = select_item(proxy.pool(), item_id).await? else {
            return Ok(None);
        };
        let index = self.index(proxy).await?;
        Ok(Some(index.topics_for_unit(&item.source_unit_id)))
    }
}
