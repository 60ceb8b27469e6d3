use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::core::EventBus;
use crate::db::DatabaseProxy;
use crate::practice::config::SelectionConfig;
use crate::services::{PracticeService, ScopeResolver};

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    db_proxy: Option<Arc<DatabaseProxy>>,
    scope: Arc<ScopeResolver>,
    events: Arc<EventBus>,
    practice: Arc<PracticeService>,
}

impl AppState {
    pub fn new(db_proxy: Option<Arc<DatabaseProxy>>, selection: SelectionConfig) -> Self {
        let scope = Arc::new(ScopeResolver::new());
        let events = Arc::new(EventBus::new());
        let practice = Arc::new(PracticeService::new(
            selection,
            Arc::clone(&scope),
            Arc::clone(&events),
        ));
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            db_proxy,
            scope,
            events,
            practice,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn db_proxy(&self) -> Option<Arc<DatabaseProxy>> {
        self.db_proxy.clone()
    }

    pub fn scope(&self) -> Arc<ScopeResolver> {
        Arc::clone(&self.scope)
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn practice(&self) -> Arc<PracticeService> {
        Arc::clone(&self.practice)
    }
}
