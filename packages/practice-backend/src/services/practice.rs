use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::{
    AnswerRecordedPayload, EventBus, PracticeEvent, SelectionOutcomePayload, SessionEndedPayload,
    SessionStartedPayload, SignalPersistenceFailedPayload,
};
use crate::db::operations::{
    append_delivered_items, delete_session, increment_session_progress, insert_session,
    is_item_delivered, record_answer, select_answer_key, select_delivered_items, select_session,
    select_signals, SessionRow,
};
use crate::db::DatabaseProxy;
use crate::practice::config::{SelectionConfig, MAX_EXCLUDE_RECENT_DAYS};
use crate::practice::pool::{self, PoolConstraints};
use crate::practice::progress::{judge_answer, SessionProgress};
use crate::practice::ranker::{self, SelectOptions, Selection, TierBreakdown};
use crate::practice::types::{ContentItem, ContentItemId, DifficultyBias, TopicSelector};
use crate::services::scope::ScopeResolver;

#[derive(Debug, thiserror::Error)]
pub enum PracticeError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("no eligible content for the requested scope")]
    NoEligibleContent,
    #[error("session not found")]
    SessionNotFound,
    #[error("session belongs to another user")]
    Forbidden,
    #[error("item {0} was not delivered in this session")]
    ItemNotInSession(String),
    #[error("item not found: {0}")]
    ItemNotFound(String),
    #[error("stored session is unreadable: {0}")]
    InvalidSession(#[from] serde_json::Error),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

/// What a session was started with. Stored alongside the session so later
/// draws replay the same scope and constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlan {
    pub topics: TopicSelector,
    pub exclude_recent_days: u32,
    pub weak_area_mode: bool,
    pub constraints: PoolConstraints,
    pub difficulty_bias: Option<DifficultyBias>,
}

#[derive(Debug, Clone)]
pub struct StartSession {
    pub topics: TopicSelector,
    pub count: usize,
    pub exclude_recent_days: Option<u32>,
    pub weak_area_mode: bool,
    pub constraints: PoolConstraints,
    pub difficulty_bias: Option<DifficultyBias>,
    pub adaptive: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NextDraw {
    pub count: usize,
    pub difficulty_bias: Option<DifficultyBias>,
    pub already_delivered: Vec<ContentItemId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDraw {
    pub session_id: String,
    pub items: Vec<ContentItemId>,
    pub partial: bool,
    pub recency_exclusion_violated: bool,
    pub breakdown: TierBreakdown,
    pub difficulty_bias: Option<DifficultyBias>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub correct_answer: String,
    pub explanation: Option<String>,
    /// `None` when the counters could not be updated.
    pub session_progress: Option<SessionProgress>,
    pub saved: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub adaptive: bool,
    pub started_at: DateTime<Utc>,
    pub progress: SessionProgress,
    pub delivered_items: Vec<ContentItemId>,
    pub suggested_bias: Option<DifficultyBias>,
}

pub struct PracticeService {
    config: SelectionConfig,
    scope: Arc<ScopeResolver>,
    events: Arc<EventBus>,
}

impl PracticeService {
    pub fn new(config: SelectionConfig, scope: Arc<ScopeResolver>, events: Arc<EventBus>) -> Self {
        Self {
            config,
            scope,
            events,
        }
    }

    pub async fn start_session(
        &self,
        proxy: &DatabaseProxy,
        user_id: &str,
        input: StartSession,
    ) -> Result<SessionDraw, PracticeError> {
        self.validate_count(input.count)?;
        if input
            .exclude_recent_days
            .is_some_and(|days| days > MAX_EXCLUDE_RECENT_DAYS)
        {
            return Err(PracticeError::Validation(format!(
                "excludeRecentDays must be at most {MAX_EXCLUDE_RECENT_DAYS}"
            )));
        }
        if let TopicSelector::Many(topics) = &input.topics {
            if topics.is_empty() {
                return Err(PracticeError::Validation("topics must not be empty".to_string()));
            }
        }

        let plan = SessionPlan {
            topics: input.topics,
            exclude_recent_days: input
                .exclude_recent_days
                .unwrap_or(self.config.exclude_recent_days),
            weak_area_mode: input.weak_area_mode,
            constraints: input.constraints,
            difficulty_bias: input.difficulty_bias,
        };

        let candidates = self.eligible_pool(proxy, &plan).await?;
        if candidates.is_empty() {
            return Err(PracticeError::NoEligibleContent);
        }

        let options = self.select_options(&plan, plan.difficulty_bias, HashSet::new());
        let now = Utc::now();
        let selection = self
            .rank(proxy, user_id, &candidates, input.count, &options, now)
            .await?;

        let session = SessionRow {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            request: serde_json::to_string(&plan)?,
            adaptive: input.adaptive,
            questions_answered: 0,
            correct_answers: 0,
            started_at: now,
        };
        insert_session(proxy.pool(), &session, &selection.items).await?;

        info!(
            user_id,
            session_id = %session.id,
            requested = input.count,
            delivered = selection.items.len(),
            pool_size = candidates.len(),
            weak_area_mode = plan.weak_area_mode,
            "practice session started"
        );
        self.events
            .publish(PracticeEvent::SessionStarted(SessionStartedPayload {
                user_id: user_id.to_string(),
                session_id: session.id.clone(),
                requested_count: input.count,
                delivered_count: selection.items.len(),
                weak_area_mode: plan.weak_area_mode,
                timestamp: now,
            }));
        self.report_outcome(user_id, &session.id, input.count, candidates.len(), &selection, now);

        Ok(SessionDraw {
            session_id: session.id,
            items: selection.items,
            partial: selection.partial,
            recency_exclusion_violated: selection.recency_exclusion_violated,
            breakdown: selection.breakdown,
            difficulty_bias: options.difficulty_bias,
        })
    }

    /// Draws a follow-up batch. Never repeats an item already delivered in
    /// the session or listed by the client. An explicit bias wins; otherwise
    /// adaptive sessions take the bias suggested by their live accuracy.
    pub async fn draw_next(
        &self,
        proxy: &DatabaseProxy,
        user_id: &str,
        session_id: &str,
        input: NextDraw,
    ) -> Result<SessionDraw, PracticeError> {
        self.validate_count(input.count)?;
        let session = self.owned_session(proxy, user_id, session_id).await?;
        let plan: SessionPlan = serde_json::from_str(&session.request)?;

        let mut delivered: HashSet<ContentItemId> =
            select_delivered_items(proxy.pool(), session_id).await?.into_iter().collect();
        delivered.extend(input.already_delivered);

        let progress =
            SessionProgress::from_counts(session.questions_answered, session.correct_answers);
        let bias = input.difficulty_bias.or_else(|| {
            if session.adaptive {
                progress.suggested_bias(&self.config.adaptation)
            } else {
                plan.difficulty_bias
            }
        });

        let candidates = self.eligible_pool(proxy, &plan).await?;
        if candidates.is_empty() {
            return Err(PracticeError::NoEligibleContent);
        }

        let options = self.select_options(&plan, bias, delivered);
        let now = Utc::now();
        let selection = self
            .rank(proxy, user_id, &candidates, input.count, &options, now)
            .await?;

        append_delivered_items(proxy.pool(), session_id, &selection.items, now).await?;
        self.report_outcome(user_id, session_id, input.count, candidates.len(), &selection, now);

        Ok(SessionDraw {
            session_id: session.id,
            items: selection.items,
            partial: selection.partial,
            recency_exclusion_violated: selection.recency_exclusion_violated,
            breakdown: selection.breakdown,
            difficulty_bias: bias,
        })
    }

    /// The verdict is computed before any write. Failed writes are reported
    /// through `saved` and never discard the verdict.
    pub async fn submit_answer(
        &self,
        proxy: &DatabaseProxy,
        user_id: &str,
        session_id: &str,
        item_id: &str,
        user_answer: &str,
    ) -> Result<AnswerOutcome, PracticeError> {
        self.owned_session(proxy, user_id, session_id).await?;
        if !is_item_delivered(proxy.pool(), session_id, item_id).await? {
            return Err(PracticeError::ItemNotInSession(item_id.to_string()));
        }
        let key = select_answer_key(proxy.pool(), item_id)
            .await?
            .ok_or_else(|| PracticeError::ItemNotFound(item_id.to_string()))?;

        let is_correct = judge_answer(user_answer, &key.correct_answer);
        let now = Utc::now();

        let signal_saved = match record_answer(proxy.pool(), user_id, item_id, is_correct, now).await
        {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    user_id,
                    session_id,
                    item_id,
                    is_correct,
                    answered_at = %now.to_rfc3339(),
                    error = %err,
                    "failed to persist answer signal"
                );
                self.events
                    .publish(PracticeEvent::SignalPersistenceFailed(
                        SignalPersistenceFailedPayload {
                            user_id: user_id.to_string(),
                            session_id: session_id.to_string(),
                            item_id: item_id.to_string(),
                            error: err.to_string(),
                            timestamp: now,
                        },
                    ));
                false
            }
        };

        let session_progress = match increment_session_progress(proxy.pool(), session_id, is_correct)
            .await
        {
            Ok(Some(counts)) => Some(SessionProgress::from_counts(
                counts.questions_answered,
                counts.correct_answers,
            )),
            Ok(None) => {
                warn!(user_id, session_id, item_id, "session ended before progress update");
                None
            }
            Err(err) => {
                warn!(user_id, session_id, item_id, error = %err, "failed to update session progress");
                None
            }
        };

        if signal_saved {
            self.events
                .publish(PracticeEvent::AnswerRecorded(AnswerRecordedPayload {
                    user_id: user_id.to_string(),
                    session_id: session_id.to_string(),
                    item_id: item_id.to_string(),
                    is_correct,
                    timestamp: now,
                }));
        }

        Ok(AnswerOutcome {
            is_correct,
            correct_answer: key.correct_answer,
            explanation: key.explanation,
            saved: signal_saved && session_progress.is_some(),
            session_progress,
        })
    }

    pub async fn get_session(
        &self,
        proxy: &DatabaseProxy,
        user_id: &str,
        session_id: &str,
    ) -> Result<SessionSnapshot, PracticeError> {
        let session = self.owned_session(proxy, user_id, session_id).await?;
        self.snapshot(proxy, session).await
    }

    /// Discards the session and returns its final progress. Per-user signals
    /// recorded during the session are kept.
    pub async fn end_session(
        &self,
        proxy: &DatabaseProxy,
        user_id: &str,
        session_id: &str,
    ) -> Result<SessionSnapshot, PracticeError> {
        let session = self.owned_session(proxy, user_id, session_id).await?;
        let snapshot = self.snapshot(proxy, session).await?;

        if !delete_session(proxy.pool(), session_id).await? {
            return Err(PracticeError::SessionNotFound);
        }

        let now = Utc::now();
        info!(
            user_id,
            session_id,
            answered = snapshot.progress.questions_answered,
            accuracy = snapshot.progress.accuracy_percentage,
            "practice session ended"
        );
        self.events
            .publish(PracticeEvent::SessionEnded(SessionEndedPayload {
                user_id: user_id.to_string(),
                session_id: session_id.to_string(),
                questions_answered: snapshot.progress.questions_answered,
                correct_answers: snapshot.progress.correct_answers,
                duration_seconds: (now - snapshot.started_at).num_seconds().max(0),
                timestamp: now,
            }));

        Ok(snapshot)
    }

    fn validate_count(&self, count: usize) -> Result<(), PracticeError> {
        if count == 0 {
            return Err(PracticeError::Validation("count must be at least 1".to_string()));
        }
        if count > self.config.max_count {
            return Err(PracticeError::Validation(format!(
                "count must not exceed {}",
                self.config.max_count
            )));
        }
        Ok(())
    }

    fn select_options(
        &self,
        plan: &SessionPlan,
        difficulty_bias: Option<DifficultyBias>,
        already_delivered: HashSet<ContentItemId>,
    ) -> SelectOptions {
        SelectOptions {
            exclude_recent_days: plan.exclude_recent_days,
            weak_area_mode: plan.weak_area_mode,
            difficulty_bias,
            already_delivered,
            ..SelectOptions::from_config(&self.config)
        }
    }

    async fn eligible_pool(
        &self,
        proxy: &DatabaseProxy,
        plan: &SessionPlan,
    ) -> Result<Vec<ContentItem>, PracticeError> {
        let items = self.scope.resolve(proxy, &plan.topics).await?;
        Ok(pool::filter(&items, &plan.constraints))
    }

    async fn rank(
        &self,
        proxy: &DatabaseProxy,
        user_id: &str,
        candidates: &[ContentItem],
        count: usize,
        options: &SelectOptions,
        now: DateTime<Utc>,
    ) -> Result<Selection, PracticeError> {
        let ids: Vec<ContentItemId> = candidates.iter().map(|item| item.id.clone()).collect();
        let signals = select_signals(proxy.pool(), user_id, &ids).await?;
        let selection = {
            let mut rng = rand::rng();
            ranker::select(candidates, &signals, count, options, now, &mut rng)
        };
        Ok(selection)
    }

    async fn owned_session(
        &self,
        proxy: &DatabaseProxy,
        user_id: &str,
        session_id: &str,
    ) -> Result<SessionRow, PracticeError> {
        let session = select_session(proxy.pool(), session_id)
            .await?
            .ok_or(PracticeError::SessionNotFound)?;
        if session.user_id != user_id {
            return Err(PracticeError::Forbidden);
        }
        Ok(session)
    }

    async fn snapshot(
        &self,
        proxy: &DatabaseProxy,
        session: SessionRow,
    ) -> Result<SessionSnapshot, PracticeError> {
        let delivered_items = select_delivered_items(proxy.pool(), &session.id).await?;
        let progress =
            SessionProgress::from_counts(session.questions_answered, session.correct_answers);
        let suggested_bias = if session.adaptive {
            progress.suggested_bias(&self.config.adaptation)
        } else {
            None
        };
        Ok(SessionSnapshot {
            session_id: session.id,
            adaptive: session.adaptive,
            started_at: session.started_at,
            progress,
            delivered_items,
            suggested_bias,
        })
    }

    fn report_outcome(
        &self,
        user_id: &str,
        session_id: &str,
        requested: usize,
        pool_size: usize,
        selection: &Selection,
        now: DateTime<Utc>,
    ) {
        let payload = || SelectionOutcomePayload {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            requested_count: requested,
            delivered_count: selection.items.len(),
            pool_size,
            breakdown: selection.breakdown,
            timestamp: now,
        };

        if selection.partial {
            warn!(
                user_id,
                session_id,
                requested,
                delivered = selection.items.len(),
                pool_size,
                "partial result returned"
            );
            self.events.publish(PracticeEvent::PartialResultReturned(payload()));
        }
        if selection.recency_exclusion_violated {
            warn!(
                user_id,
                session_id,
                recently_excluded = selection.breakdown.recently_excluded,
                "recency exclusion relaxed to fill request"
            );
            self.events.publish(PracticeEvent::RecencyExclusionViolated(payload()));
        }
    }
}
