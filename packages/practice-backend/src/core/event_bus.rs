use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::practice::ranker::TierBreakdown;

const CHANNEL_CAPACITY: usize = 1024;

/// Observable outcomes of practice sessions. Partial pools, recency fallbacks
/// and lost signal writes are reported here instead of failing the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PracticeEvent {
    #[serde(rename = "SESSION_STARTED")]
    SessionStarted(SessionStartedPayload),

    #[serde(rename = "PARTIAL_RESULT_RETURNED")]
    PartialResultReturned(SelectionOutcomePayload),

    #[serde(rename = "RECENCY_EXCLUSION_VIOLATED")]
    RecencyExclusionViolated(SelectionOutcomePayload),

    #[serde(rename = "ANSWER_RECORDED")]
    AnswerRecorded(AnswerRecordedPayload),

    #[serde(rename = "SIGNAL_PERSISTENCE_FAILED")]
    SignalPersistenceFailed(SignalPersistenceFailedPayload),

    #[serde(rename = "SESSION_ENDED")]
    SessionEnded(SessionEndedPayload),
}

impl PracticeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            PracticeEvent::SessionStarted(_) => "SESSION_STARTED",
            PracticeEvent::PartialResultReturned(_) => "PARTIAL_RESULT_RETURNED",
            PracticeEvent::RecencyExclusionViolated(_) => "RECENCY_EXCLUSION_VIOLATED",
            PracticeEvent::AnswerRecorded(_) => "ANSWER_RECORDED",
            PracticeEvent::SignalPersistenceFailed(_) => "SIGNAL_PERSISTENCE_FAILED",
            PracticeEvent::SessionEnded(_) => "SESSION_ENDED",
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            PracticeEvent::SessionStarted(p) => &p.user_id,
            PracticeEvent::PartialResultReturned(p) => &p.user_id,
            PracticeEvent::RecencyExclusionViolated(p) => &p.user_id,
            PracticeEvent::AnswerRecorded(p) => &p.user_id,
            PracticeEvent::SignalPersistenceFailed(p) => &p.user_id,
            PracticeEvent::SessionEnded(p) => &p.user_id,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            PracticeEvent::SessionStarted(p) => &p.session_id,
            PracticeEvent::PartialResultReturned(p) => &p.session_id,
            PracticeEvent::RecencyExclusionViolated(p) => &p.session_id,
            PracticeEvent::AnswerRecorded(p) => &p.session_id,
            PracticeEvent::SignalPersistenceFailed(p) => &p.session_id,
            PracticeEvent::SessionEnded(p) => &p.session_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartedPayload {
    pub user_id: String,
    pub session_id: String,
    pub requested_count: usize,
    pub delivered_count: usize,
    pub weak_area_mode: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionOutcomePayload {
    pub user_id: String,
    pub session_id: String,
    pub requested_count: usize,
    pub delivered_count: usize,
    pub pool_size: usize,
    pub breakdown: TierBreakdown,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecordedPayload {
    pub user_id: String,
    pub session_id: String,
    pub item_id: String,
    pub is_correct: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPersistenceFailedPayload {
    pub user_id: String,
    pub session_id: String,
    pub item_id: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndedPayload {
    pub user_id: String,
    pub session_id: String,
    pub questions_answered: i64,
    pub correct_answers: i64,
    pub duration_seconds: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub id: String,
    pub event: PracticeEvent,
    pub created_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(event: PracticeEvent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event,
            created_at: Utc::now(),
        }
    }
}

pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    event_count: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            event_count: AtomicU64::new(0),
        }
    }

    /// Fire-and-forget. Having no listeners is not an error.
    pub fn publish(&self, event: PracticeEvent) {
        let envelope = EventEnvelope::new(event);
        self.event_count.fetch_add(1, Ordering::Relaxed);

        let event_type = envelope.event.event_type();
        let user_id = envelope.event.user_id().to_string();
        let session_id = envelope.event.session_id().to_string();
        let sent_to = self.sender.send(envelope).unwrap_or(0);

        debug!(event_type, %user_id, %session_id, sent_to, "Event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            total_events: self.event_count(),
            subscriber_count: self.sender.receiver_count(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBusStats {
    pub total_events: u64,
    pub subscriber_count: usize,
}

/// Writes every published event to the `practice_events` tracing target as
/// one structured line. Runs until the bus is dropped.
pub fn spawn_event_log_sink(bus: &EventBus) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(envelope) => log_event(&envelope),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "practice_events", skipped, "event log sink lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(envelope: &EventEnvelope) {
    let payload = serde_json::to_string(&envelope.event).unwrap_or_default();
    let event_type = envelope.event.event_type();
    match &envelope.event {
        PracticeEvent::SignalPersistenceFailed(_) | PracticeEvent::RecencyExclusionViolated(_) => {
            warn!(target: "practice_events", event_id = %envelope.id, event_type, %payload, "practice event");
        }
        _ => {
            info!(target: "practice_events", event_id = %envelope.id, event_type, %payload, "practice event");
        }
    }
}
