mod event_bus;

pub use event_bus::{
    AnswerRecordedPayload, EventBus, EventBusStats, EventEnvelope, PracticeEvent,
    SelectionOutcomePayload, SessionEndedPayload, SessionStartedPayload,
    SignalPersistenceFailedPayload, spawn_event_log_sink,
};
