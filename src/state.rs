mod conversation;

pub use conversation::{
    ConversationTurn, PendingSession, SessionEvent, SessionEventKind, SessionId, SessionOutcome,
    Speaker, StreamPhase, TranscriptAggregator, TranscriptUpdate, ASSISTANT_GREETING,
    STREAM_FAILURE_NOTICE,
};
