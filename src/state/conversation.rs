mod core;
mod state;
mod streaming;


pub use state::{
    ConversationTurn, PendingSession, SessionEvent, SessionEventKind, SessionId, SessionOutcome,
    Speaker, StreamPhase, TranscriptAggregator, TranscriptUpdate, ASSISTANT_GREETING,
    STREAM_FAILURE_NOTICE,
};
