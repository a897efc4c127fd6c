use crate::api::ApiClient;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const ASSISTANT_GREETING: &str =
    "Hello! I am your creative assistant. How can I help you with your art today?";
pub const STREAM_FAILURE_NOTICE: &str =
    "Sorry, I encountered an error. Please check your API key and connection.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.speaker == Speaker::User
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(super) u64);

impl SessionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Where the transcript stands relative to its one permitted open session.
///
/// `Settled` and `Failed` are instantaneous: they are recorded as the last
/// [`SessionOutcome`] and the phase drops straight back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    AwaitingFirstFragment(SessionId),
    Streaming(SessionId),
    /// Torn down; every later event is ignored.
    Closed,
}

impl StreamPhase {
    pub fn open_session(self) -> Option<SessionId> {
        match self {
            StreamPhase::AwaitingFirstFragment(id) | StreamPhase::Streaming(id) => Some(id),
            StreamPhase::Idle | StreamPhase::Closed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Settled,
    Failed,
}

/// Published to observers after every transcript change.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptUpdate {
    Republished(Vec<ConversationTurn>),
    Settled { session: SessionId },
    Failed { session: SessionId, error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEventKind {
    Fragment(String),
    End,
    Error(String),
}

/// One item delivered by a session pump, tagged with the session it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub kind: SessionEventKind,
}

impl SessionEvent {
    pub fn fragment(session: SessionId, text: impl Into<String>) -> Self {
        Self {
            session,
            kind: SessionEventKind::Fragment(text.into()),
        }
    }

    pub fn end(session: SessionId) -> Self {
        Self {
            session,
            kind: SessionEventKind::End,
        }
    }

    pub fn error(session: SessionId, error: impl Into<String>) -> Self {
        Self {
            session,
            kind: SessionEventKind::Error(error.into()),
        }
    }
}

/// Everything needed to open the upstream stream for an accepted submission.
#[derive(Debug, Clone)]
pub struct PendingSession {
    pub id: SessionId,
    pub message: String,
    /// Turns that preceded the new user turn.
    pub prior_turns: Vec<ConversationTurn>,
}

pub struct TranscriptAggregator {
    pub(super) client: Arc<ApiClient>,
    pub(super) turns: Vec<ConversationTurn>,
    pub(super) phase: StreamPhase,
    pub(super) placeholder_index: Option<usize>,
    pub(super) next_session: u64,
    pub(super) last_outcome: Option<(SessionId, SessionOutcome)>,
    pub(super) observer: Option<mpsc::UnboundedSender<TranscriptUpdate>>,
    pub(super) pump_cancel: Option<CancellationToken>,
}

impl TranscriptAggregator {
    pub fn new(client: ApiClient) -> Self {
        Self::with_shared_client(Arc::new(client))
    }

    pub fn with_shared_client(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            turns: Vec::new(),
            phase: StreamPhase::Idle,
            placeholder_index: None,
            next_session: 1,
            last_outcome: None,
            observer: None,
            pump_cancel: None,
        }
    }

    /// Seeds the transcript with the assistant's opening line.
    pub fn with_greeting(mut self) -> Self {
        if self.turns.is_empty() {
            self.turns.push(ConversationTurn::assistant(ASSISTANT_GREETING));
        }
        self
    }

    /// Registers the channel that receives transcript snapshots.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TranscriptUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer = Some(tx);
        rx
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.clone()
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase.open_session().is_some()
    }

    pub fn last_outcome(&self) -> Option<(SessionId, SessionOutcome)> {
        self.last_outcome
    }

    /// Text of the placeholder turn while a session is open.
    pub fn pending_text(&self) -> Option<&str> {
        self.phase.open_session()?;
        self.placeholder_index
            .and_then(|index| self.turns.get(index))
            .map(|turn| turn.text.as_str())
    }

    pub fn client(&self) -> Arc<ApiClient> {
        Arc::clone(&self.client)
    }
}
