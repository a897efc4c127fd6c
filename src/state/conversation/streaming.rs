use super::state::{
    ConversationTurn, PendingSession, SessionEvent, SessionEventKind, SessionId, SessionOutcome,
    StreamPhase, TranscriptAggregator, TranscriptUpdate, STREAM_FAILURE_NOTICE,
};
use crate::api::logging::emit_stream_failure;

impl TranscriptAggregator {
    /// Accepts a user turn and reserves the assistant placeholder.
    ///
    /// Returns `None`, leaving everything untouched, for blank text, while a
    /// session is open, or after teardown.
    pub fn submit(&mut self, user_text: &str) -> Option<PendingSession> {
        if self.phase != StreamPhase::Idle {
            return None;
        }
        let message = user_text.trim();
        if message.is_empty() {
            return None;
        }

        let prior_turns = self.turns.clone();
        let id = SessionId(self.next_session);
        self.next_session += 1;

        self.turns.push(ConversationTurn::user(message));
        self.turns.push(ConversationTurn::assistant(String::new()));
        self.placeholder_index = Some(self.turns.len() - 1);
        self.phase = StreamPhase::AwaitingFirstFragment(id);
        self.publish_snapshot();

        Some(PendingSession {
            id,
            message: message.to_string(),
            prior_turns,
        })
    }

    /// Appends one fragment to the placeholder of `session`.
    ///
    /// Returns false when `session` is not the open one.
    pub fn on_fragment(&mut self, session: SessionId, text: &str) -> bool {
        if self.phase.open_session() != Some(session) {
            return false;
        }
        let Some(turn) = self
            .placeholder_index
            .and_then(|index| self.turns.get_mut(index))
        else {
            return false;
        };

        turn.text.push_str(text);
        self.phase = StreamPhase::Streaming(session);
        self.publish_snapshot();
        true
    }

    pub fn on_stream_end(&mut self, session: SessionId) -> bool {
        if self.phase.open_session() != Some(session) {
            return false;
        }

        self.finish_session(session, SessionOutcome::Settled);
        self.emit(TranscriptUpdate::Settled { session });
        true
    }

    /// Replaces the placeholder text with the failure notice and logs `error`.
    pub fn on_stream_error(&mut self, session: SessionId, error: &str) -> bool {
        if self.phase.open_session() != Some(session) {
            return false;
        }

        emit_stream_failure(session.get(), error);
        if let Some(turn) = self
            .placeholder_index
            .and_then(|index| self.turns.get_mut(index))
        {
            turn.text = STREAM_FAILURE_NOTICE.to_string();
        }
        self.finish_session(session, SessionOutcome::Failed);
        self.publish_snapshot();
        self.emit(TranscriptUpdate::Failed {
            session,
            error: error.to_string(),
        });
        true
    }

    /// Routes a pump event to the matching handler.
    pub fn apply(&mut self, event: SessionEvent) -> bool {
        match event.kind {
            SessionEventKind::Fragment(text) => self.on_fragment(event.session, &text),
            SessionEventKind::End => self.on_stream_end(event.session),
            SessionEventKind::Error(error) => self.on_stream_error(event.session, &error),
        }
    }

    /// Abandons any open session; the aggregator ignores everything afterwards.
    pub fn teardown(&mut self) {
        if let Some(cancel) = self.pump_cancel.take() {
            cancel.cancel();
        }
        self.phase = StreamPhase::Closed;
        self.placeholder_index = None;
        self.observer = None;
    }

    pub fn is_closed(&self) -> bool {
        self.phase == StreamPhase::Closed
    }

    fn finish_session(&mut self, session: SessionId, outcome: SessionOutcome) {
        self.placeholder_index = None;
        self.pump_cancel = None;
        self.last_outcome = Some((session, outcome));
        self.phase = StreamPhase::Idle;
    }

    fn publish_snapshot(&mut self) {
        if self.observer.is_none() {
            return;
        }
        let snapshot = self.turns.clone();
        self.emit(TranscriptUpdate::Republished(snapshot));
    }

    fn emit(&mut self, update: TranscriptUpdate) {
        let closed = match &self.observer {
            Some(tx) => tx.send(update).is_err(),
            None => false,
        };
        if closed {
            self.observer = None;
        }
    }
}
