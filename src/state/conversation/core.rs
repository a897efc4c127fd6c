use super::state::{
    PendingSession, SessionEvent, SessionOutcome, StreamPhase, TranscriptAggregator,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const STREAM_CLOSED_EARLY: &str = "stream closed before completion";

impl TranscriptAggregator {
    /// Submits `text` and folds the whole reply into the transcript before
    /// returning.
    ///
    /// Returns `None` when the submission is rejected.
    pub async fn send_message(&mut self, text: &str) -> Option<SessionOutcome> {
        let pending = self.submit(text)?;
        let session = pending.id;
        let client = self.client();

        let mut fragments = match client
            .open_chat_stream(&pending.message, &pending.prior_turns)
            .await
        {
            Ok(fragments) => fragments,
            Err(error) => {
                self.on_stream_error(session, &format!("{error:#}"));
                return Some(SessionOutcome::Failed);
            }
        };

        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    self.on_fragment(session, &fragment);
                }
                Err(error) => {
                    self.on_stream_error(session, &format!("{error:#}"));
                    return Some(SessionOutcome::Failed);
                }
            }
        }

        self.on_stream_end(session);
        Some(SessionOutcome::Settled)
    }

    /// Runs the upstream stream for `pending` on its own task, forwarding
    /// every fragment, then exactly one `End` or `Error`, to `events_tx`.
    ///
    /// The task stops without sending anything further once the aggregator
    /// is torn down or the receiver is dropped.
    pub fn spawn_session(
        &mut self,
        pending: PendingSession,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> JoinHandle<()> {
        let cancel = CancellationToken::new();
        if self.phase.open_session() == Some(pending.id) {
            self.pump_cancel = Some(cancel.clone());
        } else {
            cancel.cancel();
        }
        let client = self.client();

        tokio::spawn(async move {
            let session = pending.id;
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                opened = client.open_chat_stream(&pending.message, &pending.prior_turns) => opened,
            };

            let mut fragments = match opened {
                Ok(fragments) => fragments,
                Err(error) => {
                    let _ = events_tx.send(SessionEvent::error(session, format!("{error:#}")));
                    return;
                }
            };

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    next = fragments.next() => next,
                };
                let event = match next {
                    Some(Ok(fragment)) => SessionEvent::fragment(session, fragment),
                    Some(Err(error)) => {
                        let _ = events_tx.send(SessionEvent::error(session, format!("{error:#}")));
                        return;
                    }
                    None => {
                        let _ = events_tx.send(SessionEvent::end(session));
                        return;
                    }
                };
                if events_tx.send(event).is_err() {
                    return;
                }
            }
        })
    }

    /// Applies pump events until the open session settles or fails.
    ///
    /// Events for other sessions are dropped along the way. A channel that
    /// closes while the session is still open fails the session. Returns
    /// `None` when no session is open or the aggregator is torn down.
    pub async fn drive_session(
        &mut self,
        events_rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Option<SessionOutcome> {
        let session = self.phase.open_session()?;
        while let Some(event) = events_rx.recv().await {
            self.apply(event);
            if self.phase == StreamPhase::Closed {
                return None;
            }
            if self.phase.open_session() != Some(session) {
                return self
                    .last_outcome
                    .filter(|(id, _)| *id == session)
                    .map(|(_, outcome)| outcome);
            }
        }

        if self.phase.open_session() == Some(session) {
            self.on_stream_error(session, STREAM_CLOSED_EARLY);
            return Some(SessionOutcome::Failed);
        }
        None
    }
}
