use tokio::sync::oneshot;

/// The terminal outcome of a submitted event, as seen by the submitter (§7
/// "submitters receive a future/handle that resolves to the terminal outcome").
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    Accepted { sequence: u64 },
    Rejected { reason: String },
}

/// Handle returned by [`crate::Pipeline::submit`]. Resolves once the COMPLETE stage
/// has written the `(event_id -> completion_marker)` entry, or the event was rejected
/// before reaching COMPLETE.
pub struct CompletionHandle {
    rx: oneshot::Receiver<CompletionOutcome>,
}

impl CompletionHandle {
    pub(crate) fn new(rx: oneshot::Receiver<CompletionOutcome>) -> Self {
        Self { rx }
    }

    pub async fn wait(self) -> CompletionOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => CompletionOutcome::Rejected { reason: "pipeline dropped before completion".to_string() },
        }
    }
}

pub(crate) type CompletionSender = oneshot::Sender<CompletionOutcome>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_with_the_sent_outcome() {
        let (tx, rx) = oneshot::channel();
        let handle = CompletionHandle::new(rx);
        tx.send(CompletionOutcome::Accepted { sequence: 7 }).unwrap();

        match handle.wait().await {
            CompletionOutcome::Accepted { sequence } => assert_eq!(sequence, 7),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_sender_resolves_as_rejected() {
        let (tx, rx) = oneshot::channel::<CompletionOutcome>();
        let handle = CompletionHandle::new(rx);
        drop(tx);

        match handle.wait().await {
            CompletionOutcome::Rejected { reason } => assert!(reason.contains("dropped")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
