use serde::Serialize;
use tokio::sync::mpsc;

use dealroom_shared::FileId;

use crate::orchestrator::SubmissionState;

/// Progress and state notifications published while a submission runs.
/// The orchestrator is the only writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SubmissionEvent {
    StateChanged {
        state: SubmissionState,
    },
    #[serde(rename_all = "camelCase")]
    FileProgress {
        index: usize,
        file_id: FileId,
        file_name: String,
        percent: u8,
    },
    OverallProgress {
        percent: u8,
    },
}

pub type EventSender = mpsc::UnboundedSender<SubmissionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SubmissionEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

pub fn emit_event(tx: &EventSender, event: SubmissionEvent) {
    if let Err(e) = tx.send(event) {
        tracing::debug!(event = ?e.0, "Event receiver dropped");
    }
}
