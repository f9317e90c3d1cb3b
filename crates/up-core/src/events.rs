//! Upload lifecycle events.
//!
//! Stages and pipelines publish [`EventPayload`]s on an [`EventBus`]. Live
//! listeners subscribe to the broadcast side; anything that attaches late
//! (a progress UI, a test) reads the retained history instead.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::classified::ClassifiedError;
use crate::ids::UploadId;
use crate::stage::StageKind;

/// Events retained by [`EventBus::default`].
pub const DEFAULT_HISTORY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    UploadStarted {
        upload_id: UploadId,
    },
    UploadCompleted {
        upload_id: UploadId,
        video_uri: String,
    },
    UploadFailed {
        upload_id: UploadId,
        error: ClassifiedError,
    },
    UploadCancelled {
        upload_id: UploadId,
    },

    StageStarted {
        upload_id: UploadId,
        stage: StageKind,
    },
    /// Progress in `[0.0, 1.0]`; only ever increases within one stage.
    StageProgress {
        upload_id: UploadId,
        stage: StageKind,
        progress: f64,
    },
    StageFinished {
        upload_id: UploadId,
        stage: StageKind,
    },
    StageFailed {
        upload_id: UploadId,
        stage: StageKind,
        error: ClassifiedError,
    },
    StageCancelled {
        upload_id: UploadId,
        stage: StageKind,
    },

    /// Removing the exported file or the remote record did not work. The
    /// upload's own outcome is unaffected.
    CleanupFailed {
        upload_id: UploadId,
        message: String,
    },
}

impl EventPayload {
    /// The upload this event belongs to.
    pub fn upload_id(&self) -> UploadId {
        match self {
            Self::UploadStarted { upload_id }
            | Self::UploadCompleted { upload_id, .. }
            | Self::UploadFailed { upload_id, .. }
            | Self::UploadCancelled { upload_id }
            | Self::StageStarted { upload_id, .. }
            | Self::StageProgress { upload_id, .. }
            | Self::StageFinished { upload_id, .. }
            | Self::StageFailed { upload_id, .. }
            | Self::StageCancelled { upload_id, .. }
            | Self::CleanupFailed { upload_id, .. } => *upload_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub payload: EventPayload,
}

/// Fan-out of upload events plus a bounded history, oldest dropped first.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    history: RwLock<VecDeque<Event>>,
    history_len: usize,
}

impl EventBus {
    /// `channel_capacity` bounds how far a slow subscriber may lag before it
    /// starts missing events; `history_len` bounds the retained history.
    pub fn new(channel_capacity: usize, history_len: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            sender,
            history: RwLock::new(VecDeque::with_capacity(history_len)),
            history_len,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Stamp `payload`, record it, and send it to live subscribers.
    pub fn publish(&self, payload: EventPayload) -> Event {
        let event = Event {
            id: Uuid::new_v4(),
            at: Utc::now(),
            payload,
        };

        if self.history_len > 0 {
            let mut history = self.history.write();
            while history.len() >= self.history_len {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // Publishing with nobody listening is normal.
        let _ = self.sender.send(event.clone());
        event
    }

    /// Retained events for one upload, oldest first.
    pub fn history_for(&self, upload_id: UploadId) -> Vec<Event> {
        self.history
            .read()
            .iter()
            .filter(|e| e.payload.upload_id() == upload_id)
            .cloned()
            .collect()
    }

    /// The last `n` retained events across all uploads, oldest first.
    pub fn latest(&self, n: usize) -> Vec<Event> {
        let history = self.history.read();
        let skip = history.len().saturating_sub(n);
        history.iter().skip(skip).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY, DEFAULT_HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorDomain, LocalErrorCode};

    #[test]
    fn subscribers_see_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let upload_id = UploadId::new();

        let sent = bus.publish(EventPayload::StageStarted {
            upload_id,
            stage: StageKind::Export,
        });

        let received = rx.try_recv().unwrap();
        assert_eq!(received.id, sent.id);
        assert!(matches!(
            received.payload,
            EventPayload::StageStarted { stage: StageKind::Export, .. }
        ));
    }

    #[test]
    fn history_drops_oldest_first() {
        let bus = EventBus::new(8, 3);
        let upload_id = UploadId::new();
        for stage in [StageKind::Export, StageKind::CreateVideo, StageKind::UploadVideo, StageKind::ActivateVideo] {
            bus.publish(EventPayload::StageFinished { upload_id, stage });
        }

        let stages: Vec<StageKind> = bus
            .latest(10)
            .into_iter()
            .map(|e| match e.payload {
                EventPayload::StageFinished { stage, .. } => stage,
                other => panic!("unexpected payload: {other:?}"),
            })
            .collect();
        assert_eq!(
            stages,
            vec![StageKind::CreateVideo, StageKind::UploadVideo, StageKind::ActivateVideo]
        );
        assert_eq!(bus.latest(1).len(), 1);
    }

    #[test]
    fn history_is_filtered_per_upload() {
        let bus = EventBus::default();
        let (a, b) = (UploadId::new(), UploadId::new());
        bus.publish(EventPayload::UploadStarted { upload_id: a });
        bus.publish(EventPayload::UploadStarted { upload_id: b });
        bus.publish(EventPayload::UploadCancelled { upload_id: a });

        let events = bus.history_for(a);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1].payload, EventPayload::UploadCancelled { .. }));
    }

    #[test]
    fn zero_history_keeps_nothing() {
        let bus = EventBus::new(4, 0);
        bus.publish(EventPayload::CleanupFailed {
            upload_id: UploadId::new(),
            message: "permission denied".into(),
        });
        assert!(bus.latest(10).is_empty());
    }

    #[test]
    fn failure_events_carry_the_classified_error() {
        let event = EventBus::default().publish(EventPayload::StageFailed {
            upload_id: UploadId::new(),
            stage: StageKind::Export,
            error: ClassifiedError::new(
                ErrorDomain::ExportOperation,
                LocalErrorCode::DiskSpaceException,
                "Not enough disk space to copy asset",
            ),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["type"], "stage_failed");
        assert_eq!(json["payload"]["error"]["code"], "disk_space_exception");
    }
}
