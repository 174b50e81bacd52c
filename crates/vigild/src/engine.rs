//! The frame engine: one dedicated OS thread owning the presence tracker,
//! the alert router and the deferred buffer for a single ingest context.
//!
//! All state mutation happens on the engine thread; the rest of the
//! daemon only holds a clone-safe handle. A deployment with several
//! camera feeds runs one engine per feed.

use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;
use tokio::sync::mpsc;

use vigil_core::presence::{PolicyTable, PresenceError, PresenceTracker};
use vigil_core::router::{AlertRouter, AlertSink, NotificationBuffer};
use vigil_core::types::ObjectDetail;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("presence: {0}")]
    Presence(#[from] PresenceError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// One frame's worth of detector output, ready for the tracker.
pub struct FrameSnapshot {
    pub counts: Vec<u32>,
    pub objects: Vec<ObjectDetail>,
    pub image: Arc<RgbImage>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<FrameSnapshot>,
}

impl EngineHandle {
    /// Hand one frame snapshot to the engine. Blocks while the engine's
    /// small queue is full; call from a non-async thread.
    pub fn submit_blocking(&self, snapshot: FrameSnapshot) -> Result<(), EngineError> {
        self.tx
            .blocking_send(snapshot)
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Validates the vocabulary up front (fail-fast), then enters the frame
/// loop. The thread exits when every handle is dropped.
pub fn spawn_engine(
    vocabulary: Vec<String>,
    policy: Arc<PolicyTable>,
    sink: Box<dyn AlertSink + Send>,
    buffer_cap: usize,
) -> Result<EngineHandle, EngineError> {
    let mut tracker = PresenceTracker::new(vocabulary, Arc::clone(&policy))?;
    let buffer = if buffer_cap > 0 {
        NotificationBuffer::bounded(buffer_cap)
    } else {
        NotificationBuffer::new()
    };
    let mut router = AlertRouter::new(policy, buffer, sink);

    let (tx, mut rx) = mpsc::channel::<FrameSnapshot>(16);

    std::thread::Builder::new()
        .name("vigil-engine".into())
        .spawn(move || {
            tracing::info!(classes = tracker.vocabulary().len(), "engine thread started");
            while let Some(snapshot) = rx.blocking_recv() {
                process_snapshot(&mut tracker, &mut router, &snapshot);
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}

/// Run one snapshot through the tracker and route every resulting event.
///
/// A count/vocabulary mismatch is a deployment defect; the frame is
/// rejected loudly and the loop keeps serving well-formed frames.
fn process_snapshot<S: AlertSink>(
    tracker: &mut PresenceTracker,
    router: &mut AlertRouter<S>,
    snapshot: &FrameSnapshot,
) {
    match tracker.update(&snapshot.counts, &snapshot.objects, &snapshot.image) {
        Ok(events) => {
            for event in events {
                router.route(event);
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "frame rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use vigil_core::types::DetectionEvent;

    struct RecordingSink(Arc<Mutex<Vec<String>>>);

    impl AlertSink for RecordingSink {
        fn send(
            &mut self,
            event: &DetectionEvent,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.0.lock().unwrap().push(event.class.clone());
            Ok(())
        }
    }

    fn detail(name: &str) -> ObjectDetail {
        ObjectDetail {
            name: name.into(),
            confidence: Some(0.8),
            bbox: Some("0,0,20,20".into()),
            color: None,
            size: None,
        }
    }

    fn snapshot(counts: Vec<u32>, objects: Vec<ObjectDetail>) -> FrameSnapshot {
        FrameSnapshot {
            counts,
            objects,
            image: Arc::new(RgbImage::new(8, 8)),
        }
    }

    /// Full pipeline, synchronously: deferred cat buffers until the
    /// person edge piggybacks it out.
    #[test]
    fn test_process_snapshot_end_to_end() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let policy = Arc::new(PolicyTable::new(&["chair"], &["cat"]));
        let vocab: Vec<String> = ["person", "cat", "chair"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut tracker = PresenceTracker::new(vocab, Arc::clone(&policy)).unwrap();
        let mut router = AlertRouter::new(
            policy,
            NotificationBuffer::new(),
            RecordingSink(Arc::clone(&sent)),
        );

        process_snapshot(&mut tracker, &mut router, &snapshot(vec![0, 1, 0], vec![detail("cat")]));
        assert!(sent.lock().unwrap().is_empty());

        // Suppressed chair appears: still nothing outbound.
        process_snapshot(&mut tracker, &mut router, &snapshot(vec![0, 1, 1], vec![]));
        assert!(sent.lock().unwrap().is_empty());

        // Person appears: immediate send plus the buffered cat.
        process_snapshot(
            &mut tracker,
            &mut router,
            &snapshot(vec![1, 1, 1], vec![detail("person")]),
        );
        assert_eq!(*sent.lock().unwrap(), vec!["person", "cat"]);
        assert_eq!(router.pending(), 0);
    }

    #[test]
    fn test_process_snapshot_rejects_mismatched_counts() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let policy = Arc::new(PolicyTable::default());
        let mut tracker =
            PresenceTracker::new(vec!["person".to_string()], Arc::clone(&policy)).unwrap();
        let mut router = AlertRouter::new(
            policy,
            NotificationBuffer::new(),
            RecordingSink(Arc::clone(&sent)),
        );

        process_snapshot(&mut tracker, &mut router, &snapshot(vec![1, 1], vec![]));
        assert!(sent.lock().unwrap().is_empty());

        // The loop keeps serving well-formed frames afterwards.
        process_snapshot(&mut tracker, &mut router, &snapshot(vec![1], vec![]));
        assert_eq!(*sent.lock().unwrap(), vec!["person"]);
    }

    #[test]
    fn test_spawn_engine_validates_vocabulary() {
        let policy = Arc::new(PolicyTable::default());
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink: Box<dyn AlertSink + Send> = Box::new(RecordingSink(sent));
        assert!(matches!(
            spawn_engine(Vec::new(), policy, sink, 0),
            Err(EngineError::Presence(PresenceError::EmptyVocabulary))
        ));
    }
}
