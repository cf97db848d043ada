//! Best-effort monitoring of orchestration attempts.
//!
//! Every attempt against an acquirer produces a [`MonitoringEvent`]. The
//! logger hands events to a bounded channel drained by a background task, so
//! the write never blocks the orchestration path and can never fail it: a
//! full channel or a store error drops the event with a warning, nothing
//! more.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::store::MonitoringStore;
use crate::types::MonitoringEvent;

/// Bounded latency beats completeness: events beyond this backlog are dropped.
const CHANNEL_CAPACITY: usize = 256;

/// Fire-and-forget recorder of orchestration attempts.
#[derive(Debug, Clone)]
pub struct MonitoringLogger {
    sender: mpsc::Sender<MonitoringEvent>,
}

impl MonitoringLogger {
    /// Starts the background drain task writing into `store`.
    ///
    /// The task ends when every logger clone has been dropped. The returned
    /// handle is mainly useful in tests to await the final flush.
    pub fn spawn<M>(store: Arc<M>) -> (Self, JoinHandle<()>)
    where
        M: MonitoringStore + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<MonitoringEvent>(CHANNEL_CAPACITY);
        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(error) = store.append(event) {
                    tracing::warn!(error = %error, "Dropping monitoring event: store write failed");
                }
            }
        });
        (MonitoringLogger { sender }, handle)
    }

    /// Enqueues an event. Never blocks, never errors out to the caller.
    pub fn log(&self, event: MonitoringEvent) {
        if let Err(error) = self.sender.try_send(event) {
            tracing::warn!(error = %error, "Dropping monitoring event: channel full or closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryMonitoringStore;
    use crate::timestamp::UnixTimestamp;
    use crate::types::{AcquirerName, MonitoringEventType};

    fn event(retry_attempt: u32, event_type: MonitoringEventType) -> MonitoringEvent {
        MonitoringEvent {
            acquirer: AcquirerName::from("zendry"),
            event_type,
            response_time_ms: 120,
            error_message: None,
            retry_attempt,
            created_at: UnixTimestamp::from_secs(1_000),
        }
    }

    #[tokio::test]
    async fn test_events_reach_the_store_in_order() {
        let store = Arc::new(InMemoryMonitoringStore::new());
        let (logger, handle) = MonitoringLogger::spawn(Arc::clone(&store));

        logger.log(event(1, MonitoringEventType::Failure));
        logger.log(event(2, MonitoringEventType::Retry));
        logger.log(event(2, MonitoringEventType::Success));

        drop(logger);
        handle.await.unwrap();

        let events = store.snapshot();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, MonitoringEventType::Failure);
        assert_eq!(events[2].event_type, MonitoringEventType::Success);
    }

    #[tokio::test]
    async fn test_log_survives_closed_channel() {
        let store = Arc::new(InMemoryMonitoringStore::new());
        let (logger, handle) = MonitoringLogger::spawn(Arc::clone(&store));
        handle.abort();
        let _ = handle.await;

        // Logging after the drain task died must not panic or error.
        logger.log(event(1, MonitoringEventType::Failure));
        assert!(store.snapshot().is_empty());
    }
}
