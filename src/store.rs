//! Persistence seams for admission state, charge records, and monitoring
//! events.
//!
//! The gateway depends on these traits, never on a concrete backing store.
//! The in-memory implementations below back tests and single-node
//! deployments; a relational store plugs in behind the same traits. The
//! three write paths are independent: a failed charge or monitoring write
//! must never change what the caller is told.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Mutex;

use crate::timestamp::UnixTimestamp;
use crate::types::{AdmissionState, ChargeRecord, IdentityKey, MonitoringEvent};

/// Error writing to or reading from a backing store.
///
/// Monitoring and charge-record persistence failures are logged and dropped
/// by the callers; they never abort a successful orchestration.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Write failed: {0}")]
    WriteFailed(String),
}

/// Store of per-identity admission rows.
///
/// `update_with` is the single mutation point and must run the closure
/// atomically with respect to other updates of the same key, so two
/// near-simultaneous requests from one identity cannot both read a stale
/// `unpaid_count`. No cross-key serialization is required.
pub trait AdmissionStateStore: Send + Sync {
    fn fetch(&self, key: &IdentityKey) -> Result<Option<AdmissionState>, PersistenceError>;

    fn update_with(
        &self,
        key: &IdentityKey,
        f: Box<dyn FnOnce(Option<&AdmissionState>) -> AdmissionState + Send>,
    ) -> Result<AdmissionState, PersistenceError>;
}

/// Store of persisted charges. One insert per successful acquirer call.
pub trait ChargeStore: Send + Sync {
    fn insert(&self, record: ChargeRecord) -> Result<(), PersistenceError>;

    fn fetch(&self, id: &str) -> Result<Option<ChargeRecord>, PersistenceError>;
}

/// Append-only store of monitoring events.
pub trait MonitoringStore: Send + Sync {
    fn append(&self, event: MonitoringEvent) -> Result<(), PersistenceError>;
}

/// In-memory admission store keyed by identity. The DashMap entry API gives
/// the per-key atomicity `update_with` requires.
#[derive(Debug, Default)]
pub struct InMemoryAdmissionStore {
    rows: DashMap<IdentityKey, AdmissionState>,
}

impl InMemoryAdmissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AdmissionStateStore for InMemoryAdmissionStore {
    fn fetch(&self, key: &IdentityKey) -> Result<Option<AdmissionState>, PersistenceError> {
        Ok(self.rows.get(key).map(|row| row.value().clone()))
    }

    fn update_with(
        &self,
        key: &IdentityKey,
        f: Box<dyn FnOnce(Option<&AdmissionState>) -> AdmissionState + Send>,
    ) -> Result<AdmissionState, PersistenceError> {
        // The entry guard holds the shard lock for this key across the
        // read-modify-write.
        let updated = match self.rows.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let next = f(Some(occupied.get()));
                occupied.insert(next.clone());
                next
            }
            Entry::Vacant(vacant) => {
                let next = f(None);
                vacant.insert(next.clone());
                next
            }
        };
        Ok(updated)
    }
}

/// In-memory charge store keyed by charge id.
#[derive(Debug, Default)]
pub struct InMemoryChargeStore {
    records: DashMap<String, ChargeRecord>,
}

impl InMemoryChargeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ChargeStore for InMemoryChargeStore {
    fn insert(&self, record: ChargeRecord) -> Result<(), PersistenceError> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    fn fetch(&self, id: &str) -> Result<Option<ChargeRecord>, PersistenceError> {
        Ok(self.records.get(id).map(|row| row.value().clone()))
    }
}

/// In-memory append-only monitoring log.
#[derive(Debug, Default)]
pub struct InMemoryMonitoringStore {
    events: Mutex<Vec<MonitoringEvent>>,
}

impl InMemoryMonitoringStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<MonitoringEvent> {
        self.events.lock().expect("monitoring log poisoned").clone()
    }
}

impl MonitoringStore for InMemoryMonitoringStore {
    fn append(&self, event: MonitoringEvent) -> Result<(), PersistenceError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| PersistenceError::Unavailable("monitoring log poisoned".to_string()))?;
        events.push(event);
        Ok(())
    }
}

/// Helper for constructing a fresh admission row.
pub fn new_admission_state(key: &IdentityKey, now: UnixTimestamp) -> AdmissionState {
    AdmissionState {
        identity_key: key.clone(),
        unpaid_count: 0,
        last_generation_at: None,
        blocked_until: None,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;
    use std::sync::Arc;

    fn key(fingerprint: &str) -> IdentityKey {
        Identity::from_fingerprint(fingerprint).key().unwrap()
    }

    #[test]
    fn test_update_with_inserts_when_absent() {
        let store = InMemoryAdmissionStore::new();
        let dev_key = key("dev-1");
        let now = UnixTimestamp::from_secs(1_000);

        let state = store
            .update_with(
                &dev_key,
                Box::new(move |existing| {
                    assert!(existing.is_none());
                    new_admission_state(&key("dev-1"), now)
                }),
            )
            .unwrap();
        assert_eq!(state.unpaid_count, 0);
        assert_eq!(store.fetch(&dev_key).unwrap(), Some(state));
    }

    #[test]
    fn test_concurrent_updates_never_lose_increments() {
        let store = Arc::new(InMemoryAdmissionStore::new());
        let now = UnixTimestamp::from_secs(1_000);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let contended = key("dev-contended");
                store
                    .update_with(
                        &contended,
                        Box::new(move |existing| {
                            let mut state = existing
                                .cloned()
                                .unwrap_or_else(|| new_admission_state(&key("dev-contended"), now));
                            state.unpaid_count += 1;
                            state
                        }),
                    )
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let state = store.fetch(&key("dev-contended")).unwrap().unwrap();
        assert_eq!(state.unpaid_count, 16);
    }
}
