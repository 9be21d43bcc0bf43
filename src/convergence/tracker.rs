//! Per-participant ring state with persisted, serialized transitions.

use crate::convergence::ring_state::RingState;
use crate::convergence::ring_version::RingIdAndVersionPair;
use crate::error::{Error, Result};
use crate::types::NodeId;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

type StateKey = (RingIdAndVersionPair, NodeId);
type Slot = Arc<tokio::sync::Mutex<RingState>>;

/// One persisted ring state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingStateRecord {
    pub ring: RingIdAndVersionPair,
    pub participant: NodeId,
    pub state: RingState,
}

impl RingStateRecord {
    pub fn new(ring: RingIdAndVersionPair, participant: impl Into<NodeId>, state: RingState) -> Self {
        Self {
            ring,
            participant: participant.into(),
            state,
        }
    }
}

/// Persistent storage for ring states.
#[async_trait::async_trait]
pub trait RingStateStore: Send + Sync + std::fmt::Debug {
    /// Save (or overwrite) one participant's state.
    async fn save_state(&self, record: &RingStateRecord) -> Result<()>;

    /// Load every saved state.
    async fn load_states(&self) -> Result<Vec<RingStateRecord>>;

    /// Drop all states of a ring version.
    async fn delete_ring(&self, ring: &RingIdAndVersionPair) -> Result<()>;
}

/// In-memory state store for tests and single-process use.
#[derive(Debug, Default)]
pub struct InMemoryRingStateStore {
    states: Mutex<HashMap<StateKey, RingState>>,
}

impl InMemoryRingStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RingStateStore for InMemoryRingStateStore {
    async fn save_state(&self, record: &RingStateRecord) -> Result<()> {
        self.states
            .lock()
            .insert((record.ring, record.participant.clone()), record.state);
        Ok(())
    }

    async fn load_states(&self) -> Result<Vec<RingStateRecord>> {
        Ok(self
            .states
            .lock()
            .iter()
            .map(|((ring, participant), state)| RingStateRecord::new(*ring, participant.clone(), *state))
            .collect())
    }

    async fn delete_ring(&self, ring: &RingIdAndVersionPair) -> Result<()> {
        self.states.lock().retain(|(r, _), _| r != ring);
        Ok(())
    }
}

/// Owner of the [`RingState`] of every (ring version, participant) pair.
///
/// Transitions on one pair are serialized by a per-pair async lock held
/// across validation, persistence and the in-memory update. Reads for
/// quorum checks take the same locks briefly, so they are point-in-time
/// snapshots that may trail a concurrent transition.
#[derive(Debug)]
pub struct RingStateTracker {
    states: RwLock<HashMap<StateKey, Slot>>,
    store: Arc<dyn RingStateStore>,
}

impl RingStateTracker {
    pub fn new(store: Arc<dyn RingStateStore>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// A tracker backed by an [`InMemoryRingStateStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRingStateStore::new()))
    }

    fn slot(&self, ring: &RingIdAndVersionPair, participant: &str) -> Option<Slot> {
        self.states.read().get(&(*ring, participant.to_string())).cloned()
    }

    /// Whether `slot` is still the live slot for the pair. A slot can be
    /// dropped from the map by a failed `begin` or by `forget` while a caller
    /// waits on its lock.
    fn is_current(&self, ring: &RingIdAndVersionPair, participant: &str, slot: &Slot) -> bool {
        self.states
            .read()
            .get(&(*ring, participant.to_string()))
            .map_or(false, |live| Arc::ptr_eq(live, slot))
    }

    fn not_found(ring: &RingIdAndVersionPair, participant: &str) -> Error {
        Error::RingStateNotFound {
            ring: ring.to_string(),
            participant: participant.to_string(),
        }
    }

    /// Start tracking a participant at `INITIAL`.
    ///
    /// Idempotent: an existing pair keeps its state, which is returned.
    pub async fn begin(&self, ring: &RingIdAndVersionPair, participant: &str) -> Result<RingState> {
        let key = (*ring, participant.to_string());
        loop {
            let (slot, fresh) = {
                let mut states = self.states.write();
                match states.entry(key.clone()) {
                    Entry::Occupied(e) => (e.get().clone(), None),
                    Entry::Vacant(v) => {
                        let slot = Arc::new(tokio::sync::Mutex::new(RingState::Initial));
                        // Lock before publishing so no transition runs ahead of the save.
                        let guard = slot.clone().try_lock_owned().map_err(|_| {
                            Error::Storage(format!("ring state {}/{} locked at creation", ring, participant))
                        })?;
                        v.insert(slot.clone());
                        (slot, Some(guard))
                    }
                }
            };

            let Some(guard) = fresh else {
                let state = *slot.lock().await;
                if self.is_current(ring, participant, &slot) {
                    return Ok(state);
                }
                // The creating call failed to persist; try creating it again.
                continue;
            };
            if let Err(e) = self
                .store
                .save_state(&RingStateRecord::new(*ring, participant, RingState::Initial))
                .await
            {
                self.states.write().remove(&key);
                return Err(e);
            }
            tracing::info!(ring = %ring, participant = %participant, "Began ring convergence");
            return Ok(*guard);
        }
    }

    /// Move a participant to `to`.
    ///
    /// Invalid transitions and store failures leave both the persisted and
    /// the in-memory state untouched.
    pub async fn transition(&self, ring: &RingIdAndVersionPair, participant: &str, to: RingState) -> Result<()> {
        let slot = self
            .slot(ring, participant)
            .ok_or_else(|| Self::not_found(ring, participant))?;

        let mut state = slot.lock().await;
        if !self.is_current(ring, participant, &slot) {
            return Err(Self::not_found(ring, participant));
        }
        let from = *state;
        if let Err(e) = from.check_transition(to) {
            tracing::warn!(ring = %ring, participant = %participant, from = %from, to = %to, "Rejected ring state transition");
            return Err(e);
        }

        self.store
            .save_state(&RingStateRecord::new(*ring, participant, to))
            .await?;
        *state = to;

        tracing::info!(ring = %ring, participant = %participant, from = %from, to = %to, "Ring state transition");
        Ok(())
    }

    /// Current state of a participant. Terminal participants still answer.
    pub async fn state(&self, ring: &RingIdAndVersionPair, participant: &str) -> Option<RingState> {
        let slot = self.slot(ring, participant)?;
        let state = *slot.lock().await;
        self.is_current(ring, participant, &slot).then_some(state)
    }

    pub async fn should_initiate(&self, ring: &RingIdAndVersionPair, participant: &str) -> bool {
        self.state(ring, participant)
            .await
            .map_or(false, |s| !s.is_terminal() && !s.requires_passive_participation())
    }

    /// Whether every participant has reached at least `requirement`.
    ///
    /// A participant that was never begun does not meet anything.
    pub async fn quorum_met(&self, ring: &RingIdAndVersionPair, participants: &[NodeId], requirement: RingState) -> bool {
        self.lagging(ring, participants, requirement).await.is_empty()
    }

    /// Participants that have not reached `requirement`, in input order.
    pub async fn lagging(
        &self,
        ring: &RingIdAndVersionPair,
        participants: &[NodeId],
        requirement: RingState,
    ) -> Vec<NodeId> {
        let mut lagging = Vec::new();
        for participant in participants {
            let met = self
                .state(ring, participant)
                .await
                .map_or(false, |observed| requirement.met_by(observed));
            if !met {
                lagging.push(participant.clone());
            }
        }
        lagging
    }

    /// Stop tracking a ring version and drop its persisted states.
    /// Stop tracking a ring version and drop its persisted states.
    ///
    /// Waits for in-flight transitions of the ring; later ones fail with
    /// `RingStateNotFound`.
    pub async fn forget(&self, ring: &RingIdAndVersionPair) -> Result<()> {
        let slots: Vec<Slot> = self
            .states
            .read()
            .iter()
            .filter(|((r, _), _)| r == ring)
            .map(|(_, slot)| slot.clone())
            .collect();
        let mut guards = Vec::with_capacity(slots.len());
        for slot in slots {
            guards.push(slot.lock_owned().await);
        }

        self.store.delete_ring(ring).await?;
        self.states.write().retain(|(r, _), _| r != ring);
        drop(guards);
        tracing::debug!(ring = %ring, "Forgot ring states");
        Ok(())
    }

    /// Reload persisted states.
    ///
    /// Pairs not held in memory are added. A held pair adopts the stored
    /// state under its own lock, and only when that state is at or past the
    /// in-memory one, so a transition racing the reload is never undone.
    /// Returns the number of states loaded.
    pub async fn recover(&self) -> Result<usize> {
        let records = self.store.load_states().await?;
        let count = records.len();
        for record in records {
            let existing = {
                let mut states = self.states.write();
                match states.entry((record.ring, record.participant.clone())) {
                    Entry::Occupied(e) => Some(e.get().clone()),
                    Entry::Vacant(v) => {
                        v.insert(Arc::new(tokio::sync::Mutex::new(record.state)));
                        None
                    }
                }
            };
            let Some(slot) = existing else {
                continue;
            };
            let mut state = slot.lock().await;
            let held = *state;
            if held != record.state && (held.is_valid_transition(record.state) || held.met_by(record.state)) {
                *state = record.state;
            } else if held != record.state {
                tracing::debug!(
                    ring = %record.ring,
                    participant = %record.participant,
                    held = %held,
                    stored = %record.state,
                    "Keeping newer in-memory ring state"
                );
            }
        }
        tracing::info!(recovered = count, "Recovered ring states");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> RingIdAndVersionPair {
        RingIdAndVersionPair::from_name_and_versions("ring.test", 3, 1)
    }

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Store that refuses to persist one particular state.
    #[derive(Debug, Default)]
    struct RefusingStore {
        inner: InMemoryRingStateStore,
        refuse: Option<RingState>,
    }

    #[async_trait::async_trait]
    impl RingStateStore for RefusingStore {
        async fn save_state(&self, record: &RingStateRecord) -> Result<()> {
            if Some(record.state) == self.refuse {
                return Err(Error::Storage("disk full".to_string()));
            }
            self.inner.save_state(record).await
        }

        async fn load_states(&self) -> Result<Vec<RingStateRecord>> {
            self.inner.load_states().await
        }

        async fn delete_ring(&self, ring: &RingIdAndVersionPair) -> Result<()> {
            self.inner.delete_ring(ring).await
        }
    }

    #[tokio::test]
    async fn test_begin_is_idempotent() {
        let tracker = RingStateTracker::in_memory();
        assert_eq!(tracker.begin(&ring(), "s1").await.unwrap(), RingState::Initial);
        tracker
            .transition(&ring(), "s1", RingState::ReadyForConvergence1)
            .await
            .unwrap();
        assert_eq!(
            tracker.begin(&ring(), "s1").await.unwrap(),
            RingState::ReadyForConvergence1
        );
    }

    #[tokio::test]
    async fn test_full_path_to_closed() {
        let tracker = RingStateTracker::in_memory();
        tracker.begin(&ring(), "s1").await.unwrap();
        for to in &RingState::ALL[1..7] {
            tracker.transition(&ring(), "s1", *to).await.unwrap();
        }

        assert_eq!(tracker.state(&ring(), "s1").await, Some(RingState::Closed));
        assert!(!tracker.should_initiate(&ring(), "s1").await);
        assert!(tracker
            .transition(&ring(), "s1", RingState::Abandoned)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_invalid_transition_leaves_state() {
        let store = Arc::new(InMemoryRingStateStore::new());
        let tracker = RingStateTracker::new(store.clone());
        tracker.begin(&ring(), "s1").await.unwrap();
        tracker
            .transition(&ring(), "s1", RingState::ReadyForConvergence1)
            .await
            .unwrap();

        let result = tracker
            .transition(&ring(), "s1", RingState::AllConvergenceComplete1)
            .await;
        assert!(matches!(result, Err(Error::InvalidRingTransition { .. })));
        assert_eq!(
            tracker.state(&ring(), "s1").await,
            Some(RingState::ReadyForConvergence1)
        );
        let persisted = store.load_states().await.unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].state, RingState::ReadyForConvergence1);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_state() {
        let store = Arc::new(RefusingStore {
            refuse: Some(RingState::ReadyForConvergence2),
            ..Default::default()
        });
        let tracker = RingStateTracker::new(store.clone());
        tracker.begin(&ring(), "s1").await.unwrap();
        tracker
            .transition(&ring(), "s1", RingState::ReadyForConvergence1)
            .await
            .unwrap();

        let result = tracker
            .transition(&ring(), "s1", RingState::ReadyForConvergence2)
            .await;
        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(
            tracker.state(&ring(), "s1").await,
            Some(RingState::ReadyForConvergence1)
        );
    }

    #[tokio::test]
    async fn test_unknown_participant() {
        let tracker = RingStateTracker::in_memory();
        let result = tracker
            .transition(&ring(), "ghost", RingState::ReadyForConvergence1)
            .await;
        assert!(matches!(result, Err(Error::RingStateNotFound { .. })));
        assert_eq!(tracker.state(&ring(), "ghost").await, None);
        assert!(!tracker.should_initiate(&ring(), "ghost").await);
    }

    #[tokio::test]
    async fn test_quorum_and_lagging() {
        let tracker = RingStateTracker::in_memory();
        let participants = ids(&["s1", "s2", "s3"]);
        tracker.begin(&ring(), "s1").await.unwrap();
        tracker.begin(&ring(), "s2").await.unwrap();
        tracker.transition(&ring(), "s1", RingState::Closed).await.unwrap();
        tracker
            .transition(&ring(), "s2", RingState::ReadyForConvergence1)
            .await
            .unwrap();

        let requirement = RingState::ReadyForConvergence1;
        assert!(!tracker.quorum_met(&ring(), &participants, requirement).await);
        assert_eq!(
            tracker.lagging(&ring(), &participants, requirement).await,
            ids(&["s3"])
        );

        tracker.begin(&ring(), "s3").await.unwrap();
        tracker
            .transition(&ring(), "s3", RingState::ReadyForConvergence1)
            .await
            .unwrap();
        assert!(tracker.quorum_met(&ring(), &participants, requirement).await);
        assert_eq!(
            tracker
                .lagging(&ring(), &participants, RingState::ReadyForConvergence2)
                .await,
            ids(&["s2", "s3"])
        );
    }

    #[tokio::test]
    async fn test_versions_tracked_independently() {
        let tracker = RingStateTracker::in_memory();
        let next = RingIdAndVersionPair::from_name_and_versions("ring.test", 3, 2);
        tracker.begin(&ring(), "s1").await.unwrap();
        tracker.begin(&next, "s1").await.unwrap();
        tracker.transition(&ring(), "s1", RingState::Abandoned).await.unwrap();

        assert_eq!(tracker.state(&next, "s1").await, Some(RingState::Initial));
        assert!(tracker.should_initiate(&next, "s1").await);
    }

    #[tokio::test]
    async fn test_recover_from_store() {
        let store: Arc<dyn RingStateStore> = Arc::new(InMemoryRingStateStore::new());
        let tracker = RingStateTracker::new(store.clone());
        tracker.begin(&ring(), "s1").await.unwrap();
        tracker.begin(&ring(), "s2").await.unwrap();
        tracker
            .transition(&ring(), "s2", RingState::ReadyForConvergence1)
            .await
            .unwrap();

        let restarted = RingStateTracker::new(store);
        assert_eq!(restarted.recover().await.unwrap(), 2);
        assert_eq!(restarted.state(&ring(), "s1").await, Some(RingState::Initial));
        assert_eq!(
            restarted.state(&ring(), "s2").await,
            Some(RingState::ReadyForConvergence1)
        );
    }

    #[tokio::test]
    async fn test_forget_ring() {
        let store = Arc::new(InMemoryRingStateStore::new());
        let tracker = RingStateTracker::new(store.clone());
        tracker.begin(&ring(), "s1").await.unwrap();
        tracker.forget(&ring()).await.unwrap();

        assert_eq!(tracker.state(&ring(), "s1").await, None);
        assert!(store.load_states().await.unwrap().is_empty());
    }

    /// Store whose INITIAL saves park until released and then fail.
    #[derive(Debug, Default)]
    struct StallingStore {
        inner: InMemoryRingStateStore,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl RingStateStore for StallingStore {
        async fn save_state(&self, record: &RingStateRecord) -> Result<()> {
            if record.state == RingState::Initial {
                self.entered.notify_one();
                self.release.notified().await;
                return Err(Error::Storage("disk detached".to_string()));
            }
            self.inner.save_state(record).await
        }

        async fn load_states(&self) -> Result<Vec<RingStateRecord>> {
            self.inner.load_states().await
        }

        async fn delete_ring(&self, ring: &RingIdAndVersionPair) -> Result<()> {
            self.inner.delete_ring(ring).await
        }
    }

    #[tokio::test]
    async fn test_transition_waiting_on_failed_begin_is_rejected() {
        let store = Arc::new(StallingStore::default());
        let tracker = Arc::new(RingStateTracker::new(store.clone()));

        let begin = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.begin(&ring(), "s1").await }
        });
        store.entered.notified().await;

        let transition = tokio::spawn({
            let tracker = tracker.clone();
            async move {
                tracker
                    .transition(&ring(), "s1", RingState::ReadyForConvergence1)
                    .await
            }
        });
        // Let the transition pick up the slot and queue on its lock.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        store.release.notify_one();

        assert!(matches!(begin.await.unwrap(), Err(Error::Storage(_))));
        assert!(matches!(
            transition.await.unwrap(),
            Err(Error::RingStateNotFound { .. })
        ));
        assert_eq!(tracker.state(&ring(), "s1").await, None);
        assert!(store.load_states().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recover_keeps_slot_and_never_moves_back() {
        let store = Arc::new(InMemoryRingStateStore::new());
        let tracker = RingStateTracker::new(store.clone());
        tracker.begin(&ring(), "s1").await.unwrap();
        let held = tracker.slot(&ring(), "s1").unwrap();

        // Another process moved s1 forward in the shared store.
        store
            .save_state(&RingStateRecord::new(ring(), "s1", RingState::ReadyForConvergence2))
            .await
            .unwrap();
        assert_eq!(tracker.recover().await.unwrap(), 1);
        assert_eq!(
            tracker.state(&ring(), "s1").await,
            Some(RingState::ReadyForConvergence2)
        );
        assert!(Arc::ptr_eq(&held, &tracker.slot(&ring(), "s1").unwrap()));

        tracker
            .transition(&ring(), "s1", RingState::LocalConvergenceComplete1)
            .await
            .unwrap();
        // A stale record must not undo the newer in-memory state.
        store
            .save_state(&RingStateRecord::new(ring(), "s1", RingState::ReadyForConvergence1))
            .await
            .unwrap();
        tracker.recover().await.unwrap();
        assert_eq!(
            tracker.state(&ring(), "s1").await,
            Some(RingState::LocalConvergenceComplete1)
        );
    }

    #[tokio::test]
    async fn test_transition_after_forget_is_rejected() {
        let store = Arc::new(InMemoryRingStateStore::new());
        let tracker = RingStateTracker::new(store.clone());
        tracker.begin(&ring(), "s1").await.unwrap();
        tracker.forget(&ring()).await.unwrap();

        let result = tracker
            .transition(&ring(), "s1", RingState::ReadyForConvergence1)
            .await;
        assert!(matches!(result, Err(Error::RingStateNotFound { .. })));
        assert!(store.load_states().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transitions_serialize() {
        let tracker = Arc::new(RingStateTracker::in_memory());
        tracker.begin(&ring(), "s1").await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    tracker
                        .transition(&ring(), "s1", RingState::ReadyForConvergence1)
                        .await
                })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        // The first wins; the rest see READY_FOR_CONVERGENCE_1 -> itself.
        assert_eq!(succeeded, 1);
        assert_eq!(
            tracker.state(&ring(), "s1").await,
            Some(RingState::ReadyForConvergence1)
        );
    }
}
