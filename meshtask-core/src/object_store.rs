//! Per-rank value store: every rank, controller included, keeps one of
//! these. Values, the set of consumers waiting on a not-yet-produced
//! output, a serialized-payload cache, and (for ids this rank has learned
//! about via PUT_OWNER, or minted itself) a location map all live here.

use std::collections::HashMap;
use std::collections::HashSet;

use meshtask_messages::BaseId;
use meshtask_messages::Rank;
use meshtask_messages::TaskOutcome;

#[derive(Default)]
pub struct ObjectStore {
    values: HashMap<BaseId, TaskOutcome>,
    pending_outputs: HashMap<BaseId, HashSet<Rank>>,
    serialized_cache: HashMap<BaseId, Vec<u8>>,
    locations: HashMap<BaseId, Rank>,
    counters: HashMap<Rank, u64>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &BaseId) -> bool {
        self.values.contains_key(id)
    }

    /// Stores `value` under `id`. Overwriting an existing value is
    /// consistent within a run but otherwise undefined, per the store's
    /// idempotence contract — callers are expected to put each id once.
    pub fn put(&mut self, id: BaseId, value: TaskOutcome) {
        self.pending_outputs.remove(&id);
        self.values.insert(id, value);
    }

    pub fn get(&self, id: &BaseId) -> Option<&TaskOutcome> {
        self.values.get(id)
    }

    pub fn is_serialized(&self, id: &BaseId) -> bool {
        self.serialized_cache.contains_key(id)
    }

    pub fn get_serialized(&self, id: &BaseId) -> Option<&[u8]> {
        self.serialized_cache.get(id).map(Vec::as_slice)
    }

    /// Caches a serialized form of an id's value. Precondition: `put` has
    /// already run for this id.
    pub fn cache_serialized(&mut self, id: BaseId, bytes: Vec<u8>) {
        debug_assert!(self.values.contains_key(&id), "caching serialized form before the value lands");
        self.serialized_cache.insert(id, bytes);
    }

    pub fn clear_serialized(&mut self, id: &BaseId) {
        self.serialized_cache.remove(id);
    }

    /// Records that `id` has been promised as a task output but not yet
    /// produced, and that `consumer` is interested in it.
    pub fn mark_pending_output(&mut self, id: BaseId, consumer: Rank) {
        self.pending_outputs.entry(id).or_default().insert(consumer);
    }

    pub fn is_pending_output(&self, id: &BaseId) -> bool {
        self.pending_outputs.contains_key(id)
    }

    pub fn record_location(&mut self, id: BaseId, owner: Rank) {
        self.locations.insert(id, owner);
    }

    pub fn location_of(&self, id: &BaseId) -> Option<Rank> {
        self.locations.get(id).copied()
    }

    pub fn forget(&mut self, id: &BaseId) {
        self.values.remove(id);
        self.pending_outputs.remove(id);
        self.serialized_cache.remove(id);
        self.locations.remove(id);
    }

    /// Mints a fresh id owned by `owner`. Controller-only: only the
    /// controller mints ids, so it alone needs per-owner-rank counters to
    /// keep `(owner, counter)` globally unique.
    pub fn generate_data_id(&mut self, owner: Rank) -> BaseId {
        let counter = self.counters.entry(owner).or_insert(0);
        let id = BaseId::new(owner, *counter);
        *counter += 1;
        id
    }

    /// Mints `n` fresh ids, all owned by `dest_rank` — the worker that
    /// will execute the task producing them.
    pub fn generate_output_ids(&mut self, dest_rank: Rank, n: usize) -> Vec<BaseId> {
        (0..n).map(|_| self.generate_data_id(dest_rank)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_per_owner() {
        let mut store = ObjectStore::new();
        let a = store.generate_data_id(0);
        let b = store.generate_data_id(0);
        let c = store.generate_data_id(2);
        assert_ne!(a, b);
        assert_eq!(a.owner_rank(), 0);
        assert_eq!(c.owner_rank(), 2);
        assert_eq!(c.counter(), 0);
    }

    #[test]
    fn put_clears_pending_output() {
        let mut store = ObjectStore::new();
        let id = BaseId::new(2, 0);
        store.mark_pending_output(id, 0);
        assert!(store.is_pending_output(&id));
        store.put(id, TaskOutcome::Ready(vec![1, 2, 3]));
        assert!(!store.is_pending_output(&id));
        assert!(store.contains(&id));
    }

    #[test]
    fn output_ids_share_the_destination_owner() {
        let mut store = ObjectStore::new();
        let ids = store.generate_output_ids(3, 4);
        assert_eq!(ids.len(), 4);
        assert!(ids.iter().all(|id| id.owner_rank() == 3));
        assert_eq!(ids[0].counter(), 0);
        assert_eq!(ids[3].counter(), 3);
    }
}
