//! Controller-side garbage collector. Receives a `collect(id)` call the
//! instant an `OwnedID`'s last clone drops, and batches the resulting
//! CLEANUP messages per owning rank rather than sending them immediately.
//!
//! Flushing a batch before the CLEANUP's dependents (the EXECUTE/PUT_OWNER
//! that reference the id) have been observed by the owning worker would
//! violate per-pair FIFO ordering's one useful guarantee here, so batches
//! are only flushed at quiescence or once they cross `threshold` — see
//! `Controller::maybe_flush_gc`.

use std::collections::HashMap;
use std::sync::Mutex;

use meshtask_messages::BaseId;
use meshtask_messages::GcSink;
use meshtask_messages::Rank;

pub struct GarbageCollector {
    batches: Mutex<HashMap<Rank, Vec<BaseId>>>,
    threshold: usize,
}

impl GarbageCollector {
    pub fn new(threshold: usize) -> Self {
        Self { batches: Mutex::new(HashMap::new()), threshold }
    }

    pub fn should_flush(&self, rank: Rank) -> bool {
        self.batches.lock().unwrap().get(&rank).is_some_and(|batch| batch.len() >= self.threshold)
    }

    pub fn has_pending(&self) -> bool {
        self.batches.lock().unwrap().values().any(|batch| !batch.is_empty())
    }

    /// Drains every batch, regardless of size — used at quiescence and at
    /// shutdown, when it is always safe to flush.
    pub fn take_all_batches(&self) -> HashMap<Rank, Vec<BaseId>> {
        let mut guard = self.batches.lock().unwrap();
        std::mem::take(&mut *guard).into_iter().filter(|(_, ids)| !ids.is_empty()).collect()
    }

    pub fn take_batch(&self, rank: Rank) -> Vec<BaseId> {
        self.batches.lock().unwrap().remove(&rank).unwrap_or_default()
    }
}

impl GcSink for GarbageCollector {
    fn collect(&self, id: BaseId) {
        self.batches.lock().unwrap().entry(id.owner_rank()).or_default().push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_group_by_owner_rank() {
        let gc = GarbageCollector::new(100);
        gc.collect(BaseId::new(2, 0));
        gc.collect(BaseId::new(3, 0));
        gc.collect(BaseId::new(2, 1));

        let batches = gc.take_all_batches();
        assert_eq!(batches.get(&2).unwrap().len(), 2);
        assert_eq!(batches.get(&3).unwrap().len(), 1);
        assert!(!gc.has_pending());
    }

    #[test]
    fn threshold_trips_after_enough_entries() {
        let gc = GarbageCollector::new(2);
        gc.collect(BaseId::new(2, 0));
        assert!(!gc.should_flush(2));
        gc.collect(BaseId::new(2, 1));
        assert!(gc.should_flush(2));
    }
}
