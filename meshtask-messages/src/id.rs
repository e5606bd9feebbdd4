use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

/// Identity of a process within the cluster. 0 = controller, 1 = monitor,
/// >= 2 = worker.
pub type Rank = u32;

/// Opaque, globally-unique identifier: the rank that owns the value plus a
/// counter that is monotonically increasing within that rank. Equality and
/// hashing are over the pair, matching the spec's "single integer value"
/// encoding decomposed into its two logical halves.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BaseId {
    owner_rank: Rank,
    counter: u64,
}

impl BaseId {
    pub fn new(owner_rank: Rank, counter: u64) -> Self {
        Self {
            owner_rank,
            counter,
        }
    }

    /// The rank responsible for housing this id's value.
    pub fn owner_rank(&self) -> Rank {
        self.owner_rank
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }
}

impl fmt::Debug for BaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BaseId({}:{})", self.owner_rank, self.counter)
    }
}

impl fmt::Display for BaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Receives a `BaseId` whose last controller-side holder has just dropped.
///
/// Implemented by the garbage collector; kept as a trait so
/// `meshtask-messages` does not need to depend on `meshtask-core`.
pub trait GcSink: Send + Sync {
    fn collect(&self, id: BaseId);
}

struct OwnedIdInner {
    base: BaseId,
    gc: Arc<dyn GcSink>,
}

impl Drop for OwnedIdInner {
    fn drop(&mut self) {
        self.gc.collect(self.base);
    }
}

/// A `BaseId` plus a controller-side lifecycle hook. Only rank 0 ever
/// constructs one. Cloning shares the release obligation through the
/// `Arc`'s own reference count; the cleanup fires exactly once, when the
/// last clone drops.
#[derive(Clone)]
pub struct OwnedId {
    inner: Arc<OwnedIdInner>,
}

impl OwnedId {
    pub fn new(base: BaseId, gc: Arc<dyn GcSink>) -> Self {
        Self {
            inner: Arc::new(OwnedIdInner { base, gc }),
        }
    }

    /// Strips the lifecycle hook, yielding the transportable form.
    pub fn base(&self) -> BaseId {
        self.inner.base
    }
}

impl fmt::Debug for OwnedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnedId({:?})", self.inner.base)
    }
}

impl PartialEq for OwnedId {
    fn eq(&self, other: &Self) -> bool {
        self.inner.base == other.inner.base
    }
}

impl Eq for OwnedId {}

/// Serializes as the underlying `BaseId`: the lifecycle hook never crosses
/// the wire. `OwnedId` intentionally has no `Deserialize` impl — only the
/// controller constructs one, and it always does so via `new`.
impl Serialize for OwnedId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.inner.base.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGc {
        collected: Mutex<Vec<BaseId>>,
    }

    impl GcSink for RecordingGc {
        fn collect(&self, id: BaseId) {
            self.collected.lock().unwrap().push(id);
        }
    }

    #[test]
    fn drop_of_last_clone_enqueues_cleanup() {
        let gc = Arc::new(RecordingGc::default());
        let base = BaseId::new(2, 7);
        let id = OwnedId::new(base, gc.clone());
        let clone = id.clone();

        drop(id);
        assert!(gc.collected.lock().unwrap().is_empty());

        drop(clone);
        assert_eq!(gc.collected.lock().unwrap().as_slice(), &[base]);
    }

    #[test]
    fn serializes_as_base_id() {
        let gc = Arc::new(RecordingGc::default());
        let base = BaseId::new(0, 3);
        let id = OwnedId::new(base, gc);
        let encoded = bincode::serialize(&id).unwrap();
        let decoded: BaseId = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, base);
    }
}
