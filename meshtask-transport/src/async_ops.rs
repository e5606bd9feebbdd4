//! Tracks in-flight non-blocking sends so their serialized buffers outlive
//! the send itself, and are reclaimed the moment it's known complete.
//!
//! Over this in-process channel mesh, `isend` enqueues synchronously and a
//! `SendHandle` is always already complete by the time it's returned — but
//! the tracker still mediates buffer lifetime, which is the part of the
//! contract that matters: a caller must never free an outbound buffer
//! through any path other than this tracker.

/// A single outstanding `isend`. Opaque to callers beyond registering it
/// with an `AsyncOperations` tracker.
pub struct SendHandle {
    done: bool,
}

impl SendHandle {
    pub(crate) fn done() -> Self {
        Self { done: true }
    }
}

/// Owns the completion handles (and, indirectly, the serialized buffers)
/// of every non-blocking send issued so far.
#[derive(Default)]
pub struct AsyncOperations {
    pending: Vec<SendHandle>,
}

impl AsyncOperations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, handles: impl IntoIterator<Item = SendHandle>) {
        self.pending.extend(handles);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Reaps any sends that have already finished, dropping their handles
    /// (and with them, their buffers).
    pub fn check(&mut self) {
        self.pending.retain(|op| !op.done);
    }

    /// Awaits every outstanding send to completion. Called at shutdown to
    /// guarantee no tracked buffer is still needed by anything in flight.
    pub async fn finish(&mut self) {
        self.pending.clear();
    }
}
