//! Worker-side bookkeeping for GET/WAIT requests that arrived before the
//! data they ask for. `check_pending_get`/`check_pending_wait` drain these
//! bins the moment the awaited id lands in the local `ObjectStore`.

use std::collections::HashMap;
use std::collections::HashSet;

use meshtask_messages::BaseId;
use meshtask_messages::OpCode;
use meshtask_messages::PutDataPayload;
use meshtask_messages::Rank;
use meshtask_messages::WaitAckPayload;
use meshtask_messages::CONTROLLER_RANK;
use meshtask_transport::AsyncOperations;
use meshtask_transport::Transport;
use meshtask_transport::TransportError;

use crate::object_store::ObjectStore;

#[derive(Default)]
pub struct RequestStore {
    data_requests: HashMap<BaseId, HashSet<Rank>>,
    blocking_data_requests: HashMap<BaseId, HashSet<Rank>>,
    wait_requests: HashMap<BaseId, Rank>,
    requested_cache: HashSet<BaseId>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a deferred GET. `blocking` is only honored when `requester`
    /// is the controller — any other requester is demoted to the
    /// non-blocking bin regardless of what it asked for, per the
    /// deadlock-avoidance rule: a worker can always make progress on
    /// other tasks while it waits, so nothing but the controller may ever
    /// tie up a reply with a synchronous `PUT_DATA`.
    pub fn put(&mut self, id: BaseId, requester: Rank, blocking: bool) {
        if blocking && requester == CONTROLLER_RANK {
            self.blocking_data_requests.entry(id).or_default().insert(requester);
        } else {
            self.data_requests.entry(id).or_default().insert(requester);
        }
    }

    pub fn put_wait(&mut self, id: BaseId, requester: Rank) {
        self.wait_requests.insert(id, requester);
    }

    pub fn is_already_requested(&self, id: &BaseId) -> bool {
        self.requested_cache.contains(id)
    }

    pub fn mark_requested(&mut self, id: BaseId) {
        self.requested_cache.insert(id);
    }

    pub fn clear_cache(&mut self, id: &BaseId) {
        self.requested_cache.remove(id);
    }

    /// Serves every requester waiting on `ids` whose value has just landed
    /// in `store`. Blocking requesters get a synchronous `PUT_DATA`;
    /// non-blocking requesters get an async complex send, with the
    /// serialized payload cached in `store` so a second requester for the
    /// same id doesn't pay to re-encode it.
    pub async fn check_pending_get(
        &mut self,
        ids: &[BaseId],
        store: &mut ObjectStore,
        transport: &Transport,
        async_ops: &mut AsyncOperations,
    ) -> Result<(), TransportError> {
        for id in ids {
            let Some(outcome) = store.get(id).cloned() else { continue };

            if let Some(requesters) = self.blocking_data_requests.remove(id) {
                for requester in requesters {
                    transport
                        .send(requester, OpCode::PutData, &PutDataPayload { id: *id, data: outcome.clone() })
                        .await?;
                }
            }

            if let Some(requesters) = self.data_requests.remove(id) {
                if requesters.is_empty() {
                    continue;
                }
                if !store.is_serialized(id) {
                    let bytes = bincode::serialize(&PutDataPayload { id: *id, data: outcome.clone() })
                        .expect("PutDataPayload is bincode-serializable");
                    store.cache_serialized(*id, bytes);
                }
                let payload = store.get_serialized(id).expect("just cached").to_vec();
                let mut handles = Vec::with_capacity(requesters.len());
                for requester in requesters {
                    let (handle, _buf) = transport.isend_raw(requester, OpCode::PutData, payload.clone())?;
                    handles.push(handle);
                }
                async_ops.extend(handles);
            }
        }
        Ok(())
    }

    /// Acknowledges every WAIT requester whose id has just landed. The ack
    /// carries only the id, never the value, and always travels through
    /// the async path since it is never on the controller's hot path.
    pub fn check_pending_wait(
        &mut self,
        ids: &[BaseId],
        store: &ObjectStore,
        transport: &Transport,
        async_ops: &mut AsyncOperations,
    ) -> Result<(), TransportError> {
        for id in ids {
            if !store.contains(id) {
                continue;
            }
            if let Some(requester) = self.wait_requests.remove(id) {
                let (handle, _buf) = transport.isend(requester, OpCode::WaitAck, &WaitAckPayload { id: *id })?;
                async_ops.extend([handle]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshtask_messages::TaskOutcome;

    #[tokio::test]
    async fn blocking_and_nonblocking_requesters_are_both_served() {
        let mut ranks = meshtask_transport::build_cluster(4, 8);
        let mut r2 = ranks.remove(2);
        let r3 = ranks.remove(2);
        let mut r0 = ranks.remove(0);

        let id = BaseId::new(2, 0);
        let mut requests = RequestStore::new();
        requests.put(id, 0, true);
        requests.put(id, 3, false);

        let mut store = ObjectStore::new();
        store.put(id, TaskOutcome::Ready(vec![9]));
        let mut async_ops = AsyncOperations::new();

        requests.check_pending_get(&[id], &mut store, &r2, &mut async_ops).await.unwrap();
        async_ops.finish().await;

        let frame = r0.recv().await.unwrap();
        assert_eq!(frame.op, OpCode::PutData);

        drop(r3);
    }

    #[test]
    fn duplicate_requests_to_same_id_collapse() {
        let mut requests = RequestStore::new();
        let id = BaseId::new(2, 0);
        requests.put(id, 5, false);
        requests.put(id, 5, false);
        assert_eq!(requests.data_requests.get(&id).unwrap().len(), 1);
    }

    #[test]
    fn a_non_controller_requester_is_demoted_to_non_blocking() {
        let mut requests = RequestStore::new();
        let id = BaseId::new(2, 0);
        requests.put(id, 5, true);
        assert!(requests.blocking_data_requests.get(&id).is_none());
        assert_eq!(requests.data_requests.get(&id).unwrap().len(), 1);
    }
}
