//! Background persistence writer
//!
//! Handlers enqueue saves and deletes after releasing the room lock; a single
//! writer task applies them. Operations that pile up for the same room are
//! coalesced so only the latest one reaches the backend. Saves are ordered by
//! room revision, so a record older than one already queued or written is
//! dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::room::RoomId;

use super::{RoomRecord, RoomRepository};

enum PersistOp {
    Save(RoomRecord),
    Delete(RoomId),
    Flush(oneshot::Sender<()>),
}

/// Latest pending write for one room
enum Pending {
    Save(RoomRecord),
    Delete,
}

/// Handle to the persistence writer. Cloning is cheap; enqueueing never
/// blocks.
#[derive(Clone)]
pub struct Persistence {
    tx: Option<mpsc::UnboundedSender<PersistOp>>,
}

impl Persistence {
    /// Spawn the writer task over `repository`
    pub fn spawn(repository: Arc<RoomRepository>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_writer(repository, rx));
        (Self { tx: Some(tx) }, handle)
    }

    /// A handle that drops every operation
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn save(&self, record: RoomRecord) {
        self.send(PersistOp::Save(record));
    }

    pub fn delete(&self, room_id: RoomId) {
        self.send(PersistOp::Delete(room_id));
    }

    /// Wait until everything enqueued so far has been written
    pub async fn flush(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(PersistOp::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn send(&self, op: PersistOp) {
        if let Some(tx) = &self.tx {
            if tx.send(op).is_err() {
                warn!("Persistence writer stopped, dropping write");
            }
        }
    }
}

async fn run_writer(repository: Arc<RoomRepository>, mut rx: mpsc::UnboundedReceiver<PersistOp>) {
    // Highest revision written per room
    let mut written: HashMap<RoomId, u64> = HashMap::new();

    while let Some(first) = rx.recv().await {
        let mut pending: HashMap<RoomId, Pending> = HashMap::new();
        let mut order: Vec<RoomId> = Vec::new();
        let mut waiters: Vec<oneshot::Sender<()>> = Vec::new();

        let mut next = Some(first);
        while let Some(op) = next {
            match op {
                PersistOp::Save(record) => {
                    coalesce(&mut pending, &mut order, record.id.clone(), Pending::Save(record))
                }
                PersistOp::Delete(room_id) => {
                    coalesce(&mut pending, &mut order, room_id, Pending::Delete)
                }
                PersistOp::Flush(done) => waiters.push(done),
            }
            next = rx.try_recv().ok();
        }

        for room_id in order {
            let Some(write) = pending.remove(&room_id) else {
                continue;
            };
            let result = match &write {
                Pending::Save(record) => {
                    if written.get(&room_id).is_some_and(|&rev| rev > record.revision) {
                        debug!(
                            room_id = %room_id,
                            revision = record.revision,
                            "Dropped stale room record"
                        );
                        continue;
                    }
                    repository.save(record).await.map(|()| {
                        written.insert(room_id.clone(), record.revision);
                    })
                }
                Pending::Delete => repository.delete(&room_id).await.map(|()| {
                    written.remove(&room_id);
                }),
            };
            match result {
                Ok(()) => debug!(room_id = %room_id, "Persisted room"),
                Err(e) => error!(room_id = %room_id, error = %e, "Failed to persist room"),
            }
        }

        for done in waiters {
            let _ = done.send(());
        }
    }
}

/// Queue `write` for `room_id` unless a newer save is already queued
fn coalesce(
    pending: &mut HashMap<RoomId, Pending>,
    order: &mut Vec<RoomId>,
    room_id: RoomId,
    write: Pending,
) {
    if let (Some(Pending::Save(queued)), Pending::Save(record)) = (pending.get(&room_id), &write) {
        if queued.revision > record.revision {
            return;
        }
    }
    if pending.insert(room_id.clone(), write).is_none() {
        order.push(room_id);
    }
}
