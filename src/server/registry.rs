//! Active client registry

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::client::ClientRef;
use crate::signal::HandlerId;

/// A client owned by the server
pub(crate) struct ManagedClient {
    pub client: ClientRef,
    /// Subscription to the client's `closed` notification
    pub closed_handler: HandlerId,
}

/// Set of clients the server currently manages, keyed by a registry id
#[derive(Default)]
pub(crate) struct ClientRegistry {
    clients: Mutex<BTreeMap<u64, ManagedClient>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id for a client about to be managed
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn insert(&self, id: u64, client: ClientRef, closed_handler: HandlerId) -> usize {
        let mut clients = self.clients.lock();
        clients.insert(
            id,
            ManagedClient {
                client,
                closed_handler,
            },
        );
        clients.len()
    }

    pub fn remove(&self, id: u64) -> Option<ManagedClient> {
        self.clients.lock().remove(&id)
    }

    /// Managed clients, in the order they were registered
    pub fn snapshot(&self) -> Vec<ClientRef> {
        self.clients
            .lock()
            .values()
            .map(|managed| Arc::clone(&managed.client))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }
}
