//! Active shell registry
//!
//! Maps channel ids handed to the frontend onto the command channels of
//! their pump tasks. Ids are process-local and start at 100 so they are
//! never confused with the terminal message codes.

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::shell::SessionCommand;

const FIRST_CHANNEL_ID: u32 = 100;

/// Handle to one running shell session
pub struct ShellHandle {
    pub cmd_tx: mpsc::Sender<SessionCommand>,
}

/// Registry of all active shell sessions
pub struct ShellRegistry {
    sessions: DashMap<u32, ShellHandle>,
    next_id: AtomicU32,
}

impl ShellRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU32::new(FIRST_CHANNEL_ID),
        }
    }

    /// Allocate the next channel id
    pub fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, id: u32, handle: ShellHandle) {
        self.sessions.insert(id, handle);
    }

    /// Command sender for a session, if it is still running
    pub fn cmd_tx(&self, id: u32) -> Option<mpsc::Sender<SessionCommand>> {
        self.sessions.get(&id).map(|h| h.cmd_tx.clone())
    }

    /// Remove a session; the pump task calls this when its loop ends
    pub fn remove(&self, id: u32) {
        self.sessions.remove(&id);
    }
}

impl Default for ShellRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_100_and_increment() {
        let registry = ShellRegistry::new();
        assert_eq!(registry.next_id(), 100);
        assert_eq!(registry.next_id(), 101);
    }

    #[tokio::test]
    async fn test_insert_lookup_remove() {
        let registry = ShellRegistry::new();
        let (tx, _rx) = mpsc::channel(8);

        let id = registry.next_id();
        registry.insert(id, ShellHandle { cmd_tx: tx });

        assert!(registry.cmd_tx(id).is_some());

        registry.remove(id);
        assert!(registry.cmd_tx(id).is_none());
    }
}
