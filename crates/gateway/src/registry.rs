use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::connection::ConnectionHandle;

/// Verdict a fan-out callback returns for each visited connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
}

/// The set of currently live connections, keyed by conn_id.
///
/// Add, remove and traversal share one lock. The lock is never held across
/// an await point, so callbacks passed to [`for_each_live`](Self::for_each_live)
/// must not block.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ConnectionHandle>> {
        // A panicking callback leaves the map itself consistent.
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection. Returns false if it was already registered.
    pub fn register(&self, conn: ConnectionHandle) -> bool {
        let mut connections = self.lock();
        if connections.contains_key(conn.conn_id()) {
            return false;
        }
        connections.insert(conn.conn_id().to_string(), conn);
        true
    }

    /// Remove a connection. Removing an absent connection is a no-op.
    pub fn deregister(&self, conn_id: &str) -> Option<ConnectionHandle> {
        self.lock().remove(conn_id)
    }

    /// Visit every registered connection exactly once.
    ///
    /// Connections for which `f` returns [`Liveness::Dead`] are removed in
    /// the same pass and returned so the caller can close them.
    pub fn for_each_live(
        &self,
        mut f: impl FnMut(&ConnectionHandle) -> Liveness,
    ) -> Vec<ConnectionHandle> {
        let mut dead = Vec::new();
        self.lock().retain(|_, conn| match f(conn) {
            Liveness::Alive => true,
            Liveness::Dead => {
                dead.push(conn.clone());
                false
            },
        });
        dead
    }

    pub fn contains(&self, conn_id: &str) -> bool {
        self.lock().contains_key(conn_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return every connection.
    pub fn drain(&self) -> Vec<ConnectionHandle> {
        self.lock().drain().map(|(_, conn)| conn).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::*;

    fn conn() -> ConnectionHandle {
        ConnectionHandle::new(None, 8).0
    }

    #[test]
    fn register_is_at_most_once() {
        let registry = ConnectionRegistry::new();
        let c = conn();
        assert!(registry.register(c.clone()));
        assert!(!registry.register(c.clone()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn deregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let c = conn();
        registry.register(c.clone());
        assert!(registry.deregister(c.conn_id()).is_some());
        assert!(registry.deregister(c.conn_id()).is_none());
        assert!(registry.deregister("never-registered").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn for_each_live_visits_each_once_and_removes_dead() {
        let registry = ConnectionRegistry::new();
        let conns: Vec<_> = (0..5).map(|_| conn()).collect();
        for c in &conns {
            registry.register(c.clone());
        }
        let doomed: HashSet<String> = conns[..2]
            .iter()
            .map(|c| c.conn_id().to_string())
            .collect();

        let mut visited = Vec::new();
        let dead = registry.for_each_live(|c| {
            visited.push(c.conn_id().to_string());
            if doomed.contains(c.conn_id()) {
                Liveness::Dead
            } else {
                Liveness::Alive
            }
        });

        assert_eq!(visited.len(), 5);
        assert_eq!(visited.iter().collect::<HashSet<_>>().len(), 5);
        assert_eq!(
            dead.iter().map(|c| c.conn_id().to_string()).collect::<HashSet<_>>(),
            doomed
        );
        assert_eq!(registry.len(), 3);
        for c in &conns[2..] {
            assert!(registry.contains(c.conn_id()));
        }
    }

    #[test]
    fn deregistered_connection_is_not_visited() {
        let registry = ConnectionRegistry::new();
        let a = conn();
        let b = conn();
        registry.register(a.clone());
        registry.register(b.clone());
        registry.deregister(a.conn_id());

        let mut visited = Vec::new();
        registry.for_each_live(|c| {
            visited.push(c.conn_id().to_string());
            Liveness::Alive
        });
        assert_eq!(visited, vec![b.conn_id().to_string()]);
    }

    #[test]
    fn concurrent_register_and_traverse() {
        let registry = Arc::new(ConnectionRegistry::new());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let c = conn();
                        registry.register(c.clone());
                        registry.for_each_live(|_| Liveness::Alive);
                        registry.deregister(c.conn_id());
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn drain_empties_registry() {
        let registry = ConnectionRegistry::new();
        registry.register(conn());
        registry.register(conn());
        assert_eq!(registry.drain().len(), 2);
        assert!(registry.is_empty());
    }
}
