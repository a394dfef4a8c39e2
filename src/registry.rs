//! Bookkeeping for live session workers.
//!
//! Owned by the supervisor task, so no lock of its own. Workers flag
//! themselves completed; the supervisor reaps on its next pass, joining the
//! task so its resources are fully released. Reaping collects candidates
//! first and removes them afterwards, never mutating the map mid-iteration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Handle to one spawned session worker.
pub struct SessionHandle {
    pub completed: Arc<AtomicBool>,
    pub handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<Uuid, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: Uuid, session: SessionHandle) {
        self.sessions.insert(id, session);
    }

    /// Number of registered sessions, reaped or not.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Joins and removes every session whose worker has finished. Returns the
    /// number reaped. Never blocks on a session that is still running.
    pub async fn reap(&mut self) -> usize {
        let finished: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.completed.load(Ordering::SeqCst))
            .map(|(id, _)| *id)
            .collect();
        for id in &finished {
            if let Some(session) = self.sessions.remove(id) {
                if let Err(error) = session.handle.await {
                    tracing::warn!(session = %id, %error, "session worker panicked");
                }
                tracing::debug!(session = %id, "session reaped");
            }
        }
        finished.len()
    }

    /// Joins every remaining session unconditionally. Shutdown path only.
    pub async fn drain(&mut self) {
        for (id, session) in self.sessions.drain() {
            if let Err(error) = session.handle.await {
                tracing::warn!(session = %id, %error, "session worker panicked");
            }
            tracing::debug!(session = %id, "session drained");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn spawn_session(
        registry: &mut SessionRegistry,
        release: oneshot::Receiver<()>,
    ) -> (Uuid, Arc<AtomicBool>) {
        let id = Uuid::new_v4();
        let completed = Arc::new(AtomicBool::new(false));
        let flag = completed.clone();
        let handle = tokio::spawn(async move {
            let _ = release.await;
            flag.store(true, Ordering::SeqCst);
        });
        registry.insert(id, SessionHandle { completed: completed.clone(), handle });
        (id, completed)
    }

    #[tokio::test]
    async fn reap_removes_only_completed_sessions() {
        let mut registry = SessionRegistry::new();
        let (done_tx, done_rx) = oneshot::channel();
        let (_live_tx, live_rx) = oneshot::channel();
        let (_, done_flag) = spawn_session(&mut registry, done_rx);
        spawn_session(&mut registry, live_rx);

        done_tx.send(()).unwrap();
        // Wait for the finished worker to flag itself.
        while !done_flag.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        assert_eq!(registry.reap().await, 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn reap_on_empty_registry_is_a_no_op() {
        let mut registry = SessionRegistry::new();
        assert_eq!(registry.reap().await, 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn drain_joins_everything() {
        let mut registry = SessionRegistry::new();
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        spawn_session(&mut registry, rx_a);
        spawn_session(&mut registry, rx_b);

        tx_a.send(()).unwrap();
        tx_b.send(()).unwrap();
        registry.drain().await;
        assert!(registry.is_empty());
    }
}
