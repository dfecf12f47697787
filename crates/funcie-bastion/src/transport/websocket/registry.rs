//! Connection registry: application -> the socket serving it.
//!
//! Every write to a registered connection happens under
//! [`ConnectionRegistry::acquire_exclusive`]. Registering over an existing
//! application waits for the current holder and closes the replaced socket.

use std::ops::Deref;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::connection::ApplicationConnection;

pub const REPLACED_REASON: &str = "replaced by new connection";

type Slot = Arc<Mutex<Option<Arc<ApplicationConnection>>>>;

#[derive(Default)]
pub struct ConnectionRegistry {
    slots: DashMap<String, Slot>,
}

/// Exclusive use of an application's connection until released or dropped.
pub struct ExclusiveConnection {
    slot: Slot,
    conn: Arc<ApplicationConnection>,
    _guard: OwnedMutexGuard<Option<Arc<ApplicationConnection>>>,
}

impl Deref for ExclusiveConnection {
    type Target = ApplicationConnection;

    fn deref(&self) -> &ApplicationConnection {
        &self.conn
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, application: &str) -> Option<Slot> {
        self.slots.get(application).map(|r| Arc::clone(r.value()))
    }

    fn is_current(&self, application: &str, slot: &Slot) -> bool {
        self.slot(application).is_some_and(|s| Arc::ptr_eq(&s, slot))
    }

    /// Register `conn` for its application, replacing any previous one.
    pub async fn register(&self, conn: ApplicationConnection) -> Arc<ApplicationConnection> {
        let conn = Arc::new(conn);
        let application = conn.application().to_string();
        loop {
            let slot = Arc::clone(self.slots.entry(application.clone()).or_default().value());
            let mut current = slot.lock().await;
            if !self.is_current(&application, &slot) {
                // Unregistered while we waited.
                continue;
            }
            let replaced = current.replace(Arc::clone(&conn));
            drop(current);
            tracing::debug!(application = %application, connection = %conn.socket_id(), "connection registered");

            // Closed outside the slot lock so a stalled peer never blocks
            // publishers to the new connection.
            if let Some(old) = replaced {
                old.detach();
                if old.socket_id() != conn.socket_id() {
                    tracing::info!(application = %application, old = %old.socket_id(), new = %conn.socket_id(), "replacing connection");
                    old.socket().close(REPLACED_REASON).await;
                }
            }
            return conn;
        }
    }

    /// Remove the application's connection, if any, and detach it.
    pub async fn unregister(&self, application: &str) -> Option<Arc<ApplicationConnection>> {
        let (_, slot) = self.slots.remove(application)?;
        let old = slot.lock().await.take()?;
        old.detach();
        tracing::debug!(application = %application, connection = %old.socket_id(), "connection unregistered");
        Some(old)
    }

    /// Remove the application's connection only while it is routed over
    /// `socket_id`.
    pub async fn unregister_on_socket(
        &self,
        application: &str,
        socket_id: &str,
    ) -> Option<Arc<ApplicationConnection>> {
        let slot = self.slot(application)?;
        let mut current = slot.lock().await;
        let on_socket = current.as_ref().is_some_and(|c| c.socket_id() == socket_id);
        if !on_socket || !self.is_current(application, &slot) {
            return None;
        }
        let old = current.take()?;
        old.detach();
        self.slots.remove_if(application, |_, s| Arc::ptr_eq(s, &slot));
        tracing::debug!(application = %application, connection = %socket_id, "connection unregistered");
        Some(old)
    }

    /// Unregister every application still routed over `socket_id`.
    pub async fn unregister_socket(&self, socket_id: &str) -> Vec<String> {
        let candidates: Vec<String> = self.slots.iter().map(|r| r.key().clone()).collect();
        let mut removed = Vec::new();
        for application in candidates {
            let Some(slot) = self.slot(&application) else { continue };
            let mut current = slot.lock().await;
            let on_socket = current.as_ref().is_some_and(|c| c.socket_id() == socket_id);
            if on_socket && self.is_current(&application, &slot) {
                if let Some(old) = current.take() {
                    old.detach();
                }
                self.slots.remove_if(&application, |_, s| Arc::ptr_eq(s, &slot));
                removed.push(application);
            }
        }
        removed
    }

    /// Wait for exclusive use of the application's connection.
    ///
    /// The connection returned is whichever is registered once the lock is
    /// obtained, which may differ from the one registered when the call
    /// started.
    pub async fn acquire_exclusive(&self, application: &str) -> Option<ExclusiveConnection> {
        let slot = self.slot(application)?;
        let guard = Arc::clone(&slot).lock_owned().await;
        let conn = Arc::clone(guard.as_ref()?);
        Some(ExclusiveConnection {
            slot,
            conn,
            _guard: guard,
        })
    }

    /// Give up exclusive use. Tolerates connections that were unregistered
    /// in the meantime.
    pub fn release_exclusive(&self, application: &str, conn: ExclusiveConnection) {
        if !self.is_current(application, &conn.slot) {
            tracing::warn!(application = %application, connection = %conn.socket_id(), "released connection is no longer registered");
        }
        drop(conn);
    }

    pub fn contains(&self, application: &str) -> bool {
        self.slots.contains_key(application)
    }
}
