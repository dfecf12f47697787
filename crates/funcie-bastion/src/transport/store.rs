//! Connection store: application name -> shared physical connection.
//!
//! One connection may back many applications (one Redis pub/sub session
//! carries a channel per application). Removing an application only hands
//! the connection back for closing once no application uses it.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// A connection plus the applications currently routed over it.
pub struct SharedConnection<C> {
    conn: C,
    apps: Mutex<HashSet<String>>,
}

impl<C> SharedConnection<C> {
    pub fn new(conn: C) -> Arc<Self> {
        Arc::new(Self {
            conn,
            apps: Mutex::new(HashSet::new()),
        })
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn applications(&self) -> Vec<String> {
        let mut apps: Vec<String> = self.apps.lock().iter().cloned().collect();
        apps.sort();
        apps
    }
}

pub struct ConnectionStore<C> {
    by_app: DashMap<String, Arc<SharedConnection<C>>>,
}

impl<C> Default for ConnectionStore<C> {
    fn default() -> Self {
        Self {
            by_app: DashMap::new(),
        }
    }
}

impl<C> ConnectionStore<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_connection(&self, application: &str) -> Option<Arc<SharedConnection<C>>> {
        self.by_app.get(application).map(|r| Arc::clone(r.value()))
    }

    /// Route `application` over `conn`, replacing any previous route.
    pub fn register_connection(&self, application: &str, conn: &Arc<SharedConnection<C>>) {
        conn.apps.lock().insert(application.to_string());
        if let Some(previous) = self.by_app.insert(application.to_string(), Arc::clone(conn)) {
            if !Arc::ptr_eq(&previous, conn) {
                previous.apps.lock().remove(application);
            }
        }
    }

    /// Remove the route for `application`.
    ///
    /// Returns the connection only if this was its last application, in
    /// which case the caller owns closing it.
    pub fn unregister_connection(&self, application: &str) -> Option<Arc<SharedConnection<C>>> {
        let (_, conn) = self.by_app.remove(application)?;
        let mut apps = conn.apps.lock();
        apps.remove(application);
        let orphaned = apps.is_empty();
        drop(apps);
        orphaned.then_some(conn)
    }

    pub fn len(&self) -> usize {
        self.by_app.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_app.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn shared_connection_survives_until_last_app() {
        let store = ConnectionStore::new();
        let conn = SharedConnection::new("session-1");
        store.register_connection("a", &conn);
        store.register_connection("b", &conn);
        assert_eq!(conn.applications(), vec!["a", "b"]);

        assert!(store.unregister_connection("a").is_none());
        assert_eq!(*store.get_connection("b").unwrap().connection(), "session-1");

        let last = store.unregister_connection("b").unwrap();
        assert!(Arc::ptr_eq(&last, &conn));
        assert!(store.is_empty());
        assert!(store.unregister_connection("b").is_none());
    }

    #[test]
    fn rerouting_moves_app_between_connections() {
        let store = ConnectionStore::new();
        let first = SharedConnection::new(1);
        let second = SharedConnection::new(2);
        store.register_connection("a", &first);
        store.register_connection("a", &second);

        assert!(first.applications().is_empty());
        assert_eq!(*store.get_connection("a").unwrap().connection(), 2);
        assert_eq!(store.len(), 1);
    }
}
