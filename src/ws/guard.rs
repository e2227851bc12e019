use std::sync::Arc;

use super::connection::Connection;
use super::hub::ChatHub;

/// Queues the unregistration of a connection when dropped.
///
/// Held by the connection's reader task, so cleanup happens on every exit
/// path: normal close, error, panic or task abort.
pub struct RegistrationGuard {
    hub: ChatHub,
    conn: Arc<Connection>,
}

impl RegistrationGuard {
    pub fn new(hub: ChatHub, conn: Arc<Connection>) -> Self {
        Self { hub, conn }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.hub.unregister(self.conn.clone());
    }
}
