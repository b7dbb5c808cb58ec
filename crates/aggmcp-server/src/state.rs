use std::sync::Arc;
use std::time::Instant;

use aggmcp_dispatch::Dispatcher;

use crate::session::SessionSlot;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub session: Arc<SessionSlot>,
    pub resource_metadata_url: Arc<str>,
    pub started_at: Arc<Instant>,
    /// `KEEP_SERVER_OPEN=1`: `DELETE /mcp` is a no-op instead of tearing
    /// down the live session.
    pub keep_server_open: bool,
}

impl AppState {
    /// `session` is built by the caller (rather than here) so it can be
    /// wired into the Active Set Manager's change notifier before the
    /// first `admit` happens — see [`crate::session::SessionNotifier`].
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        session: Arc<SessionSlot>,
        resource_metadata_url: impl Into<Arc<str>>,
        keep_server_open: bool,
    ) -> Self {
        Self {
            dispatcher,
            session,
            resource_metadata_url: resource_metadata_url.into(),
            started_at: Arc::new(Instant::now()),
            keep_server_open,
        }
    }
}
