use std::sync::Arc;

/// Fan-out point for `tools/list_changed`. The Active Set Manager calls this
/// exactly once per committed mutation (admit, evict, or a reload that
/// actually changed something); the Upstream Server (C7) implements it to
/// push the notification down its SSE channel.
pub trait ChangeNotifier: Send + Sync {
    fn tool_list_changed(&self);
}

/// A notifier that does nothing; useful for tests and for running the
/// active set manager standalone (e.g. from the CLI) without a server.
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn tool_list_changed(&self) {}
}

pub type SharedNotifier = Arc<dyn ChangeNotifier>;
