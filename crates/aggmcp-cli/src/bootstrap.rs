use std::sync::Arc;

use aggmcp_active::{ActiveSetManager, NoopNotifier, SharedNotifier};
use aggmcp_config::{auth_store_path, config_path, enhanced_index_path, registry_path, ConfigStore};
use aggmcp_dispatch::Dispatcher;
use aggmcp_registry::{CatalogView, EmbeddingsProvider, OpenAiEmbeddings};
use anyhow::Result;

/// Everything the `add`/`store-auth`/`serve` commands share: the active set,
/// the catalog view, and the dispatcher built on top of both, all rooted at
/// the configured paths (`$MCP_CONFIG_PATH` or the platform config dir).
pub struct Runtime {
    pub active: Arc<ActiveSetManager>,
    pub catalog: Arc<CatalogView>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Runtime {
    /// Builds the runtime and restores the active set persisted by a
    /// previous run, reconnecting each entry named in `config.json`.
    ///
    /// `notifier` is `NoopNotifier` for the one-shot `add`/`store-auth`
    /// commands, which have no SSE stream to push to; `serve` supplies a
    /// [`aggmcp_server::SessionNotifier`] bound to its own session instead.
    pub async fn bootstrap(notifier: SharedNotifier) -> Result<Self> {
        let config = ConfigStore::new(config_path());
        let active = Arc::new(ActiveSetManager::new(0, config, notifier));
        active.reload_from_disk().await?;

        let embeddings: Option<Arc<dyn EmbeddingsProvider>> =
            OpenAiEmbeddings::from_env().map(|provider| Arc::new(provider) as Arc<dyn EmbeddingsProvider>);
        let catalog = Arc::new(CatalogView::with_paths(registry_path(), enhanced_index_path(), embeddings));

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&active),
            Arc::clone(&catalog),
            auth_store_path(),
        ));

        Ok(Self {
            active,
            catalog,
            dispatcher,
        })
    }

    pub fn noop() -> SharedNotifier {
        Arc::new(NoopNotifier)
    }
}
