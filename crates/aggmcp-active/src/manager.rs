use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use thiserror::Error;
use tokio::sync::Mutex;

use aggmcp_backend::BackendClient;
use aggmcp_config::{ActiveSetFile, ConfigStore, ServerEntry, TransportSpec};

use crate::notify::SharedNotifier;

const DEFAULT_CEILING: usize = 3;

/// Lifecycle state of one active entry, per the admit/evict state machine:
/// `starting -> ready -> closing -> (removed)`, or `starting -> failed ->
/// (removed)` on handshake failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Starting,
    Ready,
    Failed,
    Closing,
}

/// One live backend. `client` is `None` only while `state == Starting`
/// (between reserving the placeholder and the handshake completing).
pub struct ActiveEntry {
    pub name: String,
    pub launch_snapshot: TransportSpec,
    pub state: ClientState,
    pub last_used: u64,
    client: Option<Arc<BackendClient>>,
}

impl ActiveEntry {
    pub fn client(&self) -> Option<Arc<BackendClient>> {
        self.client.clone()
    }
}

#[derive(Debug, Error)]
pub enum ActiveSetError {
    #[error("backend '{0}' handshake failed: {1}")]
    HandshakeFailed(String, #[source] anyhow::Error),
    #[error("config persistence failed: {0}")]
    Persistence(#[source] anyhow::Error),
}

pub enum TouchOutcome {
    Touched,
    NotActive,
}

struct Inner {
    cache: LruCache<String, ActiveEntry>,
}

/// The LRU core (C3). All mutating operations are serialized on one mutex;
/// transport I/O (connect, shutdown) is always done with the lock released —
/// a placeholder is reserved, the lock dropped, the handshake runs, then the
/// lock is reacquired to commit or roll back.
pub struct ActiveSetManager {
    inner: Mutex<Inner>,
    ceiling: usize,
    tick: AtomicU64,
    config: ConfigStore,
    notifier: SharedNotifier,
}

impl ActiveSetManager {
    pub fn new(ceiling: usize, config: ConfigStore, notifier: SharedNotifier) -> Self {
        let ceiling = if ceiling == 0 { DEFAULT_CEILING } else { ceiling };
        // Capacity is ceiling+1: a `starting` placeholder briefly occupies a
        // slot alongside the full, ready set while its handshake is in
        // flight. Eviction of the true LRU victim happens explicitly, after
        // a successful admit commits, never via the cache's own implicit
        // capacity eviction (which would skip client teardown).
        let capacity = NonZeroUsize::new(ceiling + 1).expect("ceiling + 1 is non-zero");
        Self {
            inner: Mutex::new(Inner {
                cache: LruCache::new(capacity),
            }),
            ceiling,
            tick: AtomicU64::new(0),
            config,
            notifier,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::SeqCst)
    }

    /// Current active backend names, hottest first.
    pub async fn active_names(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.cache.iter().map(|(name, _)| name.clone()).collect()
    }

    pub async fn is_active(&self, name: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.cache.peek(name).is_some()
    }

    pub async fn client_for(&self, name: &str) -> Option<Arc<BackendClient>> {
        let inner = self.inner.lock().await;
        inner.cache.peek(name).and_then(|entry| entry.client())
    }

    /// Move `name` to the hot end without touching disk. Returns
    /// `NotActive` if the backend isn't currently live — the caller
    /// (Dispatcher) is expected to call [`Self::admit`] in that case.
    pub async fn touch(&self, name: &str) -> TouchOutcome {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.cache.get_mut(name) {
            entry.last_used = self.next_tick();
            TouchOutcome::Touched
        } else {
            TouchOutcome::NotActive
        }
    }

    /// Bring `name` up with `spec` if it isn't already active. Idempotent:
    /// admitting an already-active backend behaves like `touch`.
    pub async fn admit(&self, name: &str, spec: TransportSpec) -> Result<(), ActiveSetError> {
        {
            let mut inner = self.inner.lock().await;
            if let Some(entry) = inner.cache.get_mut(name) {
                entry.last_used = self.next_tick();
                return Ok(());
            }
            // Reserve a placeholder so concurrent admits of the same name
            // don't both dial the backend; state machine: starting.
            inner.cache.put(
                name.to_string(),
                ActiveEntry {
                    name: name.to_string(),
                    launch_snapshot: spec.clone(),
                    state: ClientState::Starting,
                    last_used: self.next_tick(),
                    client: None,
                },
            );
        }

        let connect_result = BackendClient::connect(spec.clone()).await;

        let victim = {
            let mut inner = self.inner.lock().await;
            match connect_result {
                Ok(client) => {
                    if let Some(entry) = inner.cache.get_mut(name) {
                        entry.state = ClientState::Ready;
                        entry.client = Some(Arc::new(client));
                    }
                    inner.cache.promote(name);
                    if inner.cache.len() > self.ceiling {
                        inner.cache.pop_lru()
                    } else {
                        None
                    }
                }
                Err(err) => {
                    inner.cache.pop(name);
                    return Err(ActiveSetError::HandshakeFailed(name.to_string(), err.into()));
                }
            }
        };

        if let Some((_, mut evicted)) = victim {
            evicted.state = ClientState::Closing;
            if let Some(client) = evicted.client.take() {
                teardown(client).await;
            }
        }

        self.persist().await?;
        self.notifier.tool_list_changed();
        Ok(())
    }

    /// Forced removal, regardless of recency.
    pub async fn evict(&self, name: &str) -> Result<(), ActiveSetError> {
        let removed = {
            let mut inner = self.inner.lock().await;
            inner.cache.pop(name)
        };
        if let Some(mut entry) = removed {
            entry.state = ClientState::Closing;
            if let Some(client) = entry.client.take() {
                teardown(client).await;
            }
        }
        self.persist().await?;
        self.notifier.tool_list_changed();
        Ok(())
    }

    /// Reload from disk if the on-disk set differs from the in-memory one;
    /// a no-op otherwise. Closes everything currently active and reconnects
    /// from the file's `servers[]` (each entry already carries its own
    /// resolved transport, so no catalog lookup is needed here).
    pub async fn reload_from_disk(&self) -> Result<bool, ActiveSetError> {
        let on_disk = self
            .config
            .load()
            .map_err(ActiveSetError::Persistence)?;

        let current = self.snapshot_file().await;
        if current.same_servers(&on_disk) {
            return Ok(false);
        }

        let old_entries: Vec<ActiveEntry> = {
            let mut inner = self.inner.lock().await;
            let names: Vec<String> = inner.cache.iter().map(|(n, _)| n.clone()).collect();
            names
                .into_iter()
                .filter_map(|n| inner.cache.pop(&n))
                .collect()
        };
        for mut entry in old_entries {
            entry.state = ClientState::Closing;
            if let Some(client) = entry.client.take() {
                teardown(client).await;
            }
        }

        for server in &on_disk.servers {
            match BackendClient::connect(server.transport.clone()).await {
                Ok(client) => {
                    let mut inner = self.inner.lock().await;
                    inner.cache.put(
                        server.name.clone(),
                        ActiveEntry {
                            name: server.name.clone(),
                            launch_snapshot: server.transport.clone(),
                            state: ClientState::Ready,
                            last_used: self.next_tick(),
                            client: Some(Arc::new(client)),
                        },
                    );
                }
                Err(err) => {
                    tracing::warn!(server = %server.name, error = %err, "reload: backend reconnect failed");
                }
            }
        }

        self.notifier.tool_list_changed();
        Ok(true)
    }

    async fn snapshot_file(&self) -> ActiveSetFile {
        let inner = self.inner.lock().await;
        let mut servers: Vec<ServerEntry> = inner
            .cache
            .iter()
            .map(|(name, entry)| ServerEntry {
                name: name.clone(),
                transport: entry.launch_snapshot.clone(),
            })
            .collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        // cold -> hot ordering: lru's iterator yields most-recent first.
        let active_mcp_queue: Vec<String> = inner
            .cache
            .iter()
            .map(|(name, _)| name.clone())
            .rev()
            .collect();
        ActiveSetFile {
            servers,
            active_mcp_queue,
        }
    }

    async fn persist(&self) -> Result<(), ActiveSetError> {
        let file = self.snapshot_file().await;
        self.config.write(&file).map_err(ActiveSetError::Persistence)
    }
}

/// Closes the backend's transport via `&self`, so this still runs to
/// completion even when an in-flight call elsewhere holds its own clone of
/// `client` — `BackendClient::shutdown` doesn't require exclusive ownership.
async fn teardown(client: Arc<BackendClient>) {
    if Arc::strong_count(&client) > 1 {
        tracing::debug!("active entry still has in-flight callers at eviction");
    }
    client.shutdown().await;
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use anyhow::Result;

    use crate::notify::ChangeNotifier;

    use super::*;

    struct CountingNotifier(AtomicUsize);

    impl ChangeNotifier for CountingNotifier {
        fn tool_list_changed(&self) {
            self.0.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    fn mock_script(dir: &std::path::Path, name: &str) -> Result<std::path::PathBuf> {
        let path = dir.join(format!("{name}.sh"));
        fs::write(
            &path,
            r#"#!/bin/sh
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id"[ ]*:[ ]*\([^,}]*\).*/\1/p')
  case "$line" in
    *\"initialize\"*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"mock","version":"0.1.0"}}}\n' "$id"
      ;;
    *\"notifications/initialized\"*) ;;
    *\"tools/list\"*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[]}}\n' "$id"
      ;;
  esac
done
"#,
        )?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&path)?.permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms)?;
        }
        Ok(path)
    }

    fn spec_for(script: &std::path::Path) -> TransportSpec {
        TransportSpec::Command {
            command: "sh".to_string(),
            args: vec![script.to_string_lossy().into_owned()],
            env: Default::default(),
        }
    }

    #[tokio::test]
    async fn admit_respects_ceiling_and_evicts_coldest() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = ConfigStore::new(dir.path().join("config.json"));
        let notifier: SharedNotifier = Arc::new(CountingNotifier(AtomicUsize::new(0)));
        let manager = ActiveSetManager::new(2, config, notifier);

        let a = mock_script(dir.path(), "a")?;
        let b = mock_script(dir.path(), "b")?;
        let c = mock_script(dir.path(), "c")?;

        manager.admit("a", spec_for(&a)).await?;
        manager.admit("b", spec_for(&b)).await?;
        assert_eq!(manager.active_names().await.len(), 2);

        // Admitting a third over a ceiling of 2 evicts the coldest (a).
        manager.admit("c", spec_for(&c)).await?;
        let names = manager.active_names().await;
        assert_eq!(names.len(), 2);
        assert!(!manager.is_active("a").await);
        assert!(manager.is_active("b").await);
        assert!(manager.is_active("c").await);

        Ok(())
    }

    #[tokio::test]
    async fn touch_reorders_without_persisting_new_write() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("config.json");
        let config = ConfigStore::new(config_path.clone());
        let notifier: SharedNotifier = Arc::new(CountingNotifier(AtomicUsize::new(0)));
        let manager = ActiveSetManager::new(2, config, notifier);

        let a = mock_script(dir.path(), "a")?;
        let b = mock_script(dir.path(), "b")?;
        manager.admit("a", spec_for(&a)).await?;
        manager.admit("b", spec_for(&b)).await?;

        let mtime_before = fs::metadata(&config_path)?.modified()?;
        matches!(manager.touch("a").await, TouchOutcome::Touched);
        let mtime_after = fs::metadata(&config_path)?.modified()?;
        assert_eq!(mtime_before, mtime_after);

        Ok(())
    }

    #[tokio::test]
    async fn evict_then_readmit_matches_direct_admit() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = ConfigStore::new(dir.path().join("config.json"));
        let notifier: SharedNotifier = Arc::new(CountingNotifier(AtomicUsize::new(0)));
        let manager = ActiveSetManager::new(2, config, notifier);

        let a = mock_script(dir.path(), "a")?;
        manager.admit("a", spec_for(&a)).await?;
        manager.evict("a").await?;
        assert!(!manager.is_active("a").await);

        manager.admit("a", spec_for(&a)).await?;
        assert!(manager.is_active("a").await);
        assert_eq!(manager.active_names().await, vec!["a".to_string()]);

        Ok(())
    }
}
