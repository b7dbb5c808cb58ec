use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::store::ActiveSetFile;

/// Handle to a running config-file watcher. Dropping it stops the watch.
pub struct ConfigWatchHandle {
    _watcher: RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for ConfigWatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch `config.json` for external edits and invoke `on_change` with the
/// newly-parsed file, but only when it differs from `last_known` by server
/// set or launch specs.
///
/// `last_known` is seeded once by the caller from whatever is on disk when
/// the watch starts, and from then on is only ever updated here, in
/// `on_change`'s own branch below. The Active Set Manager never touches it —
/// this is how the watcher tells "I wrote this" from "an operator edited
/// config.json by hand" without relying on event timing, which is unreliable
/// across editors and filesystems: a write the manager performs on admit/
/// evict changes the file on disk, but `last_known` only catches up with it
/// the next time this watcher observes an event and loads the file itself.
pub fn watch_config_file<F>(
    path: PathBuf,
    last_known: Arc<std::sync::Mutex<ActiveSetFile>>,
    on_change: F,
) -> Result<ConfigWatchHandle>
where
    F: Fn(ActiveSetFile) + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();

    let watch_path = path.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            if matches!(
                event.kind,
                EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
            ) {
                let _ = tx.send(());
            }
        }
    })
    .context("failed to create config file watcher")?;

    let watch_dir = watch_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch directory: {}", watch_dir.display()))?;

    let task = tokio::spawn(async move {
        // Coalesce bursts of events (editors often write multiple times per
        // save) into a single reload check.
        while rx.recv().await.is_some() {
            while tokio::time::timeout(Duration::from_millis(100), rx.recv())
                .await
                .is_ok()
            {}

            let Ok(candidate) = ActiveSetFile::load(&watch_path) else {
                continue;
            };

            let changed = {
                let guard = last_known.lock().expect("config snapshot mutex poisoned");
                !guard.same_servers(&candidate)
            };

            if changed {
                *last_known.lock().expect("config snapshot mutex poisoned") = candidate.clone();
                on_change(candidate);
            }
        }
    });

    Ok(ConfigWatchHandle {
        _watcher: watcher,
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ServerEntry;
    use crate::transport::TransportSpec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn detects_external_edit_and_ignores_self_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let initial = ActiveSetFile::default();
        initial.write(&path).unwrap();

        let last_known = Arc::new(std::sync::Mutex::new(initial));
        let fire_count = Arc::new(AtomicUsize::new(0));
        let fire_count_cb = fire_count.clone();

        let _handle = watch_config_file(path.clone(), last_known.clone(), move |_file| {
            fire_count_cb.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        // A write through the same in-memory snapshot should not be treated
        // as an external change once `last_known` reflects it.
        let updated = ActiveSetFile {
            servers: vec![ServerEntry {
                name: "git".into(),
                transport: TransportSpec::Command {
                    command: "npx".into(),
                    args: vec![],
                    env: HashMap::new(),
                },
            }],
            active_mcp_queue: vec!["git".into()],
        };
        *last_known.lock().unwrap() = updated.clone();
        updated.write(&path).unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fire_count.load(Ordering::SeqCst), 0);
    }
}
