use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Per-server stored auth env vars (`store-auth <name> K=V…`), persisted
/// beside `config.json` as `auth.json`. Keyed by server name, then var name.
/// This is the non-empty-value source `CatalogEntry::unsatisfied_auth`
/// checks once the process environment itself doesn't resolve a requirement.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AuthStoreFile(HashMap<String, HashMap<String, String>>);

impl AuthStoreFile {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read auth store: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse auth store: {}", path.display()))
    }

    /// Atomic write: temp file in the same directory, then rename.
    pub fn write(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create auth store directory: {}", parent.display()))?;

        let mut tmp = PathBuf::from(parent);
        tmp.push(format!(
            ".{}.tmp-{}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("auth.json"),
            std::process::id()
        ));

        let body = serde_json::to_string_pretty(self).context("failed to serialize auth store")?;
        std::fs::write(&tmp, body)
            .with_context(|| format!("failed to write temp auth store: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to atomically replace auth store: {}", path.display()))?;
        Ok(())
    }

    pub fn for_server(&self, name: &str) -> HashMap<String, String> {
        self.0.get(name).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, name: &str, key: String, value: String) {
        self.0.entry(name.to_string()).or_default().insert(key, value);
    }
}

/// Path to `auth.json`, alongside `config.json`.
pub fn auth_store_path() -> PathBuf {
    crate::paths::config_path()
        .parent()
        .map(|dir| dir.join("auth.json"))
        .unwrap_or_else(|| PathBuf::from("auth.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");

        let mut store = AuthStoreFile::default();
        store.set("git", "GIT_TOKEN".to_string(), "abc123".to_string());
        store.write(&path).unwrap();

        let loaded = AuthStoreFile::load(&path).unwrap();
        assert_eq!(
            loaded.for_server("git").get("GIT_TOKEN"),
            Some(&"abc123".to_string())
        );
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        let loaded = AuthStoreFile::load(&path).unwrap();
        assert!(loaded.for_server("git").is_empty());
    }
}
