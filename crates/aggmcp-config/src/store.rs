use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::transport::TransportSpec;

/// One server entry in the internal config dialect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerEntry {
    pub name: String,
    pub transport: TransportSpec,
}

/// The active-set config document (`config.json`), internal dialect.
///
/// `active_mcp_queue` lists server names ordered cold-to-hot (index 0 is the
/// next eviction candidate); this is how the Active Set Manager's in-memory
/// LRU order survives a restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ActiveSetFile {
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
    #[serde(default)]
    pub active_mcp_queue: Vec<String>,
}

/// Standard-dialect shape accepted on read: `{"mcpServers": {name: {...}}}`,
/// the format used by most MCP client configs in the wild. No `type` tag;
/// a `url` field means SSE/HTTP, a `command` field means stdio.
#[derive(Debug, Clone, Deserialize)]
struct StandardDialect {
    #[serde(default, rename = "mcpServers")]
    mcp_servers: HashMap<String, StandardServerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct StandardServerEntry {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

impl ActiveSetFile {
    /// Load `config.json`, accepting either the internal dialect (`servers`
    /// array with tagged transports) or the standard `mcpServers` map
    /// dialect. Whichever is read, the in-memory representation is always
    /// the internal dialect; writes always use it too.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw).context("invalid JSON")?;

        if value.get("servers").is_some() || value.get("active_mcp_queue").is_some() {
            return serde_json::from_value(value).context("failed to parse internal config dialect");
        }

        let standard: StandardDialect =
            serde_json::from_value(value).context("failed to parse mcpServers config dialect")?;
        let mut servers: Vec<ServerEntry> = standard
            .mcp_servers
            .into_iter()
            .map(|(name, entry)| {
                let transport = if let Some(url) = entry.url {
                    TransportSpec::StreamableHttp {
                        url,
                        headers: entry.headers,
                    }
                } else {
                    TransportSpec::Command {
                        command: entry.command.unwrap_or_default(),
                        args: entry.args,
                        env: entry.env,
                    }
                };
                ServerEntry { name, transport }
            })
            .collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self {
            servers,
            active_mcp_queue: Vec::new(),
        })
    }

    /// Atomic write: serialize to a temp file in the same directory, then
    /// rename over the target. Prevents a reader (or the file watcher) from
    /// ever observing a partially-written document.
    pub fn write(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory: {}", parent.display()))?;

        let mut tmp = PathBuf::from(parent);
        tmp.push(format!(
            ".{}.tmp-{}",
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("config.json"),
            std::process::id()
        ));

        let body = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(&tmp, body)
            .with_context(|| format!("failed to write temp config: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to atomically replace config: {}", path.display()))?;
        Ok(())
    }

    /// True when `other` has the same set of server names with identical
    /// launch specs (order-independent). Used by the file watcher to ignore
    /// its own writes and avoid a reload feedback loop.
    pub fn same_servers(&self, other: &Self) -> bool {
        if self.servers.len() != other.servers.len() {
            return false;
        }
        let mut mine: Vec<&ServerEntry> = self.servers.iter().collect();
        let mut theirs: Vec<&ServerEntry> = other.servers.iter().collect();
        mine.sort_by(|a, b| a.name.cmp(&b.name));
        theirs.sort_by(|a, b| a.name.cmp(&b.name));
        mine == theirs
    }
}

/// Owns the config file path and mediates reads/writes for the Active Set
/// Manager. Does not itself hold the active-set lock — callers serialize
/// writes through the manager's mutex.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<ActiveSetFile> {
        if !self.path.exists() {
            return Ok(ActiveSetFile::default());
        }
        ActiveSetFile::load(&self.path)
    }

    pub fn write(&self, file: &ActiveSetFile) -> Result<()> {
        file.write(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_internal_dialect() {
        let raw = r#"{
            "servers": [{"name": "git", "transport": {"type": "command", "command": "npx", "args": []}}],
            "active_mcp_queue": ["git"]
        }"#;
        let file = ActiveSetFile::parse(raw).unwrap();
        assert_eq!(file.servers.len(), 1);
        assert_eq!(file.active_mcp_queue, vec!["git".to_string()]);
    }

    #[test]
    fn parses_standard_mcp_servers_dialect() {
        let raw = r#"{
            "mcpServers": {
                "git": {"command": "npx", "args": ["-y", "mcp-git"]},
                "deepwiki": {"url": "https://mcp.deepwiki.com/mcp"}
            }
        }"#;
        let file = ActiveSetFile::parse(raw).unwrap();
        assert_eq!(file.servers.len(), 2);
        assert!(file.active_mcp_queue.is_empty());
    }

    #[test]
    fn round_trip_write_read_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let file = ActiveSetFile {
            servers: vec![ServerEntry {
                name: "git".into(),
                transport: TransportSpec::Command {
                    command: "npx".into(),
                    args: vec!["-y".into(), "mcp-git".into()],
                    env: HashMap::new(),
                },
            }],
            active_mcp_queue: vec!["git".into()],
        };
        let store = ConfigStore::new(path);
        store.write(&file).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, file);
    }

    #[test]
    fn same_servers_ignores_order() {
        let entry_a = ServerEntry {
            name: "a".into(),
            transport: TransportSpec::Command {
                command: "npx".into(),
                args: vec![],
                env: HashMap::new(),
            },
        };
        let entry_b = ServerEntry {
            name: "b".into(),
            transport: TransportSpec::Command {
                command: "npx".into(),
                args: vec![],
                env: HashMap::new(),
            },
        };
        let one = ActiveSetFile {
            servers: vec![entry_a.clone(), entry_b.clone()],
            active_mcp_queue: vec!["a".into(), "b".into()],
        };
        let two = ActiveSetFile {
            servers: vec![entry_b, entry_a],
            active_mcp_queue: vec!["b".into()],
        };
        assert!(one.same_servers(&two));
    }

    #[test]
    fn same_servers_detects_launch_spec_change() {
        let one = ActiveSetFile {
            servers: vec![ServerEntry {
                name: "a".into(),
                transport: TransportSpec::Command {
                    command: "npx".into(),
                    args: vec![],
                    env: HashMap::new(),
                },
            }],
            active_mcp_queue: vec![],
        };
        let mut two = one.clone();
        two.servers[0].transport = TransportSpec::Command {
            command: "node".into(),
            args: vec![],
            env: HashMap::new(),
        };
        assert!(!one.same_servers(&two));
    }
}
