use std::path::PathBuf;

use directories::ProjectDirs;

const ENV_CONFIG_PATH: &str = "MCP_CONFIG_PATH";
const ENV_PORT: &str = "PORT";
const DEFAULT_PORT: u16 = 9999;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "aggmcp", "aggmcp")
}

/// Path to `config.json`: `$MCP_CONFIG_PATH` if set, else the platform config
/// directory (e.g. `~/.config/aggmcp/config.json` on Linux).
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    default_dir().join("config.json")
}

/// Path to the full backend catalog, `mcp-registry.json`, alongside `config.json`.
pub fn registry_path() -> PathBuf {
    config_path()
        .parent()
        .map(|dir| dir.join("mcp-registry.json"))
        .unwrap_or_else(|| default_dir().join("mcp-registry.json"))
}

/// Path to the embeddings/summary cache, `enhanced-index.json`, alongside `config.json`.
pub fn enhanced_index_path() -> PathBuf {
    config_path()
        .parent()
        .map(|dir| dir.join("enhanced-index.json"))
        .unwrap_or_else(|| default_dir().join("enhanced-index.json"))
}

/// Upstream server listen port: `$PORT` if set and valid, else 9999.
pub fn listen_port() -> u16 {
    std::env::var(ENV_PORT)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

fn default_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
