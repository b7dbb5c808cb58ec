use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Launch template for a catalog entry: the *unresolved* form, before a
/// particular admission fills in user-supplied arguments and auth env vars.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum LaunchTemplate {
    #[serde(rename = "stdio")]
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        /// Names of env vars the launched process expects; values are filled
        /// in at admission time from auth storage, not carried here.
        #[serde(default)]
        env_template: Vec<String>,
    },
    #[serde(rename = "sse")]
    Sse {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    #[serde(rename = "http")]
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// One named, human-described env var a backend needs before it can run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthRequirement {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One positional launch argument the operator (or the calling agent, via
/// `add_new_mcp`) must supply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArgumentRequirement {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub example: String,
    pub position: usize,
}

/// Cached tool metadata from a prior indexing pass. Informational only — the
/// live `tools/list` response from the backend is always authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Immutable entry in the full backend catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub launch: LaunchTemplate,
    #[serde(default)]
    pub auth_requirements: Vec<AuthRequirement>,
    #[serde(default)]
    pub argument_requirements: Vec<ArgumentRequirement>,
    #[serde(default)]
    pub static_args: Vec<String>,
    #[serde(default)]
    pub tools_meta: Vec<ToolMeta>,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub use_cases: Vec<String>,
}

impl CatalogEntry {
    /// A requirement is satisfied iff the named env var resolves to a
    /// non-empty value, via either the process environment or `stored_auth`
    /// (what `store-auth` persisted).
    pub fn unsatisfied_auth<'a>(
        &'a self,
        stored_auth: &HashMap<String, String>,
    ) -> Vec<&'a AuthRequirement> {
        self.auth_requirements
            .iter()
            .filter(|req| !resolves_nonempty(&req.name, stored_auth))
            .collect()
    }

    pub fn display_name_or_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

fn resolves_nonempty(var: &str, stored_auth: &HashMap<String, String>) -> bool {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            return true;
        }
    }
    stored_auth
        .get(var)
        .map(|value| !value.is_empty())
        .unwrap_or(false)
}

/// On-disk registry file (`mcp-registry.json`): keyed by server name.
///
/// The minimal shape is `{command, args, env}` or `{remote}`; this also
/// accepts the additive, optional full-catalog fields (auth/argument
/// requirements, static args, use cases) so a single file can serve both a
/// hand-written quick-start catalog and the output of the offline indexer.
#[derive(Debug, Clone, Deserialize)]
struct RawRegistryEntry {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: Vec<String>,
    #[serde(default)]
    remote: Option<String>,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    auth_requirements: Vec<AuthRequirement>,
    #[serde(default)]
    argument_requirements: Vec<ArgumentRequirement>,
    #[serde(default)]
    static_args: Vec<String>,
    #[serde(default)]
    use_cases: Vec<String>,
}

pub fn load_registry_file(path: &Path) -> Result<Vec<CatalogEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file: {}", path.display()))?;
    let parsed: HashMap<String, RawRegistryEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse catalog file: {}", path.display()))?;

    let mut entries: Vec<CatalogEntry> = parsed
        .into_iter()
        .map(|(name, raw)| {
            let launch = if let Some(url) = raw.remote {
                LaunchTemplate::Http {
                    url,
                    headers: HashMap::new(),
                }
            } else {
                LaunchTemplate::Stdio {
                    command: raw.command.unwrap_or_default(),
                    args: raw.args,
                    env_template: raw.env,
                }
            };
            CatalogEntry {
                name,
                display_name: raw.display_name,
                description: raw.description,
                launch,
                auth_requirements: raw.auth_requirements,
                argument_requirements: raw.argument_requirements,
                static_args: raw.static_args,
                tools_meta: Vec::new(),
                embedding: Vec::new(),
                use_cases: raw.use_cases,
            }
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
