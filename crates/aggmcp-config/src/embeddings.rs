use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One tool's cached name + description, as recorded by the offline indexer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescription {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One server's entry in `enhanced-index.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedServerEntry {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub original_description: String,
    #[serde(default)]
    pub ai_summary: String,
    #[serde(default)]
    pub ai_use_cases: Vec<String>,
    #[serde(default)]
    pub tool_count: usize,
    #[serde(default)]
    pub tool_descriptions: Vec<ToolDescription>,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub last_processed: Option<String>,
}

/// Whole `enhanced-index.json` document, produced by the (out-of-scope)
/// offline indexing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedIndexFile {
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub total_servers: usize,
    #[serde(default)]
    pub servers: Vec<EnhancedServerEntry>,
}

pub fn load_enhanced_index(path: &Path) -> Result<EnhancedIndexFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read enhanced index: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse enhanced index: {}", path.display()))
}
