use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;

use aggmcp_config::{CatalogEntry, EnhancedServerEntry, enhanced_index_path, registry_path};

use crate::embeddings::EmbeddingsProvider;
use crate::keyword::{cosine_similarity, keyword_score};

const CACHE_TTL: Duration = Duration::from_secs(60);
const DEFAULT_LIMIT: usize = 4;
const MIN_LIMIT: usize = 1;
const MAX_LIMIT: usize = 10;
const SUMMARY_TOOL_PREVIEW: usize = 6;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to load catalog: {0}")]
    CatalogLoad(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSource {
    Embeddings,
    Keyword,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub name: String,
    pub display_name: String,
    pub similarity: f32,
    pub distance: f32,
    pub source: SearchSource,
    pub summary: String,
}

struct CachedData {
    entries: Vec<CatalogEntry>,
    enhanced: HashMap<String, EnhancedServerEntry>,
    loaded_at: Instant,
}

/// Catalog + enhanced-index cache with a 60s TTL and explicit invalidation,
/// plus the `search_mcps` query path (cosine-similarity primary, keyword
/// fallback).
pub struct CatalogView {
    registry_path: PathBuf,
    enhanced_path: PathBuf,
    cache: Mutex<Option<CachedData>>,
    embeddings: Option<Arc<dyn EmbeddingsProvider>>,
}

/// Default `search_mcps` result count when a caller doesn't specify one.
pub fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl CatalogView {
    pub fn new(embeddings: Option<Arc<dyn EmbeddingsProvider>>) -> Self {
        Self {
            registry_path: registry_path(),
            enhanced_path: enhanced_index_path(),
            cache: Mutex::new(None),
            embeddings,
        }
    }

    pub fn with_paths(
        registry_path: PathBuf,
        enhanced_path: PathBuf,
        embeddings: Option<Arc<dyn EmbeddingsProvider>>,
    ) -> Self {
        Self {
            registry_path,
            enhanced_path,
            cache: Mutex::new(None),
            embeddings,
        }
    }

    /// Drop the cached catalog so the next call reloads from disk. Called on
    /// admin mutations (e.g. after `add_new_mcp` appends a server).
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    pub async fn catalog_entries(&self) -> Result<Vec<CatalogEntry>, RegistryError> {
        let guard = self.ensure_loaded().await?;
        Ok(guard.entries.clone())
    }

    /// Clamps an operator-supplied `limit` into the `1..=10` range used by
    /// `search_mcps`.
    pub fn clamp_limit(limit: usize) -> usize {
        limit.clamp(MIN_LIMIT, MAX_LIMIT)
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, RegistryError> {
        let limit = limit.clamp(MIN_LIMIT, MAX_LIMIT);
        let data = self.ensure_loaded().await?;

        if let Some(provider) = &self.embeddings {
            match provider.embed(query).await {
                Ok(query_vector) => {
                    let scored = self.score_by_embedding(&data, &query_vector);
                    if !scored.is_empty() {
                        return Ok(top_n(scored, limit));
                    }
                    tracing::debug!("no catalog entries carry embeddings, falling back to keyword search");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "query embedding failed, falling back to keyword search");
                }
            }
        }

        Ok(top_n(self.score_by_keyword(&data, query), limit))
    }

    async fn ensure_loaded(&self) -> Result<tokio::sync::MutexGuard<'_, Option<CachedData>>, RegistryError> {
        let mut guard = self.cache.lock().await;
        let needs_reload = match &*guard {
            Some(cached) => cached.loaded_at.elapsed() > CACHE_TTL,
            None => true,
        };
        if needs_reload {
            let entries = aggmcp_config::load_registry_file(&self.registry_path)
                .map_err(RegistryError::CatalogLoad)?;
            let enhanced = aggmcp_config::load_enhanced_index(&self.enhanced_path)
                .map(|index| {
                    index
                        .servers
                        .into_iter()
                        .map(|s| (s.name.clone(), s))
                        .collect()
                })
                .unwrap_or_default();
            *guard = Some(CachedData {
                entries,
                enhanced,
                loaded_at: Instant::now(),
            });
        }
        Ok(guard)
    }

    fn score_by_embedding(&self, data: &CachedData, query_vector: &[f32]) -> Vec<SearchResult> {
        data.entries
            .iter()
            .filter_map(|entry| {
                let enhanced = data.enhanced.get(&entry.name);
                let vector = enhanced
                    .map(|e| e.embedding.as_slice())
                    .filter(|v| !v.is_empty())
                    .or_else(|| Some(entry.embedding.as_slice()).filter(|v| !v.is_empty()))?;
                let similarity = cosine_similarity(query_vector, vector);
                Some(build_result(entry, enhanced, similarity, SearchSource::Embeddings))
            })
            .collect()
    }

    fn score_by_keyword(&self, data: &CachedData, query: &str) -> Vec<SearchResult> {
        data.entries
            .iter()
            .map(|entry| {
                let enhanced = data.enhanced.get(&entry.name);
                let similarity = keyword_score(query, entry, enhanced);
                build_result(entry, enhanced, similarity, SearchSource::Keyword)
            })
            .collect()
    }
}

fn build_result(
    entry: &CatalogEntry,
    enhanced: Option<&EnhancedServerEntry>,
    similarity: f32,
    source: SearchSource,
) -> SearchResult {
    let display_name = enhanced
        .map(|e| e.display_name.clone())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| entry.display_name_or_name().to_string());
    let description = enhanced
        .map(|e| e.original_description.clone())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| entry.description.clone());

    let tool_names: Vec<&str> = if let Some(e) = enhanced {
        e.tool_descriptions.iter().map(|t| t.name.as_str()).collect()
    } else {
        entry.tools_meta.iter().map(|t| t.name.as_str()).collect()
    };

    SearchResult {
        name: entry.name.clone(),
        display_name: display_name.clone(),
        similarity,
        distance: 1.0 - similarity,
        source,
        summary: format_summary(&display_name, similarity, &description, &tool_names),
    }
}

fn format_summary(display_name: &str, similarity: f32, description: &str, tool_names: &[&str]) -> String {
    let percent = (similarity * 100.0).round() as i32;
    let tools_part = if tool_names.is_empty() {
        String::new()
    } else {
        let preview: Vec<&str> = tool_names.iter().take(SUMMARY_TOOL_PREVIEW).copied().collect();
        let remainder = tool_names.len().saturating_sub(SUMMARY_TOOL_PREVIEW);
        if remainder > 0 {
            format!(" — tools: {} (+{remainder} more)", preview.join(", "))
        } else {
            format!(" — tools: {}", preview.join(", "))
        }
    };
    format!("{display_name} ({percent}% match) — {description}{tools_part}")
}

fn top_n(mut results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_catalog(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("mcp-registry.json");
        fs::write(
            &path,
            r#"{
                "git": {"command": "npx", "args": [], "env": [], "display_name": "Git", "description": "git ops", "use_cases": []},
                "files": {"command": "npx", "args": [], "env": [], "display_name": "Filesystem", "description": "read files"}
            }"#,
        )
        .unwrap();
        path
    }

    fn write_enhanced(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("enhanced-index.json");
        fs::write(&path, r#"{"lastUpdated": null, "totalServers": 0, "servers": []}"#).unwrap();
        path
    }

    #[tokio::test]
    async fn keyword_fallback_ranks_exact_name_first() {
        let dir = tempfile::tempdir().unwrap();
        let registry = write_catalog(dir.path());
        let enhanced = write_enhanced(dir.path());
        let view = CatalogView::with_paths(registry, enhanced, None);

        let results = view.search("git", 4).await.unwrap();
        assert_eq!(results[0].name, "git");
        assert!(results[0].similarity >= results.get(1).map(|r| r.similarity).unwrap_or(0.0));
    }

    #[tokio::test]
    async fn limit_is_clamped_into_one_to_ten() {
        let dir = tempfile::tempdir().unwrap();
        let registry = write_catalog(dir.path());
        let enhanced = write_enhanced(dir.path());
        let view = CatalogView::with_paths(registry, enhanced, None);

        let results = view.search("read files", 100).await.unwrap();
        assert!(results.len() <= MAX_LIMIT);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let dir = tempfile::tempdir().unwrap();
        let registry = write_catalog(dir.path());
        let enhanced = write_enhanced(dir.path());
        let view = CatalogView::with_paths(registry.clone(), enhanced, None);

        let first = view.catalog_entries().await.unwrap();
        assert_eq!(first.len(), 2);

        fs::write(
            &registry,
            r#"{"git": {"command": "npx", "args": []}}"#,
        )
        .unwrap();
        view.invalidate().await;
        let second = view.catalog_entries().await.unwrap();
        assert_eq!(second.len(), 1);
    }
}
