use std::collections::HashMap;

use tokio::sync::RwLock;

/// Derived per-category item→backend maps, rebuilt on each upstream
/// `*.list`. A route is only meaningful while its target is active; eviction
/// invalidates routes lazily (the next call through [`RouteTable`] simply
/// misses and the caller falls back to its recovery policy).
#[derive(Debug, Default, Clone)]
pub struct RouteMaps {
    pub tools: HashMap<String, String>,
    pub prompts: HashMap<String, String>,
    pub resources: HashMap<String, String>,
}

pub struct RouteTable(RwLock<RouteMaps>);

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self(RwLock::new(RouteMaps::default()))
    }

    pub async fn snapshot(&self) -> RouteMaps {
        self.0.read().await.clone()
    }

    pub async fn replace(&self, maps: RouteMaps) {
        *self.0.write().await = maps;
    }

    pub async fn tool_backend(&self, name: &str) -> Option<String> {
        self.0.read().await.tools.get(name).cloned()
    }

    pub async fn prompt_backend(&self, name: &str) -> Option<String> {
        self.0.read().await.prompts.get(name).cloned()
    }

    pub async fn resource_backend(&self, uri: &str) -> Option<String> {
        self.0.read().await.resources.get(uri).cloned()
    }
}
