use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use aggmcp_active::ActiveSetManager;
use aggmcp_registry::CatalogView;

use crate::launch::build_launch_spec;

#[derive(Debug, Serialize)]
pub struct ArgumentRequirementView {
    pub name: String,
    pub description: String,
    pub example: String,
    pub position: usize,
}

#[derive(Debug, Serialize)]
pub struct AuthRequirementView {
    pub name: String,
    pub description: String,
}

/// Result of [`Adder::add`], one variant per step of §4.6 that can end the
/// flow. Serializes to a structured result an upstream agent can act on.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum AddOutcome {
    UnknownServer {
        known: Vec<String>,
    },
    AlreadyActive {
        name: String,
    },
    NeedsArguments {
        requirements: Vec<ArgumentRequirementView>,
        message: String,
    },
    NeedsAuth {
        requirements: Vec<AuthRequirementView>,
        message: String,
    },
    Added {
        name: String,
        tool_count: usize,
    },
}

/// C6: validates a candidate server, gathers missing arguments/auth, builds
/// its launch spec, and hands it to the Active Set Manager.
pub struct Adder {
    active: Arc<ActiveSetManager>,
    catalog: Arc<CatalogView>,
}

impl Adder {
    pub fn new(active: Arc<ActiveSetManager>, catalog: Arc<CatalogView>) -> Self {
        Self { active, catalog }
    }

    pub async fn add(
        &self,
        name: &str,
        user_args: HashMap<String, String>,
        stored_auth: HashMap<String, String>,
    ) -> Result<AddOutcome> {
        let entries = self.catalog.catalog_entries().await?;
        let Some(entry) = entries.iter().find(|e| e.name == name) else {
            let known = entries.iter().map(|e| e.name.clone()).collect();
            return Ok(AddOutcome::UnknownServer { known });
        };

        if self.active.is_active(name).await {
            self.active.touch(name).await;
            return Ok(AddOutcome::AlreadyActive {
                name: name.to_string(),
            });
        }

        let missing_args: Vec<_> = entry
            .argument_requirements
            .iter()
            .filter(|req| req.required && !user_args.contains_key(&req.name))
            .collect();
        if !missing_args.is_empty() {
            return Ok(AddOutcome::NeedsArguments {
                message: format!(
                    "'{name}' needs {} more argument(s) before it can start.",
                    missing_args.len()
                ),
                requirements: missing_args
                    .into_iter()
                    .map(|req| ArgumentRequirementView {
                        name: req.name.clone(),
                        description: req.description.clone(),
                        example: req.example.clone(),
                        position: req.position,
                    })
                    .collect(),
            });
        }

        let missing_auth = entry.unsatisfied_auth(&stored_auth);
        if !missing_auth.is_empty() {
            return Ok(AddOutcome::NeedsAuth {
                message: format!(
                    "'{name}' needs credentials before it can start: {}.",
                    missing_auth
                        .iter()
                        .map(|req| req.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                requirements: missing_auth
                    .into_iter()
                    .map(|req| AuthRequirementView {
                        name: req.name.clone(),
                        description: req.description.clone(),
                    })
                    .collect(),
            });
        }

        let spec = build_launch_spec(entry, &user_args, &stored_auth);
        self.active.admit(name, spec).await?;

        let tool_count = match self.active.client_for(name).await {
            Some(client) => client.list_tools().await.map(|r| r.tools.len()).unwrap_or(0),
            None => 0,
        };

        Ok(AddOutcome::Added {
            name: name.to_string(),
            tool_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggmcp_active::NoopNotifier;
    use aggmcp_config::ConfigStore;
    use std::fs;

    fn mock_script(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
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
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"git_log","description":"log","inputSchema":{"type":"object","properties":{}}}]}}\n' "$id"
      ;;
  esac
done
"#,
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms).unwrap();
        }
        path
    }

    fn write_catalog(dir: &std::path::Path, script: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("mcp-registry.json");
        fs::write(
            &path,
            format!(
                r#"{{"git": {{"command": "sh", "args": ["{}"]}}}}"#,
                script.to_string_lossy()
            ),
        )
        .unwrap();
        path
    }

    fn write_catalog_with_auth(dir: &std::path::Path, script: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("mcp-registry.json");
        fs::write(
            &path,
            format!(
                r#"{{"git": {{"command": "sh", "args": ["{}"], "auth_requirements": [{{"name": "GIT_TOKEN", "description": "personal access token"}}]}}}}"#,
                script.to_string_lossy()
            ),
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn unknown_server_lists_known_names() {
        let dir = tempfile::tempdir().unwrap();
        let script = mock_script(dir.path(), "git");
        let registry_path = write_catalog(dir.path(), &script);
        let enhanced_path = dir.path().join("enhanced-index.json");
        fs::write(&enhanced_path, r#"{"servers": []}"#).unwrap();

        let config = ConfigStore::new(dir.path().join("config.json"));
        let active = Arc::new(ActiveSetManager::new(2, config, Arc::new(NoopNotifier)));
        let catalog = Arc::new(CatalogView::with_paths(registry_path, enhanced_path, None));
        let adder = Adder::new(active, catalog);

        let outcome = adder
            .add("nonexistent", HashMap::new(), HashMap::new())
            .await
            .unwrap();
        assert!(matches!(outcome, AddOutcome::UnknownServer { known } if known == vec!["git".to_string()]));
    }

    #[tokio::test]
    async fn missing_auth_blocks_admission() {
        let dir = tempfile::tempdir().unwrap();
        let script = mock_script(dir.path(), "git");
        let registry_path = write_catalog_with_auth(dir.path(), &script);
        let enhanced_path = dir.path().join("enhanced-index.json");
        fs::write(&enhanced_path, r#"{"servers": []}"#).unwrap();

        let config = ConfigStore::new(dir.path().join("config.json"));
        let active = Arc::new(ActiveSetManager::new(2, config, Arc::new(NoopNotifier)));
        let catalog = Arc::new(CatalogView::with_paths(registry_path, enhanced_path, None));
        let adder = Adder::new(active, catalog);

        std::env::remove_var("GIT_TOKEN");
        let outcome = adder.add("git", HashMap::new(), HashMap::new()).await.unwrap();
        assert!(matches!(outcome, AddOutcome::NeedsAuth { .. }));
    }

    #[tokio::test]
    async fn successful_add_reports_tool_count() {
        let dir = tempfile::tempdir().unwrap();
        let script = mock_script(dir.path(), "git");
        let registry_path = write_catalog(dir.path(), &script);
        let enhanced_path = dir.path().join("enhanced-index.json");
        fs::write(&enhanced_path, r#"{"servers": []}"#).unwrap();

        let config = ConfigStore::new(dir.path().join("config.json"));
        let active = Arc::new(ActiveSetManager::new(2, config, Arc::new(NoopNotifier)));
        let catalog = Arc::new(CatalogView::with_paths(registry_path, enhanced_path, None));
        let adder = Adder::new(active, catalog);

        let outcome = adder.add("git", HashMap::new(), HashMap::new()).await.unwrap();
        assert!(matches!(outcome, AddOutcome::Added { tool_count: 1, .. }));
    }
}
