use std::path::PathBuf;
use std::sync::Arc;

use rmcp::model::{CallToolRequestParam, CallToolResult, GetPromptRequestParam, GetPromptResult, ReadResourceRequestParam, ReadResourceResult};
use serde_json::Value;
use thiserror::Error;

use aggmcp_active::{ActiveSetError, ActiveSetManager};
use aggmcp_backend::BackendError;
use aggmcp_config::AuthStoreFile;
use aggmcp_registry::{CatalogView, RegistryError};

use crate::adder::{AddOutcome, Adder};
use crate::launch::build_launch_spec;
use crate::routes::{RouteMaps, RouteTable};
use crate::types::{
    builtin_tools, AggregatedPrompt, AggregatedResource, AggregatedResourceTemplate, AggregatedTool,
    ADD_NEW_MCP_TOOL, SEARCH_MCPS_TOOL,
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("unknown prompt '{0}'")]
    UnknownPrompt(String),
    #[error("unknown resource '{0}'")]
    UnknownResource(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Active(#[from] ActiveSetError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// C4: combines the Active Set Manager (C3) and Backend Client (C2) into the
/// upstream request contract — fan-out `*.list`, route `*.call`/`*.get`/
/// `*.read`, and the two always-present built-in tools.
pub struct Dispatcher {
    active: Arc<ActiveSetManager>,
    catalog: Arc<CatalogView>,
    auth_path: PathBuf,
    routes: RouteTable,
    adder: Adder,
}

impl Dispatcher {
    /// `catalog` already owns whatever embeddings provider is configured
    /// (or none, forcing the keyword fallback) — see
    /// [`aggmcp_registry::CatalogView::new`].
    pub fn new(active: Arc<ActiveSetManager>, catalog: Arc<CatalogView>, auth_path: PathBuf) -> Self {
        let adder = Adder::new(Arc::clone(&active), Arc::clone(&catalog));
        Self {
            active,
            catalog,
            auth_path,
            routes: RouteTable::new(),
            adder,
        }
    }

    fn auth_for(&self, server: &str) -> std::collections::HashMap<String, String> {
        AuthStoreFile::load(&self.auth_path)
            .map(|store| store.for_server(server))
            .unwrap_or_default()
    }

    /// Fan out `tools/list` to every active backend, rebuild the tool route
    /// map, and append the two built-ins. Errors from individual backends
    /// (including a stale, racing eviction) exclude that backend from the
    /// result rather than failing the whole call.
    pub async fn list_tools(&self) -> Vec<AggregatedTool> {
        let names = self.active.active_names().await;
        let fetches = names.into_iter().map(|name| {
            let active = Arc::clone(&self.active);
            async move {
                let client = active.client_for(&name).await?;
                match client.list_tools().await {
                    Ok(result) => Some((name, result)),
                    Err(err) => {
                        tracing::warn!(backend = %name, error = %err, "tools/list failed, excluding backend");
                        None
                    }
                }
            }
        });
        let per_backend = futures::future::join_all(fetches).await;

        let mut maps = RouteMaps::default();
        let mut tools = Vec::new();
        for (backend, result) in per_backend.into_iter().flatten() {
            for tool in result.tools {
                let tool_name = tool.name.to_string();
                maps.tools
                    .entry(tool_name.clone())
                    .or_insert_with(|| backend.clone());
                tools.push(AggregatedTool {
                    name: tool_name,
                    description: format!(
                        "[{backend}] {}",
                        tool.description.as_deref().unwrap_or("")
                    ),
                    input_schema: serde_json::to_value(&tool.input_schema)
                        .unwrap_or(Value::Object(Default::default())),
                    backend: backend.clone(),
                });
            }
        }
        tools.extend(builtin_tools());

        self.routes.replace(maps).await;
        tools
    }

    /// Fan out `prompts/list`; backends that reply `-32601` (or any other
    /// error) are silently excluded.
    pub async fn list_prompts(&self) -> Vec<AggregatedPrompt> {
        let names = self.active.active_names().await;
        let fetches = names.into_iter().map(|name| {
            let active = Arc::clone(&self.active);
            async move {
                let client = active.client_for(&name).await?;
                match client.list_prompts().await {
                    Ok(result) => Some((name, result)),
                    Err(BackendError::MethodNotFound) => None,
                    Err(err) => {
                        tracing::debug!(backend = %name, error = %err, "prompts/list failed, excluding backend");
                        None
                    }
                }
            }
        });
        let per_backend = futures::future::join_all(fetches).await;

        let mut maps = self.routes.snapshot().await;
        let mut prompts = Vec::new();
        for (backend, result) in per_backend.into_iter().flatten() {
            for prompt in result.prompts {
                let name = prompt.name.to_string();
                maps.prompts.entry(name.clone()).or_insert_with(|| backend.clone());
                prompts.push(AggregatedPrompt {
                    name,
                    description: prompt.description.as_deref().unwrap_or("").to_string(),
                    backend: backend.clone(),
                });
            }
        }
        self.routes.replace(maps).await;
        prompts
    }

    /// Fan out `resources/list`; same exclusion policy as prompts.
    pub async fn list_resources(&self) -> Vec<AggregatedResource> {
        let names = self.active.active_names().await;
        let fetches = names.into_iter().map(|name| {
            let active = Arc::clone(&self.active);
            async move {
                let client = active.client_for(&name).await?;
                match client.list_resources().await {
                    Ok(result) => Some((name, result)),
                    Err(BackendError::MethodNotFound) => None,
                    Err(err) => {
                        tracing::debug!(backend = %name, error = %err, "resources/list failed, excluding backend");
                        None
                    }
                }
            }
        });
        let per_backend = futures::future::join_all(fetches).await;

        let mut maps = self.routes.snapshot().await;
        let mut resources = Vec::new();
        for (backend, result) in per_backend.into_iter().flatten() {
            for resource in result.resources {
                let uri = resource.uri.to_string();
                maps.resources.entry(uri.clone()).or_insert_with(|| backend.clone());
                resources.push(AggregatedResource {
                    uri,
                    name: resource.name.to_string(),
                    description: resource.description.as_deref().unwrap_or("").to_string(),
                    backend: backend.clone(),
                });
            }
        }
        self.routes.replace(maps).await;
        resources
    }

    /// Fan out `resources/templates/list`; same exclusion policy as prompts.
    pub async fn list_resource_templates(&self) -> Vec<AggregatedResourceTemplate> {
        let names = self.active.active_names().await;
        let fetches = names.into_iter().map(|name| {
            let active = Arc::clone(&self.active);
            async move {
                let client = active.client_for(&name).await?;
                match client.list_resource_templates().await {
                    Ok(result) => Some((name, result)),
                    Err(BackendError::MethodNotFound) => None,
                    Err(err) => {
                        tracing::debug!(backend = %name, error = %err, "resources/templates/list failed, excluding backend");
                        None
                    }
                }
            }
        });
        let per_backend = futures::future::join_all(fetches).await;

        let mut templates = Vec::new();
        for (backend, result) in per_backend.into_iter().flatten() {
            for template in result.resource_templates {
                templates.push(AggregatedResourceTemplate {
                    uri_template: template.uri_template.to_string(),
                    name: template.name.to_string(),
                    description: template.description.as_deref().unwrap_or("").to_string(),
                    backend: backend.clone(),
                });
            }
        }
        templates
    }

    /// `tools/call`: built-ins are handled locally; everything else routes
    /// through the tool map with touch-on-use and recover-on-miss admission.
    pub async fn call_tool(&self, name: &str, arguments: Option<serde_json::Map<String, Value>>) -> Result<CallToolResult, DispatchError> {
        if name == ADD_NEW_MCP_TOOL {
            return self.handle_add_new_mcp(arguments).await;
        }
        if name == SEARCH_MCPS_TOOL {
            return self.handle_search_mcps(arguments).await;
        }

        let backend = match self.routes.tool_backend(name).await {
            Some(backend) if self.active.is_active(&backend).await => {
                self.active.touch(&backend).await;
                backend
            }
            _ => self.recover_tool_backend(name).await?,
        };

        let client = self
            .active
            .client_for(&backend)
            .await
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;
        let request = CallToolRequestParam {
            name: name.to_string().into(),
            arguments,
        };
        Ok(client.call_tool(request).await?)
    }

    pub async fn get_prompt(&self, name: &str, arguments: Option<serde_json::Map<String, Value>>) -> Result<GetPromptResult, DispatchError> {
        let backend = self
            .routes
            .prompt_backend(name)
            .await
            .ok_or_else(|| DispatchError::UnknownPrompt(name.to_string()))?;
        if !self.active.is_active(&backend).await {
            return Err(DispatchError::UnknownPrompt(name.to_string()));
        }
        self.active.touch(&backend).await;
        let client = self
            .active
            .client_for(&backend)
            .await
            .ok_or_else(|| DispatchError::UnknownPrompt(name.to_string()))?;
        let request = GetPromptRequestParam {
            name: name.to_string().into(),
            arguments,
        };
        Ok(client.get_prompt(request).await?)
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, DispatchError> {
        let backend = self
            .routes
            .resource_backend(uri)
            .await
            .ok_or_else(|| DispatchError::UnknownResource(uri.to_string()))?;
        if !self.active.is_active(&backend).await {
            return Err(DispatchError::UnknownResource(uri.to_string()));
        }
        self.active.touch(&backend).await;
        let client = self
            .active
            .client_for(&backend)
            .await
            .ok_or_else(|| DispatchError::UnknownResource(uri.to_string()))?;
        let request = ReadResourceRequestParam { uri: uri.to_string() };
        Ok(client.read_resource(request).await?)
    }

    /// Recover-on-miss (§4.4): when a tool's route is absent or stale,
    /// search the catalog for a server whose cached `tools_meta` names it
    /// and admit that server fresh.
    async fn recover_tool_backend(&self, tool_name: &str) -> Result<String, DispatchError> {
        let entries = self.catalog.catalog_entries().await?;
        let entry = entries
            .into_iter()
            .find(|entry| entry.tools_meta.iter().any(|tool| tool.name == tool_name))
            .ok_or_else(|| DispatchError::UnknownTool(tool_name.to_string()))?;

        let auth = self.auth_for(&entry.name);
        let spec = build_launch_spec(&entry, &Default::default(), &auth);
        self.active.admit(&entry.name, spec).await?;
        Ok(entry.name)
    }

    async fn handle_add_new_mcp(&self, arguments: Option<serde_json::Map<String, Value>>) -> Result<CallToolResult, DispatchError> {
        let args = arguments.unwrap_or_default();
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| DispatchError::Other(anyhow::anyhow!("add_new_mcp requires a 'name' argument")))?
            .to_string();
        let user_args: std::collections::HashMap<String, String> = args
            .get("arguments")
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let stored_auth = self.auth_for(&name);
        let outcome = self.adder.add(&name, user_args, stored_auth).await?;

        if let AddOutcome::Added { .. } = &outcome {
            // Force a route refresh so the new tools are immediately callable.
            self.list_tools().await;
        }

        let body = serde_json::to_string(&outcome).unwrap_or_else(|_| "{}".to_string());
        Ok(text_result(body))
    }

    async fn handle_search_mcps(&self, arguments: Option<serde_json::Map<String, Value>>) -> Result<CallToolResult, DispatchError> {
        let args = arguments.unwrap_or_default();
        let query = args.get("query").and_then(Value::as_str).unwrap_or("").to_string();
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or_else(aggmcp_registry::default_limit);

        let results = self.catalog.search(&query, limit).await?;
        let body = serde_json::to_string(&results.iter().map(|r| &r.summary).collect::<Vec<_>>())
            .unwrap_or_else(|_| "[]".to_string());
        Ok(text_result(body))
    }
}

fn text_result(text: String) -> CallToolResult {
    serde_json::from_value(serde_json::json!({
        "content": [{"type": "text", "text": text}]
    }))
    .expect("well-formed CallToolResult literal")
}
