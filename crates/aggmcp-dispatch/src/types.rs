use serde::Serialize;
use serde_json::Value;

pub const ADD_NEW_MCP_TOOL: &str = "add_new_mcp";
pub const SEARCH_MCPS_TOOL: &str = "search_mcps";

/// One tool in an aggregated `tools/list` response. `description` already
/// carries the `[<backend>]` prefix; `backend` is kept alongside for the
/// route map rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(skip)]
    pub backend: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatedPrompt {
    pub name: String,
    pub description: String,
    #[serde(skip)]
    pub backend: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatedResource {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(skip)]
    pub backend: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatedResourceTemplate {
    pub uri_template: String,
    pub name: String,
    pub description: String,
    #[serde(skip)]
    pub backend: String,
}

/// The two built-in tools that are always present in `tools/list`,
/// independent of the active set (§4.4).
pub fn builtin_tools() -> Vec<AggregatedTool> {
    vec![
        AggregatedTool {
            name: ADD_NEW_MCP_TOOL.to_string(),
            description: "Bring a catalogued MCP server online, gathering any missing \
                           arguments or credentials first."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "catalog server name"},
                    "arguments": {"type": "object", "description": "positional argument values keyed by name"}
                },
                "required": ["name"]
            }),
            backend: String::new(),
        },
        AggregatedTool {
            name: SEARCH_MCPS_TOOL.to_string(),
            description: "Search the full backend catalog by natural-language query, \
                           ranked by semantic similarity with a keyword fallback."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 10, "default": 4}
                },
                "required": ["query"]
            }),
            backend: String::new(),
        },
    ]
}
