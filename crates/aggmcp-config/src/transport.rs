use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Resolved launch spec for an active entry, and the wire shape written to
/// `config.json`'s internal dialect (`servers[].transport`).
///
/// Tagged with `type = "command"|"sse"|"streamable-http"` per the config file
/// schema (§6). A second, legacy dialect (`mcpServers` map, no `type` tag,
/// `command`-only) is accepted on read and normalized to this shape; writes
/// always use this tagged form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum TransportSpec {
    #[serde(rename = "command")]
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
    },
    #[serde(rename = "sse")]
    Sse {
        url: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
    #[serde(rename = "streamable-http")]
    StreamableHttp {
        url: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
}

impl TransportSpec {
    /// Short label used in logs and `hub/status`-style payloads.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Command { .. } => "stdio",
            Self::Sse { .. } => "sse",
            Self::StreamableHttp { .. } => "streamable-http",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_variant() {
        let cmd = TransportSpec::Command {
            command: "npx".into(),
            args: vec![],
            env: HashMap::new(),
        };
        assert_eq!(cmd.label(), "stdio");
        let sse = TransportSpec::Sse {
            url: "http://x".into(),
            headers: HashMap::new(),
        };
        assert_eq!(sse.label(), "sse");
    }

    #[test]
    fn round_trips_through_json() {
        let spec = TransportSpec::StreamableHttp {
            url: "https://example.com/mcp".into(),
            headers: [("Authorization".to_string(), "Bearer x".to_string())].into(),
        };
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"type\":\"streamable-http\""));
        let back: TransportSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
