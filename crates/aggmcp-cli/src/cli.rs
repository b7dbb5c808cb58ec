use clap::{Parser, Subcommand};

/// Aggregating MCP proxy router — administrative CLI and upstream server.
#[derive(Parser)]
#[command(name = "aggmcp", version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Activate a catalog server by name, resolving any missing arguments/auth first.
    Add {
        /// Catalog server name (as it appears in mcp-registry.json).
        name: String,

        /// Positional argument values as `key=value`, matching the catalog
        /// entry's declared `argument_requirements`.
        #[arg(value_parser = parse_key_value)]
        args: Vec<(String, String)>,
    },

    /// Store credential/env values for a server, consulted when `add` needs auth.
    StoreAuth {
        /// Catalog server name these values apply to.
        name: String,

        /// Values as `key=value`, one per declared `auth_requirements` entry.
        #[arg(value_parser = parse_key_value, required = true)]
        pairs: Vec<(String, String)>,
    },

    /// Run the upstream MCP endpoint (the default action when no subcommand is given).
    Serve,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected `key=value`, got `{raw}`")),
    }
}
