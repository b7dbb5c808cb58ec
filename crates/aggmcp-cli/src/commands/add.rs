use std::collections::HashMap;

use aggmcp_config::{auth_store_path, AuthStoreFile};
use aggmcp_dispatch::{AddOutcome, Adder};
use anyhow::Result;

use crate::bootstrap::Runtime;

/// Exit codes: `0` added (or already active), `1` the server needs more
/// input (unknown name, missing arguments, missing auth), `2` an
/// operational failure (catalog/config I/O, backend handshake).
pub async fn run(name: &str, args: Vec<(String, String)>) -> Result<i32> {
    let runtime = Runtime::bootstrap(Runtime::noop()).await?;
    let adder = Adder::new(runtime.active, runtime.catalog);

    let user_args: HashMap<String, String> = args.into_iter().collect();
    let stored_auth = AuthStoreFile::load(&auth_store_path())?.for_server(name);

    let outcome = adder.add(name, user_args, stored_auth).await?;
    let body = serde_json::to_string_pretty(&outcome)?;
    println!("{body}");

    Ok(match outcome {
        AddOutcome::Added { .. } | AddOutcome::AlreadyActive { .. } => 0,
        AddOutcome::UnknownServer { .. }
        | AddOutcome::NeedsArguments { .. }
        | AddOutcome::NeedsAuth { .. } => 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_server_exits_with_usage_code() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("MCP_CONFIG_PATH", dir.path().join("config.json"));
        std::fs::write(aggmcp_config::registry_path(), "{}").unwrap();
        std::fs::write(aggmcp_config::enhanced_index_path(), r#"{"servers": []}"#).unwrap();

        let code = run("nonexistent", vec![]).await.unwrap();
        assert_eq!(code, 1);

        std::env::remove_var("MCP_CONFIG_PATH");
    }
}
