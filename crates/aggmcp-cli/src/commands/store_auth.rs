use aggmcp_config::{auth_store_path, AuthStoreFile};
use anyhow::Result;

/// Exit codes: `0` stored, `2` the write failed (disk full, permissions).
pub fn run(name: &str, pairs: Vec<(String, String)>) -> Result<i32> {
    let path = auth_store_path();
    let mut store = AuthStoreFile::load(&path)?;
    for (key, value) in pairs {
        store.set(name, key, value);
    }
    store.write(&path)?;
    println!("stored {} credential value(s) for '{name}'", store.for_server(name).len());
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_overwrites_values() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("MCP_CONFIG_PATH", dir.path().join("config.json"));

        let code = run("git", vec![("GIT_TOKEN".to_string(), "first".to_string())]).unwrap();
        assert_eq!(code, 0);
        let code = run("git", vec![("GIT_TOKEN".to_string(), "second".to_string())]).unwrap();
        assert_eq!(code, 0);

        let stored = AuthStoreFile::load(&auth_store_path()).unwrap();
        assert_eq!(stored.for_server("git").get("GIT_TOKEN"), Some(&"second".to_string()));

        std::env::remove_var("MCP_CONFIG_PATH");
    }
}
