use std::collections::HashMap;

use aggmcp_config::{ArgumentRequirement, CatalogEntry, LaunchTemplate, TransportSpec};

/// Builds the resolved launch spec for a catalog entry (§4.6 step 5): user
/// arguments are inserted into the combined base-args/static-args list at
/// their declared positions, auth env vars are resolved from the process
/// environment or stored auth, and the transport variant follows the
/// catalog's launch template.
pub fn build_launch_spec(
    entry: &CatalogEntry,
    user_args: &HashMap<String, String>,
    stored_auth: &HashMap<String, String>,
) -> TransportSpec {
    match &entry.launch {
        LaunchTemplate::Stdio {
            command,
            args,
            env_template,
        } => {
            let mut full_args = args.clone();
            full_args.extend(entry.static_args.iter().cloned());
            insert_positional_args(&mut full_args, &entry.argument_requirements, user_args);

            let mut env = HashMap::new();
            for var in env_template {
                if let Some(value) = resolve_env(var, stored_auth) {
                    env.insert(var.clone(), value);
                }
            }
            TransportSpec::Command {
                command: command.clone(),
                args: full_args,
                env,
            }
        }
        LaunchTemplate::Sse { url, headers } => TransportSpec::Sse {
            url: url.clone(),
            headers: headers.clone(),
        },
        LaunchTemplate::Http { url, headers } => TransportSpec::StreamableHttp {
            url: url.clone(),
            headers: headers.clone(),
        },
    }
}

fn insert_positional_args(
    args: &mut Vec<String>,
    requirements: &[ArgumentRequirement],
    user_args: &HashMap<String, String>,
) {
    let mut ordered: Vec<&ArgumentRequirement> = requirements.iter().collect();
    ordered.sort_by_key(|r| r.position);
    for req in ordered {
        if let Some(value) = user_args.get(&req.name) {
            let pos = req.position.min(args.len());
            args.insert(pos, value.clone());
        }
    }
}

fn resolve_env(var: &str, stored_auth: &HashMap<String, String>) -> Option<String> {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            return Some(value);
        }
    }
    stored_auth.get(var).cloned().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggmcp_config::ArgumentRequirement;

    fn entry_with(args: Vec<String>, static_args: Vec<String>, requirements: Vec<ArgumentRequirement>) -> CatalogEntry {
        CatalogEntry {
            name: "git".into(),
            display_name: String::new(),
            description: String::new(),
            launch: LaunchTemplate::Stdio {
                command: "npx".into(),
                args,
                env_template: vec!["GIT_TOKEN".into()],
            },
            auth_requirements: vec![],
            argument_requirements: requirements,
            static_args,
            tools_meta: vec![],
            embedding: vec![],
            use_cases: vec![],
        }
    }

    #[test]
    fn user_arg_inserted_at_declared_position() {
        let entry = entry_with(
            vec!["-y".into(), "mcp-git".into()],
            vec![],
            vec![ArgumentRequirement {
                name: "repo_path".into(),
                description: "path to repo".into(),
                required: true,
                example: "/home/me/repo".into(),
                position: 2,
            }],
        );
        let mut user_args = HashMap::new();
        user_args.insert("repo_path".to_string(), "/tmp/repo".to_string());

        let spec = build_launch_spec(&entry, &user_args, &HashMap::new());
        match spec {
            TransportSpec::Command { args, .. } => {
                assert_eq!(args, vec!["-y", "mcp-git", "/tmp/repo"]);
            }
            other => panic!("expected stdio spec, got {other:?}"),
        }
    }

    #[test]
    fn env_prefers_process_over_stored_auth() {
        let entry = entry_with(vec![], vec![], vec![]);
        std::env::set_var("GIT_TOKEN", "from-env");
        let mut stored = HashMap::new();
        stored.insert("GIT_TOKEN".to_string(), "from-store".to_string());

        let spec = build_launch_spec(&entry, &HashMap::new(), &stored);
        match spec {
            TransportSpec::Command { env, .. } => {
                assert_eq!(env.get("GIT_TOKEN"), Some(&"from-env".to_string()));
            }
            other => panic!("expected stdio spec, got {other:?}"),
        }
        std::env::remove_var("GIT_TOKEN");
    }
}
