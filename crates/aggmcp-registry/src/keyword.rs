use aggmcp_config::{CatalogEntry, EnhancedServerEntry};

/// Keyword-score fallback per §4.5: exact-name +100, display-name substring
/// +50, AI summary substring +40, per use-case substring +30, per tool-name
/// substring +20, per tool-description substring +15, per query-word
/// (>2 chars) found in the summary +10. Normalized to `[0,1]` by /100,
/// clamped.
pub fn keyword_score(query: &str, entry: &CatalogEntry, enhanced: Option<&EnhancedServerEntry>) -> f32 {
    let query_lower = query.to_lowercase();
    let mut score: f32 = 0.0;

    if entry.name.to_lowercase() == query_lower {
        score += 100.0;
    }
    if !entry.display_name.is_empty() && entry.display_name.to_lowercase().contains(&query_lower) {
        score += 50.0;
    }

    let summary = enhanced.map(|e| e.ai_summary.as_str()).unwrap_or("");
    if !summary.is_empty() && summary.to_lowercase().contains(&query_lower) {
        score += 40.0;
    }

    let use_cases: Vec<&str> = if let Some(e) = enhanced {
        e.ai_use_cases.iter().map(String::as_str).collect()
    } else {
        entry.use_cases.iter().map(String::as_str).collect()
    };
    for use_case in &use_cases {
        if use_case.to_lowercase().contains(&query_lower) {
            score += 30.0;
        }
    }

    if let Some(e) = enhanced {
        for tool in &e.tool_descriptions {
            if tool.name.to_lowercase().contains(&query_lower) {
                score += 20.0;
            }
            if tool.description.to_lowercase().contains(&query_lower) {
                score += 15.0;
            }
        }
    } else {
        for tool in &entry.tools_meta {
            if tool.name.to_lowercase().contains(&query_lower) {
                score += 20.0;
            }
            if tool.description.to_lowercase().contains(&query_lower) {
                score += 15.0;
            }
        }
    }

    if !summary.is_empty() {
        let summary_lower = summary.to_lowercase();
        for word in query_lower.split_whitespace().filter(|w| w.len() > 2) {
            if summary_lower.contains(word) {
                score += 10.0;
            }
        }
    }

    (score / 100.0).clamp(0.0, 1.0)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    // Raw cosine is in [-1,1]; similarity must stay in [0,1] so that
    // `distance = 1 - similarity` downstream never exceeds 1.
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggmcp_config::{LaunchTemplate, ToolMeta};

    fn entry(name: &str, display_name: &str) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            display_name: display_name.to_string(),
            description: String::new(),
            launch: LaunchTemplate::Stdio {
                command: "true".into(),
                args: vec![],
                env_template: vec![],
            },
            auth_requirements: vec![],
            argument_requirements: vec![],
            static_args: vec![],
            tools_meta: vec![ToolMeta {
                name: "git_log".into(),
                description: "show commit history".into(),
            }],
            embedding: vec![],
            use_cases: vec!["inspect history".into()],
        }
    }

    #[test]
    fn exact_name_match_scores_full() {
        let e = entry("git", "Git");
        assert_eq!(keyword_score("git", &e, None), 1.0);
    }

    #[test]
    fn tool_name_substring_contributes_partial_score() {
        let e = entry("git", "Git");
        let score = keyword_score("git_log", &e, None);
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![0.1, 0.2, 0.3];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }
}
