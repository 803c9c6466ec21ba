//! ContextSnapshot — the caller's situation at the moment of a correction
//! or an activation query (§3.1, §3.2).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point-in-time snapshot of the agent's working context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Collaborator-defined extra fields, matched by the same key/glob rules
    /// as the built-in fields.
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
}

impl ContextSnapshot {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            repo: None,
            branch: None,
            repo_root: None,
            file_path: None,
            file_language: None,
            file_ext: None,
            task: None,
            user: None,
            environment: None,
            custom: BTreeMap::new(),
        }
    }

    /// Infers `file_language` and `file_ext` from `file_path` and fills them
    /// in if not already set.
    pub fn infer_language(&mut self) {
        let Some(path) = &self.file_path else { return };
        let ext = path.rsplit('.').next().filter(|e| *e != *path);
        if let Some(ext) = ext {
            if self.file_ext.is_none() {
                self.file_ext = Some(ext.to_string());
            }
            if self.file_language.is_none() {
                self.file_language = language_for_ext(ext).map(str::to_string);
            }
        }
    }

    /// Look up a named field (built-in or custom) as a string, for
    /// when-predicate matching.
    pub fn field(&self, key: &str) -> Option<String> {
        match key {
            "repo" => self.repo.clone(),
            "branch" => self.branch.clone(),
            "repo_root" => self.repo_root.clone(),
            "file_path" => self.file_path.clone(),
            "file_language" | "language" => self.file_language.clone(),
            "file_ext" => self.file_ext.clone(),
            "task" => self.task.clone(),
            "user" => self.user.clone(),
            "environment" => self.environment.clone(),
            other => self.custom.get(other).cloned(),
        }
    }
}

fn language_for_ext(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "rs" => "rust",
        "py" => "python",
        "go" => "go",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "jsx" => "javascript",
        "rb" => "ruby",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "php" => "php",
        "swift" => "swift",
        "sh" | "bash" => "shell",
        "sql" => "sql",
        "md" => "markdown",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_language_from_extension() {
        let mut ctx = ContextSnapshot::new(Utc::now());
        ctx.file_path = Some("src/main.rs".to_string());
        ctx.infer_language();
        assert_eq!(ctx.file_language.as_deref(), Some("rust"));
        assert_eq!(ctx.file_ext.as_deref(), Some("rs"));
    }

    #[test]
    fn does_not_override_explicit_language() {
        let mut ctx = ContextSnapshot::new(Utc::now());
        ctx.file_path = Some("script.py".to_string());
        ctx.file_language = Some("jython".to_string());
        ctx.infer_language();
        assert_eq!(ctx.file_language.as_deref(), Some("jython"));
    }

    #[test]
    fn custom_fields_are_queryable() {
        let mut ctx = ContextSnapshot::new(Utc::now());
        ctx.custom.insert("ci".to_string(), "github-actions".to_string());
        assert_eq!(ctx.field("ci").as_deref(), Some("github-actions"));
        assert_eq!(ctx.field("missing"), None);
    }
}
