use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::pathguard::resolve_within_root;
use super::{Tool, ToolContext, ToolResult};

/// spec.md §4.6: results capped at 50 matches regardless of which backend ran.
const MAX_MATCHES: usize = 50;
const MAX_LINE_LEN: usize = 500;

pub struct SearchCodebaseTool;

#[async_trait]
impl Tool for SearchCodebaseTool {
    fn name(&self) -> &str {
        "search_codebase"
    }

    fn description(&self) -> &str {
        "Search file contents using a regex pattern, capped at 50 matches. \
         Prefers an external ripgrep-equivalent subprocess when present, \
         falling back to an in-process scan."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Regex pattern to search for" },
                "path": { "type": "string", "description": "File or directory to search in, relative to the project root" },
                "max": { "type": "integer", "description": "Maximum matches to return (default and hard cap: 50)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: query"))?;

        let max = args
            .get("max")
            .and_then(|v| v.as_u64())
            .map(|v| (v as usize).min(MAX_MATCHES))
            .unwrap_or(MAX_MATCHES);

        let base = match args.get("path").and_then(|v| v.as_str()) {
            Some(p) => resolve_within_root(p, &ctx.cwd, &ctx.project_root)?,
            None => ctx.project_root.clone(),
        };

        let results = match ripgrep_search(query, &base, max).await {
            Some(results) => results,
            None => in_process_search(query, &base, max)?,
        };

        let count = results.len();
        let output = if results.is_empty() {
            "No matches found".to_string()
        } else {
            results.join("\n")
        };

        Ok(ToolResult {
            output,
            title: format!("search_codebase: {query}"),
            metadata: json!({ "match_count": count }),
        })
    }
}

/// Tries `rg` first, matching the "prefer an external ripgrep-equivalent
/// subprocess" contract. Returns `None` if `rg` isn't on PATH or fails so the
/// caller degrades to the in-process scan.
async fn ripgrep_search(query: &str, base: &std::path::Path, max: usize) -> Option<Vec<String>> {
    let output = Command::new("rg")
        .arg("--line-number")
        .arg("--no-heading")
        .arg("--max-count")
        .arg(max.to_string())
        .arg(query)
        .arg(base)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .ok()?;

    if output.status.code() == Some(2) {
        // rg exit code 2 means a usage/regex error, not "no matches".
        return None;
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<String> = text.lines().take(max).map(|l| l.to_string()).collect();
    Some(lines)
}

fn in_process_search(query: &str, base: &Path, max: usize) -> Result<Vec<String>> {
    let re = Regex::new(query).map_err(|e| anyhow::anyhow!("Invalid regex pattern: {e}"))?;
    let mut results = Vec::new();
    search_dir(base, &re, &mut results, max)?;
    Ok(results)
}

fn search_dir(dir: &Path, re: &Regex, results: &mut Vec<String>, max: usize) -> Result<()> {
    if results.len() >= max || !dir.exists() {
        return Ok(());
    }

    if dir.is_file() {
        search_file(dir, re, results, max)?;
        return Ok(());
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        if results.len() >= max {
            break;
        }
        let path = entry.path();
        let name_str = entry.file_name().to_string_lossy().to_string();

        if name_str.starts_with('.') || name_str == "node_modules" || name_str == "target" {
            continue;
        }

        if path.is_dir() {
            search_dir(&path, re, results, max)?;
        } else if path.is_file() {
            search_file(&path, re, results, max)?;
        }
    }
    Ok(())
}

fn search_file(path: &Path, re: &Regex, results: &mut Vec<String>, max: usize) -> Result<()> {
    let content = match std::fs::read(path) {
        Ok(data) => data,
        Err(_) => return Ok(()),
    };

    if content.len() > 512 && content[..512].contains(&0) {
        return Ok(());
    }

    let text = String::from_utf8_lossy(&content);
    for (line_num, line) in text.lines().enumerate() {
        if results.len() >= max {
            break;
        }
        if re.is_match(line) {
            let display_line = if line.len() > MAX_LINE_LEN {
                format!("{}...", &line[..MAX_LINE_LEN])
            } else {
                line.to_string()
            };
            results.push(format!("{}:{}:{}", path.display(), line_num + 1, display_line));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_process_search_caps_at_requested_max() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "match\nmatch\nmatch\n").unwrap();
        let results = in_process_search("match", tmp.path(), 2).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn search_is_hard_capped_at_fifty_even_if_caller_asks_for_more() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(tmp.path().to_path_buf());
        let result = SearchCodebaseTool
            .execute(json!({ "query": "x", "max": 10_000 }), &ctx)
            .await
            .unwrap();
        assert!(result.metadata["match_count"].as_u64().unwrap() <= MAX_MATCHES as u64);
    }
}
