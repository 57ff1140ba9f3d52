use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::pathguard::resolve_within_root;
use super::{Tool, ToolContext, ToolResult};

pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List directory contents with [FILE] or [DIR] prefix and file sizes. \
         Sorted alphabetically. Hidden files are omitted."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory path, relative to the project root" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let dir_path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: path"))?;

        let path = resolve_within_root(dir_path, &ctx.cwd, &ctx.project_root)?;

        if !path.is_dir() {
            anyhow::bail!("Not a directory: {}", path.display());
        }

        let mut entries = Vec::new();
        let mut rd = tokio::fs::read_dir(&path).await?;

        while let Some(entry) = rd.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let ft = entry.file_type().await?;
            let meta = entry.metadata().await?;

            if ft.is_dir() {
                entries.push(format!("[DIR]  {name}/"));
            } else {
                entries.push(format!("[FILE] {name} ({})", format_size(meta.len())));
            }
        }

        entries.sort();
        let count = entries.len();
        let output = if entries.is_empty() {
            format!("{} is empty", path.display())
        } else {
            entries.join("\n")
        };

        Ok(ToolResult {
            output,
            title: format!("list_directory: {dir_path}"),
            metadata: json!({ "count": count }),
        })
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{size:.1}{}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_entries_sorted_and_excludes_hidden() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "x").unwrap();
        std::fs::write(tmp.path().join(".hidden"), "x").unwrap();
        let ctx = ToolContext::new(tmp.path().to_path_buf());
        let result = ListDirectoryTool
            .execute(json!({ "path": "." }), &ctx)
            .await
            .unwrap();
        assert!(result.output.find("a.txt").unwrap() < result.output.find("b.txt").unwrap());
        assert!(!result.output.contains(".hidden"));
    }
}
