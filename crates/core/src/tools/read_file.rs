use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::pathguard::resolve_within_root;
use super::{Tool, ToolContext, ToolResult};

const DEFAULT_LIMIT: usize = 2000;
const MAX_LINE_LEN: usize = 2000;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file's contents. Returns line-numbered output. \
         Use `offset` (1-indexed line number) and `limit` (max lines, default 2000) \
         for large files. The resolved path must stay inside the project root."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the file, relative to the project root" },
                "offset": { "type": "integer", "description": "Start reading from this line number (1-indexed)" },
                "limit": { "type": "integer", "description": "Maximum number of lines to return (default 2000)" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let path_arg = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: path"))?;

        let path = resolve_within_root(path_arg, &ctx.cwd, &ctx.project_root)?;

        if !path.exists() {
            return Ok(ToolResult {
                output: format!("File not found: {}", path.display()),
                title: format!("read_file: {path_arg}"),
                metadata: json!({ "error": "not_found" }),
            });
        }

        let raw = tokio::fs::read(&path).await?;

        if is_binary(&raw) {
            return Ok(ToolResult {
                output: format!("Binary file detected: {}", path.display()),
                title: format!("read_file: {path_arg}"),
                metadata: json!({ "binary": true, "size": raw.len() }),
            });
        }

        let content = String::from_utf8_lossy(&raw);
        let all_lines: Vec<&str> = content.lines().collect();
        let total = all_lines.len();

        let offset = args
            .get("offset")
            .and_then(|v| v.as_u64())
            .map(|v| v.saturating_sub(1) as usize)
            .unwrap_or(0);

        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_LIMIT);

        let end = (offset + limit).min(total);
        let lines = &all_lines[offset.min(total)..end];

        let mut output = String::new();
        for (i, line) in lines.iter().enumerate() {
            let line_num = offset + i + 1;
            let truncated = if line.len() > MAX_LINE_LEN {
                format!("{}... (line truncated)", &line[..MAX_LINE_LEN])
            } else {
                line.to_string()
            };
            output.push_str(&format!("{line_num:6}|{truncated}\n"));
        }

        Ok(ToolResult {
            output,
            title: format!("read_file: {path_arg}"),
            metadata: json!({ "total_lines": total, "shown": lines.len() }),
        })
    }
}

fn is_binary(data: &[u8]) -> bool {
    let check_len = data.len().min(512);
    data[..check_len].contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_a_file_inside_the_root() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "line one\nline two\n").unwrap();
        let ctx = ToolContext::new(tmp.path().to_path_buf());
        let result = ReadFileTool
            .execute(json!({ "path": "a.txt" }), &ctx)
            .await
            .unwrap();
        assert!(result.output.contains("line one"));
    }

    #[tokio::test]
    async fn rejects_traversal_outside_root() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        let ctx = ToolContext::new(project);
        let err = ReadFileTool
            .execute(json!({ "path": "../../etc/passwd" }), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("escapes project root"));
    }
}
