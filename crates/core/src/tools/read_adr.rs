use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolContext, ToolResult};

/// ADRs live under `docs/adr/` named `ADR-<id>-*.md` (or exactly `ADR-<id>.md`).
const ADR_DIR: &str = "docs/adr";

pub struct ReadAdrTool;

#[async_trait]
impl Tool for ReadAdrTool {
    fn name(&self) -> &str {
        "read_adr"
    }

    fn description(&self) -> &str {
        "Read the full Markdown body of an Architecture Decision Record by id, \
         e.g. `025` for ADR-025."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "ADR id, with or without the ADR- prefix" }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let id_arg = args
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: id"))?;
        let id = id_arg.trim_start_matches("ADR-").trim_start_matches("adr-");

        let dir = ctx.project_root.join(ADR_DIR);
        let path = find_adr_file(&dir, id).await?;

        let Some(path) = path else {
            return Ok(ToolResult {
                output: format!("No ADR found for id {id}"),
                title: format!("read_adr: {id_arg}"),
                metadata: json!({ "error": "not_found" }),
            });
        };

        let content = tokio::fs::read_to_string(&path).await?;

        Ok(ToolResult {
            output: content,
            title: format!("read_adr: ADR-{id}"),
            metadata: json!({ "path": path.strip_prefix(&ctx.project_root).unwrap_or(&path).display().to_string() }),
        })
    }
}

async fn find_adr_file(dir: &std::path::Path, id: &str) -> Result<Option<std::path::PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let exact = dir.join(format!("ADR-{id}.md"));
    if exact.is_file() {
        return Ok(Some(exact));
    }

    let prefix = format!("ADR-{id}-");
    let mut rd = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(&prefix) && name.ends_with(".md") {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_an_adr_by_bare_numeric_id() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("docs/adr");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("ADR-025-use-ai-service.md"), "# ADR-025\n\nstatus: accepted\n").unwrap();

        let ctx = ToolContext::new(tmp.path().to_path_buf());
        let result = ReadAdrTool
            .execute(json!({ "id": "025" }), &ctx)
            .await
            .unwrap();
        assert!(result.output.contains("status: accepted"));
    }

    #[tokio::test]
    async fn missing_adr_reports_not_found_without_erroring() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(tmp.path().to_path_buf());
        let result = ReadAdrTool
            .execute(json!({ "id": "999" }), &ctx)
            .await
            .unwrap();
        assert_eq!(result.metadata["error"], "not_found");
    }
}
