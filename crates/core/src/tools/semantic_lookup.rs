use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{IndexHandle, Tool, ToolContext, ToolResult};

/// Optional local vector index lookup (spec.md §4.6). Its absence from the
/// registry must not break preflight; callers fall back to `search_codebase`.
pub struct SemanticLookupTool {
    index: IndexHandle,
}

impl SemanticLookupTool {
    pub fn new(index: IndexHandle) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Tool for SemanticLookupTool {
    fn name(&self) -> &str {
        "semantic_lookup"
    }

    fn description(&self) -> &str {
        "Semantic search over indexed ADRs and rule files. Returns the top-k \
         most similar chunks with file, line range, and similarity score."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Natural-language query" },
                "k": { "type": "integer", "description": "Number of results to return (default 5)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: query"))?;
        let k = args.get("k").and_then(|v| v.as_u64()).unwrap_or(5) as usize;

        let results = self.index.search(query, k).await?;
        let count = results.len();
        let output = if results.is_empty() {
            "No similar chunks found".to_string()
        } else {
            results
                .iter()
                .map(|r| {
                    format!(
                        "{} ({}-{}) score={:.2}\n{}",
                        r.file, r.start_line, r.end_line, r.score, r.content
                    )
                })
                .collect::<Vec<_>>()
                .join("\n---\n")
        };

        Ok(ToolResult {
            output,
            title: format!("semantic_lookup: {query}"),
            metadata: json!({ "result_count": count }),
        })
    }
}
