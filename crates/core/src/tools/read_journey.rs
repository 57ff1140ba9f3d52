use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::model::Journey;
use super::{Tool, ToolContext, ToolResult};

/// Journeys live under `journeys/<id>.yaml` (DESIGN.md open-question decision).
const JOURNEY_DIR: &str = "journeys";

pub struct ReadJourneyTool;

#[async_trait]
impl Tool for ReadJourneyTool {
    fn name(&self) -> &str {
        "read_journey"
    }

    fn description(&self) -> &str {
        "Read a user journey's full definition by id: actor, steps, and \
         implementation files/tests."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Journey id, e.g. JRN-044" }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let id_arg = args
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: id"))?;
        let id = id_arg.trim_start_matches("JRN-").trim_start_matches("jrn-");

        let path = ctx.project_root.join(JOURNEY_DIR).join(format!("{id}.yaml"));
        if !path.is_file() {
            return Ok(ToolResult {
                output: format!("No journey found for id {id}"),
                title: format!("read_journey: {id_arg}"),
                metadata: json!({ "error": "not_found" }),
            });
        }

        let raw = tokio::fs::read_to_string(&path).await?;
        let journey: Journey = serde_yaml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Malformed journey YAML for {id}: {e}"))?;

        let output = format!(
            "Journey {}: {}\nActor: {}\nState: {:?}\nSteps:\n{}\nFiles: {}\nTests: {}",
            journey.id,
            journey.title,
            journey.actor,
            journey.state,
            journey
                .steps
                .iter()
                .map(|s| format!("  - {s}"))
                .collect::<Vec<_>>()
                .join("\n"),
            journey.implementation.files.join(", "),
            journey.implementation.tests.join(", "),
        );

        Ok(ToolResult {
            output,
            title: format!("read_journey: JRN-{id}"),
            metadata: json!({ "state": format!("{:?}", journey.state) }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_and_renders_a_journey() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("journeys");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("044.yaml"),
            "id: JRN-044\ntitle: Edit notes\nstate: accepted\nactor: writer\ndescription: edits a note\nsteps: [open, edit, save]\nimplementation:\n  files: [docs/notes.md]\n  tests: [tests/test_jrn_044.py]\n",
        )
        .unwrap();

        let ctx = ToolContext::new(tmp.path().to_path_buf());
        let result = ReadJourneyTool
            .execute(json!({ "id": "JRN-044" }), &ctx)
            .await
            .unwrap();
        assert!(result.output.contains("Edit notes"));
        assert!(result.output.contains("tests/test_jrn_044.py"));
    }
}
