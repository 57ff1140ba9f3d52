//! Audit Logger (spec.md §4.12): one Markdown + one mirrored JSON artifact
//! per council run. Field order is fixed by `AuditArtifact`'s declaration,
//! not a map, so the two renderings never diverge across engines -- SOC2
//! evidence depends on that stability.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::model::CouncilRun;

#[derive(Debug, Clone, Serialize)]
pub struct SuppressionEvent {
    pub exception_id: String,
    pub role: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AuditArtifact<'a> {
    pub run_id: &'a str,
    pub story_id: &'a Option<String>,
    pub changeset_ref: &'a str,
    pub engine: &'a str,
    pub role_runs: &'a [crate::model::RoleRun],
    pub aggregate_verdict: crate::model::Verdict,
    pub citation_rate: f64,
    pub hallucination_rate: f64,
    pub suppressions: &'a [SuppressionEvent],
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_ms: i64,
}

impl<'a> AuditArtifact<'a> {
    pub fn from_run(run: &'a CouncilRun, engine: &'a str, suppressions: &'a [SuppressionEvent]) -> Self {
        let duration_ms = run
            .finished_at
            .map(|end| (end - run.started_at).num_milliseconds())
            .unwrap_or(0);
        Self {
            run_id: &run.id,
            story_id: &run.story_id,
            changeset_ref: &run.changeset_ref,
            engine,
            role_runs: &run.role_runs,
            aggregate_verdict: run.aggregate_verdict,
            citation_rate: run.citation_rate,
            hallucination_rate: run.hallucination_rate,
            suppressions,
            started_at: run.started_at,
            finished_at: run.finished_at,
            duration_ms,
        }
    }
}

pub fn render_json(artifact: &AuditArtifact) -> Result<String> {
    Ok(serde_json::to_string_pretty(artifact)?)
}

pub fn render_markdown(artifact: &AuditArtifact) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Council run {}\n\n", artifact.run_id));
    out.push_str(&format!(
        "- Story: {}\n- Changeset: {}\n- Engine: {}\n- Verdict: {:?}\n- Citation rate: {:.2}\n\
         - Hallucination rate: {:.2}\n- Duration: {}ms\n\n",
        artifact.story_id.as_deref().unwrap_or("-"),
        artifact.changeset_ref,
        artifact.engine,
        artifact.aggregate_verdict,
        artifact.citation_rate,
        artifact.hallucination_rate,
        artifact.duration_ms,
    ));

    out.push_str("## Role runs\n\n");
    for role_run in artifact.role_runs {
        out.push_str(&format!(
            "### {} -- {:?} ({}ms)\n\n",
            role_run.role, role_run.verdict, role_run.duration_ms
        ));
        if role_run.findings.is_empty() {
            out.push_str("No findings.\n\n");
            continue;
        }
        for finding in &role_run.findings {
            let refs = finding
                .references
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(
                "- [{:?}] {} (refs: {})\n",
                finding.severity, finding.message, refs
            ));
        }
        out.push('\n');
    }

    if !artifact.suppressions.is_empty() {
        out.push_str("## Exception suppressions\n\n");
        for s in artifact.suppressions {
            out.push_str(&format!("- {} suppressed {}'s finding: {}\n", s.exception_id, s.role, s.message));
        }
        out.push('\n');
    }

    out
}

/// Writes both artifacts under `dir/{run_id}.md` and `dir/{run_id}.json`,
/// creating `dir` if needed.
pub async fn write(dir: &Path, artifact: &AuditArtifact<'_>) -> Result<(PathBuf, PathBuf)> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating audit directory {}", dir.display()))?;

    let md_path = dir.join(format!("{}.md", artifact.run_id));
    let json_path = dir.join(format!("{}.json", artifact.run_id));

    tokio::fs::write(&md_path, render_markdown(artifact)).await?;
    tokio::fs::write(&json_path, render_json(artifact)?).await?;

    Ok((md_path, json_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CouncilRun, Verdict};

    #[test]
    fn markdown_and_json_agree_on_verdict_and_rates() {
        let mut run = CouncilRun::new(Some("story-1".to_string()), "HEAD".to_string());
        run.aggregate_verdict = Verdict::Block;
        run.citation_rate = 0.8;
        run.hallucination_rate = 0.1;
        let suppressions = vec![];
        let artifact = AuditArtifact::from_run(&run, "parallel", &suppressions);

        let md = render_markdown(&artifact);
        let json = render_json(&artifact).unwrap();

        assert!(md.contains("Block"));
        assert!(json.contains("\"aggregate_verdict\": \"block\""));
        assert!(json.contains("\"citation_rate\": 0.8"));
    }
}
