//! Preflight Orchestrator (spec.md §4.10): sequences the gates and
//! produces one verdict + one audit artifact. Git invocation and the
//! external linter processes are the caller's concern (spec.md §1); this
//! module accepts an already-computed `Changeset` and a list of already
//! collected external-linter findings rather than shelling out itself.

use std::path::{Path, PathBuf};

use anyhow::Result;
use warden_auth::Vault;
use warden_config::Config;

use crate::audit::{self, AuditArtifact, SuppressionEvent};
use crate::council::{self, CouncilConfig, CouncilInput};
use crate::exceptions::ExceptionSet;
use crate::lint::{self};
use crate::model::{Adr, Changeset, CouncilRun, Finding, Reference, Role, Severity, Verdict};
use crate::tools::ToolRegistry;

/// Journey Index gate (spec.md §4.10 step 5): a `committed`/`accepted`
/// journey touched by the changeset with no existing test file is
/// non-blocking in this phase -- it surfaces as `warn`, never `block`.
fn check_affected_journeys(
    project_root: &Path,
    affected: &[warden_index::journeys::AffectedJourney],
) -> Vec<Finding> {
    affected
        .iter()
        .filter_map(|aj| {
            let path = project_root.join("journeys").join(format!("{}.yaml", aj.journey_id));
            let text = std::fs::read_to_string(&path).ok()?;
            let journey: crate::model::Journey = serde_yaml::from_str(&text).ok()?;
            if !journey.state.requires_tests() {
                return None;
            }
            let missing = journey.implementation.tests.is_empty()
                || journey
                    .implementation
                    .tests
                    .iter()
                    .any(|t| !project_root.join(t).is_file());
            missing.then(|| Finding {
                role: "journey-index".to_string(),
                severity: Severity::Warn,
                message: format!(
                    "journey {} is {:?} but is missing an existing test",
                    aj.journey_id, journey.state
                ),
                references: vec![Reference::Journey(aj.journey_id.clone())],
                chunk_id: None,
            })
        })
        .collect()
}

/// Exit codes spec.md §6 assigns to `preflight`.
pub mod exit_code {
    pub const PASS: i32 = 0;
    pub const GENERIC_FAILURE: i32 = 1;
    pub const GATE_BLOCKED: i32 = 2;
    pub const CONFIG_ERROR: i32 = 3;
}

pub struct PreflightInput<'a> {
    pub config: &'a Config,
    pub vault: Option<&'a Vault>,
    pub project_root: &'a Path,
    pub changeset: &'a Changeset,
    pub external_findings: Vec<Finding>,
    pub adrs: &'a [Adr],
    pub exceptions: ExceptionSet,
    pub roles: &'a [Role],
    pub registry: &'a ToolRegistry,
    pub story_id: Option<String>,
    pub council: CouncilConfig,
    pub audit_dir: PathBuf,
    /// Absence must not break preflight (spec.md §4.8): the journey gate is
    /// simply skipped and `affected_journeys` stays empty.
    pub journey_index: Option<&'a warden_index::journeys::JourneyIndex>,
}

pub struct PreflightOutcome {
    pub run: CouncilRun,
    pub exit_code: i32,
    pub audit_paths: (PathBuf, PathBuf),
}

pub async fn run_preflight(input: PreflightInput<'_>) -> Result<PreflightOutcome> {
    let known_exception_ids = input.exceptions.ids();

    let lint_findings = lint::run_lint(input.project_root, input.adrs).await;

    let journey_findings = match input.journey_index {
        Some(index) => match index.affected(&input.changeset.files) {
            Ok(affected) => check_affected_journeys(input.project_root, &affected),
            Err(err) => {
                tracing::warn!(error = %err, "journey index query failed");
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let mut all_findings: Vec<Finding> = Vec::new();
    all_findings.extend(input.external_findings);
    all_findings.extend(lint_findings);
    all_findings.extend(journey_findings);

    let engine_name = match input.council.engine {
        council::Engine::Legacy => "legacy",
        council::Engine::Parallel => "parallel",
        council::Engine::Adk => "adk",
    };

    let council_input = CouncilInput {
        config: input.config,
        vault: input.vault,
        roles: input.roles,
        changeset: input.changeset,
        registry: input.registry,
        project_root: input.project_root,
        story_id: input.story_id.clone(),
        known_exception_ids: &known_exception_ids,
        council: input.council,
    };

    let mut suppressions = Vec::new();
    let mut run = council::run_council(council_input, |finding| {
        match input.exceptions.suppressing_exception(finding) {
            Some(exception_id) => {
                suppressions.push(SuppressionEvent {
                    exception_id: exception_id.to_string(),
                    role: finding.role.clone(),
                    message: finding.message.clone(),
                });
                true
            }
            None => false,
        }
    })
    .await?;

    // The pre-council findings (external linters + ADR lint) join the same
    // EXC-suppression pass the council's own findings go through, then fold
    // into a synthetic role run so the audit log carries every gate.
    for finding in all_findings.iter_mut() {
        if let Some(exception_id) = input.exceptions.suppressing_exception(finding) {
            suppressions.push(SuppressionEvent {
                exception_id: exception_id.to_string(),
                role: finding.role.clone(),
                message: finding.message.clone(),
            });
            finding.severity = crate::model::Severity::Info;
        }
    }

    let gates_block = all_findings
        .iter()
        .any(|f| f.severity == crate::model::Severity::Block);

    if gates_block {
        run.role_runs.push(crate::model::RoleRun {
            role: "gates".to_string(),
            verdict: Verdict::Block,
            findings: all_findings,
            duration_ms: 0,
        });
        run.aggregate_verdict = Verdict::Block;
    } else if !all_findings.is_empty() {
        run.role_runs.push(crate::model::RoleRun {
            role: "gates".to_string(),
            verdict: Verdict::Pass,
            findings: all_findings,
            duration_ms: 0,
        });
    }

    let artifact = AuditArtifact::from_run(&run, engine_name, &suppressions);
    let audit_paths = audit::write(&input.audit_dir, &artifact).await?;
    run.audit_path = Some(audit_paths.0.to_string_lossy().to_string());

    let exit_code = if run.aggregate_verdict == Verdict::Block {
        exit_code::GATE_BLOCKED
    } else {
        exit_code::PASS
    };

    Ok(PreflightOutcome {
        run,
        exit_code,
        audit_paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExceptionRecord, ExceptionStatus};
    use crate::tools::ToolRegistry;

    fn empty_changeset() -> Changeset {
        Changeset {
            files: vec![],
            base_ref: "main".to_string(),
            head_ref: "HEAD".to_string(),
            diff_hunks: vec![],
        }
    }

    #[tokio::test]
    async fn a_run_with_no_gates_and_no_relevant_roles_passes() {
        let tmp = tempfile::tempdir().unwrap();
        let config = warden_config::Config::default();
        let registry = ToolRegistry::new();
        let exceptions = ExceptionSet::new(Vec::<ExceptionRecord>::new());

        let outcome = run_preflight(PreflightInput {
            config: &config,
            vault: None,
            project_root: tmp.path(),
            changeset: &empty_changeset(),
            external_findings: vec![],
            adrs: &[],
            exceptions,
            roles: &[],
            registry: &registry,
            story_id: None,
            council: CouncilConfig::default(),
            audit_dir: tmp.path().join("audit"),
            journey_index: None,
        })
        .await
        .unwrap();

        assert_eq!(outcome.exit_code, exit_code::PASS);
        assert!(outcome.audit_paths.0.exists());
        assert!(outcome.audit_paths.1.exists());
    }
}
