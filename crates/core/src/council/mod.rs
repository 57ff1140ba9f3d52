//! Council Scheduler (spec.md §4.9): convenes the relevant roles over a
//! changeset, runs each through a bounded reasoning loop, and aggregates
//! their verdicts into one pass/block outcome. Three engines share the same
//! per-role loop and produce structurally identical output so a later audit
//! diff can't tell which engine ran a given council run.

pub mod aggregate;
pub mod guard;
pub mod parse;
pub mod role_run;

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use warden_auth::Vault;
use warden_config::Config;
use warden_provider::ModelTier;

use crate::changeset::{chunk_changeset, dedup_key};
use crate::error::{CoreError, CouncilError};
use crate::model::{Changeset, CouncilRun, Finding, Role, RoleRun, Verdict};
use crate::prompt::build_role_prompt;
use crate::tools::{ToolContext, ToolRegistry};

use guard::{CouncilGuard, DEFAULT_MAX_PARALLEL};
use role_run::{run_role, RoleRunInput, DEFAULT_MAX_STEPS};

pub type Result<T> = std::result::Result<T, CouncilError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// Roles run one after another; one role's tool calls never overlap
    /// another's. Matches the scheduler's original, pre-concurrency shape.
    Legacy,
    /// Roles run concurrently, bounded by `max_parallel`.
    Parallel,
    /// Parallel, plus a gatekeeper role that exhausts its step budget may
    /// delegate once to a narrower sub-role (depth capped at 2).
    Adk,
}

#[derive(Debug, Clone)]
pub struct CouncilConfig {
    pub max_parallel: usize,
    pub max_steps_per_role: u32,
    pub chunk_budget_tokens: usize,
    pub deadline: Duration,
    pub engine: Engine,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            max_steps_per_role: DEFAULT_MAX_STEPS,
            chunk_budget_tokens: 8000,
            deadline: Duration::from_secs(600),
            engine: Engine::Parallel,
        }
    }
}

pub struct CouncilInput<'a> {
    pub config: &'a Config,
    pub vault: Option<&'a Vault>,
    pub roles: &'a [Role],
    pub changeset: &'a Changeset,
    pub registry: &'a ToolRegistry,
    pub project_root: &'a Path,
    pub story_id: Option<String>,
    pub known_exception_ids: &'a [String],
    pub council: CouncilConfig,
}

/// Runs the full council and returns the aggregate outcome. A deadline
/// overrun forces the aggregate verdict to `Block` (spec.md §4.9 step 5's
/// cooperative cancellation: in-flight role loops are abandoned, not
/// awaited further, and their partial state is discarded).
pub async fn run_council(
    input: CouncilInput<'_>,
    mut is_suppressed: impl FnMut(&Finding) -> bool,
) -> Result<CouncilRun> {
    let changeset_ref = if input.changeset.head_ref.is_empty() {
        "working-tree".to_string()
    } else {
        input.changeset.head_ref.clone()
    };

    let mut run = CouncilRun::new(input.story_id.clone(), changeset_ref);

    let relevant: Vec<&Role> = input
        .roles
        .iter()
        .filter(|r| r.is_relevant(&input.changeset.files))
        .collect();

    let guard = CouncilGuard::new(input.council.max_parallel);
    let deadline = input.council.deadline;

    let work = run_roles(&input, &relevant, &guard);
    let outcomes = match tokio::time::timeout(deadline, work).await {
        Ok(result) => result?,
        Err(_) => {
            tracing::warn!("council run exceeded its deadline; forcing block");
            Vec::new()
        }
    };

    let deadline_exceeded = outcomes.len() < relevant.len();
    let aggregate = aggregate::aggregate(outcomes, &mut is_suppressed);

    run.role_runs = aggregate.role_runs;
    run.aggregate_verdict = if deadline_exceeded {
        Verdict::Block
    } else {
        aggregate.verdict
    };
    run.citation_rate = aggregate.citation_rate;
    run.hallucination_rate = aggregate.hallucination_rate;
    run.finished_at = Some(Utc::now());

    Ok(run)
}

async fn run_roles(
    input: &CouncilInput<'_>,
    relevant: &[&Role],
    guard: &CouncilGuard,
) -> Result<Vec<aggregate::RoleOutcome>> {
    match input.council.engine {
        Engine::Legacy => {
            let mut outcomes = Vec::with_capacity(relevant.len());
            for role in relevant {
                outcomes.push(run_one_role(input, role, guard).await?);
            }
            Ok(outcomes)
        }
        Engine::Parallel => {
            let futures = relevant
                .iter()
                .map(|role| run_one_role(input, role, guard));
            let results = futures::future::join_all(futures).await;
            results.into_iter().collect()
        }
        Engine::Adk => {
            let futures = relevant
                .iter()
                .map(|role| run_one_role_with_delegation(input, role, guard, 0));
            let results = futures::future::join_all(futures).await;
            results.into_iter().collect()
        }
    }
}

/// The adk engine's delegation step (spec.md §4.9 engines): a gatekeeper
/// role that exhausts its step budget without reaching a verdict may hand
/// off once to a narrower, shorter sub-run of itself rather than leaving
/// `needs-info` as the final word. Depth is capped at
/// `guard::MAX_DELEGATION_DEPTH`.
async fn run_one_role_with_delegation(
    input: &CouncilInput<'_>,
    role: &Role,
    guard: &CouncilGuard,
    depth: u32,
) -> Result<aggregate::RoleOutcome> {
    let outcome = run_one_role(input, role, guard).await?;

    if outcome.role_run.verdict != Verdict::NeedsInfo
        || !role.may_delegate
        || CouncilGuard::exceeds_delegation_depth(depth + 1)
    {
        return Ok(outcome);
    }

    tracing::info!(role = %role.name, depth = depth + 1, "delegating to a narrower sub-run");
    let mut narrower = input.council.clone();
    narrower.max_steps_per_role = (narrower.max_steps_per_role / 2).max(1);
    let narrower_input = CouncilInput {
        config: input.config,
        vault: input.vault,
        roles: input.roles,
        changeset: input.changeset,
        registry: input.registry,
        project_root: input.project_root,
        story_id: input.story_id.clone(),
        known_exception_ids: input.known_exception_ids,
        council: narrower,
    };

    Box::pin(run_one_role_with_delegation(&narrower_input, role, guard, depth + 1)).await
}

async fn run_one_role(
    input: &CouncilInput<'_>,
    role: &Role,
    guard: &CouncilGuard,
) -> Result<aggregate::RoleOutcome> {
    let _permit = guard.acquire_slot().await;

    let estimate = |text: &str| warden_provider::tokens::estimate_tokens(text) as usize;
    let chunks = chunk_changeset(input.changeset, input.council.chunk_budget_tokens, estimate);

    let reference_ids = input
        .known_exception_ids
        .iter()
        .map(|id| format!("EXC-{id}"))
        .collect::<Vec<_>>();
    let other_roles: Vec<String> = input
        .roles
        .iter()
        .filter(|r| r.name != role.name)
        .map(|r| r.name.clone())
        .collect();
    let system_prompt = build_role_prompt(role, &other_roles, &reference_ids);

    let tool_ctx = ToolContext::new(input.project_root.to_path_buf());

    if chunks.is_empty() {
        return Ok(aggregate::RoleOutcome {
            role_run: RoleRun {
                role: role.name.clone(),
                verdict: Verdict::Pass,
                findings: Vec::new(),
                duration_ms: 0,
            },
            unresolved_references: 0,
        });
    }

    let mut merged_findings: Vec<Finding> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut worst = Verdict::Pass;
    let mut total_duration = 0u64;
    let mut total_unresolved = 0usize;
    let mut any_failed = false;

    for chunk in &chunks {
        let user_prompt = render_chunk_prompt(role, chunk);
        let outcome = run_role(RoleRunInput {
            role,
            system_prompt: system_prompt.clone(),
            user_prompt,
            config: input.config,
            vault: input.vault,
            guard,
            registry: input.registry,
            tool_ctx: &tool_ctx,
            max_steps: input.council.max_steps_per_role,
            known_exception_ids: input.known_exception_ids,
        })
        .await;

        total_duration += outcome.role_run.duration_ms;
        total_unresolved += outcome.unresolved_references;
        any_failed = any_failed || outcome.failed;

        worst = worse_of(worst, outcome.role_run.verdict);

        for finding in outcome.role_run.findings {
            // A finding with a file:line reference dedups on (role, file,
            // line) the same way ADR lint rules do; one with no such
            // reference falls back to (role, message).
            let file_line = finding
                .references
                .iter()
                .find_map(|r| match r {
                    crate::model::Reference::FileLine(path, line) => Some((path.as_str(), *line)),
                    _ => None,
                });
            let key = match file_line {
                Some((file, line)) => dedup_key(&finding.role, file, line),
                None => dedup_key(&finding.role, &finding.message, 0),
            };
            if seen.insert(key) {
                merged_findings.push(finding);
            }
        }
    }

    if any_failed && worst != Verdict::Block {
        worst = Verdict::NeedsInfo;
    }

    Ok(aggregate::RoleOutcome {
        role_run: RoleRun {
            role: role.name.clone(),
            verdict: worst,
            findings: merged_findings,
            duration_ms: total_duration,
        },
        unresolved_references: total_unresolved,
    })
}

fn worse_of(a: Verdict, b: Verdict) -> Verdict {
    match (a, b) {
        (Verdict::Block, _) | (_, Verdict::Block) => Verdict::Block,
        (Verdict::NeedsInfo, _) | (_, Verdict::NeedsInfo) => Verdict::NeedsInfo,
        _ => Verdict::Pass,
    }
}

fn render_chunk_prompt(role: &Role, chunk: &crate::changeset::Chunk) -> String {
    let mut out = format!(
        "Review the following changed hunks for {} concerns:\n\n",
        role.focus_area
    );
    for hunk in &chunk.hunks {
        out.push_str(&format!(
            "--- {} (lines {}-{}) ---\n{}\n",
            hunk.file,
            hunk.start_line,
            hunk.start_line + hunk.line_count,
            hunk.text
        ));
    }
    out
}

/// Picks a concrete model id for a role's tier from the active provider's
/// catalog, deferring to its model override when configured.
pub fn resolve_model(config: &Config, vault: Option<&Vault>, tier: ModelTier) -> Result<String> {
    let provider = warden_provider::create_provider(&config.provider.active, config, vault)
        .map_err(|e| CouncilError::Core(CoreError::Config(e.to_string())))?;
    let model = provider
        .model_for_tier(tier)
        .map(|m| m.id.clone())
        .unwrap_or_else(|| config.provider.active.clone());
    Ok(model)
}
