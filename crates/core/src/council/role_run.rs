//! One role's bounded Reason-Act-Observe loop (spec.md §4.9 step 4):
//! system instruction, then up to `max_steps` rounds of a model turn
//! followed by tool execution, terminating on a final text answer or on
//! exhausting the step budget.

use std::time::Instant;

use anyhow::Result;
use serde_json::Value;
use warden_auth::Vault;
use warden_config::Config;
use warden_provider::{ChatRequest, ContentPart, Message, MessageContent, Role as MessageRole};

use crate::conversation::Transcript;
use crate::model::{Role, RoleKind, RoleRun, Verdict};
use crate::tools::{ToolContext, ToolRegistry};

use super::guard::CouncilGuard;
use super::parse::{parse_role_answer, ReferenceResolver};

pub const DEFAULT_MAX_STEPS: u32 = 10;
/// Observations are trimmed the same way the Token Manager trims a session
/// transcript, just applied per-role (spec.md §4.3/§4.9 step 4).
pub const MAX_TRANSCRIPT_MESSAGES: usize = 40;

pub struct RoleRunInput<'a> {
    pub role: &'a Role,
    pub system_prompt: String,
    pub user_prompt: String,
    pub config: &'a Config,
    pub vault: Option<&'a Vault>,
    pub guard: &'a CouncilGuard,
    pub registry: &'a ToolRegistry,
    pub tool_ctx: &'a ToolContext,
    pub max_steps: u32,
    pub known_exception_ids: &'a [String],
}

pub struct RoleRunOutcome {
    pub role_run: RoleRun,
    pub unresolved_references: usize,
    pub failed: bool,
}

pub async fn run_role(input: RoleRunInput<'_>) -> RoleRunOutcome {
    let started = Instant::now();
    let result = run_role_inner(&input).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok((verdict, findings, unresolved)) => RoleRunOutcome {
            role_run: RoleRun {
                role: input.role.name.clone(),
                verdict,
                findings,
                duration_ms,
            },
            unresolved_references: unresolved,
            failed: false,
        },
        Err(err) => {
            tracing::warn!(role = %input.role.name, error = %err, "role run failed");
            RoleRunOutcome {
                role_run: RoleRun {
                    role: input.role.name.clone(),
                    verdict: Verdict::NeedsInfo,
                    findings: Vec::new(),
                    duration_ms,
                },
                unresolved_references: 0,
                failed: true,
            }
        }
    }
}

async fn run_role_inner(
    input: &RoleRunInput<'_>,
) -> Result<(Verdict, Vec<crate::model::Finding>, usize)> {
    let mut transcript = Transcript::new();
    transcript.push(Message {
        role: MessageRole::System,
        content: MessageContent::Text(input.system_prompt.clone()),
    });
    transcript.push(Message {
        role: MessageRole::User,
        content: MessageContent::Text(input.user_prompt.clone()),
    });

    let tool_defs = input.registry.definitions();
    let model = super::resolve_model(input.config, input.vault, input.role.model_tier)?;
    // spec.md §4.5: Gatekeeper roles call at temperature=0 for repeatable
    // verdicts; Consultative roles keep the provider's default.
    let temperature = match input.role.kind {
        RoleKind::Gatekeeper => Some(0.0),
        RoleKind::Consultative => None,
    };

    for _step in 0..input.max_steps {
        transcript.trim_fifo(MAX_TRANSCRIPT_MESSAGES);

        let request = ChatRequest {
            model: model.clone(),
            messages: transcript.messages().to_vec(),
            tools: tool_defs.clone(),
            max_tokens: Some(4096),
            temperature,
            system: None,
            stream: false,
            thinking: None,
        };

        let (_provider_id, response) = input.guard.call(input.config, input.vault, &request).await?;
        let tool_uses = extract_tool_uses(&response.message);

        if tool_uses.is_empty() {
            let text = response.message.content.as_text().to_string();
            let resolver = ReferenceResolver {
                project_root: &input.tool_ctx.project_root,
                known_exception_ids: input.known_exception_ids,
            };
            let parsed = parse_role_answer(&input.role.name, &text, &resolver);
            return Ok((
                parsed.verdict.unwrap_or(Verdict::NeedsInfo),
                parsed.findings,
                parsed.unresolved_references,
            ));
        }

        transcript.push(response.message.clone());

        for (id, name, args) in tool_uses {
            let result = input
                .registry
                .execute(&name, args, input.tool_ctx)
                .await
                .unwrap_or_else(|err| crate::tools::ToolResult {
                    output: format!("error: {err}"),
                    title: name.clone(),
                    metadata: Value::Null,
                });
            transcript.push(Message {
                role: MessageRole::Tool,
                content: MessageContent::Parts(vec![ContentPart::ToolResult {
                    tool_use_id: id,
                    content: result.output,
                }]),
            });
        }
    }

    Ok((Verdict::NeedsInfo, Vec::new(), 0))
}

fn extract_tool_uses(message: &Message) -> Vec<(String, String, Value)> {
    match &message.content {
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect(),
        MessageContent::Text(_) => Vec::new(),
    }
}
