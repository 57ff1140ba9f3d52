//! End-to-end coverage for the preflight pipeline's testable properties:
//! a deterministic ADR-lint block that the council cannot override, a
//! passing journey-index gate, and exception suppression recorded in the
//! audit trail.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use warden_core::exceptions::ExceptionSet;
use warden_core::lint::parse_adr;
use warden_core::model::{Changeset, ExceptionRecord, ExceptionStatus};
use warden_core::preflight::{exit_code, run_preflight, PreflightInput};
use warden_core::tools::{Tool, ToolContext, ToolRegistry, ToolResult};
use warden_index::journeys::JourneyIndex;
use warden_provider::{
    ChatRequest, ChatResponse, Message, MessageContent, ModelInfo, ModelTier, Provider,
    ProviderError, Role as MessageRole, StreamEvent,
};

fn empty_changeset(files: &[&str]) -> Changeset {
    Changeset {
        files: files.iter().map(|s| s.to_string()).collect(),
        base_ref: "main".to_string(),
        head_ref: "HEAD".to_string(),
        diff_hunks: vec![],
    }
}

const ADR_025: &str = r#"
# ADR-025: no module-level side effects

Status: Accepted

```enforcement
- type: regex
  pattern: "^ai_service = "
  scope_glob: "commands/**"
  violation_message: "module-level AIService instantiation is forbidden"
  timeout_ms: 1000
```
"#;

#[tokio::test]
async fn s1_an_accepted_adr_lint_violation_blocks_even_with_no_roles_to_override_it() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("commands")).unwrap();
    std::fs::write(
        tmp.path().join("commands/check.py"),
        "ai_service = AIService()\n",
    )
    .unwrap();

    let adr = parse_adr("025", ADR_025).unwrap();
    let config = warden_config::Config::default();
    let registry = ToolRegistry::new();
    let exceptions = ExceptionSet::new(Vec::<ExceptionRecord>::new());

    let outcome = run_preflight(PreflightInput {
        config: &config,
        vault: None,
        project_root: tmp.path(),
        changeset: &empty_changeset(&["commands/check.py"]),
        external_findings: vec![],
        adrs: &[adr],
        exceptions,
        roles: &[],
        registry: &registry,
        story_id: None,
        council: Default::default(),
        audit_dir: tmp.path().join("audit"),
        journey_index: None,
    })
    .await
    .unwrap();

    assert_eq!(outcome.exit_code, exit_code::GATE_BLOCKED);
    let gates = outcome
        .run
        .role_runs
        .iter()
        .find(|r| r.role == "gates")
        .expect("a gates role run records the lint finding");
    assert!(gates
        .findings
        .iter()
        .any(|f| f.message.contains("ADR-025") || f.message.contains("module-level")));
}

#[tokio::test]
async fn s2_an_affected_journey_with_an_existing_test_passes_quietly() {
    let tmp = tempfile::tempdir().unwrap();
    let journeys_dir = tmp.path().join("journeys");
    std::fs::create_dir_all(&journeys_dir).unwrap();
    std::fs::create_dir_all(tmp.path().join("tests")).unwrap();
    std::fs::write(tmp.path().join("tests/test_jrn_044.py"), "def test_it(): pass\n").unwrap();
    std::fs::write(
        journeys_dir.join("JRN-044.yaml"),
        "id: JRN-044\n\
         title: notes editing\n\
         state: accepted\n\
         actor: user\n\
         description: user edits project notes\n\
         steps: []\n\
         implementation:\n\
         \x20\x20files: [\"docs/notes.md\"]\n\
         \x20\x20tests: [\"tests/test_jrn_044.py\"]\n",
    )
    .unwrap();
    std::fs::create_dir_all(tmp.path().join("docs")).unwrap();
    std::fs::write(tmp.path().join("docs/notes.md"), "notes\n").unwrap();

    let index = JourneyIndex::open(tmp.path()).unwrap();
    let config = warden_config::Config::default();
    let registry = ToolRegistry::new();
    let exceptions = ExceptionSet::new(Vec::<ExceptionRecord>::new());

    let outcome = run_preflight(PreflightInput {
        config: &config,
        vault: None,
        project_root: tmp.path(),
        changeset: &empty_changeset(&["docs/notes.md"]),
        external_findings: vec![],
        adrs: &[],
        exceptions,
        roles: &[],
        registry: &registry,
        story_id: None,
        council: Default::default(),
        audit_dir: tmp.path().join("audit"),
        journey_index: Some(&index),
    })
    .await
    .unwrap();

    assert_eq!(outcome.exit_code, exit_code::PASS);
}

#[tokio::test]
async fn s2_an_affected_journey_missing_its_test_warns_but_never_blocks() {
    let tmp = tempfile::tempdir().unwrap();
    let journeys_dir = tmp.path().join("journeys");
    std::fs::create_dir_all(&journeys_dir).unwrap();
    std::fs::create_dir_all(tmp.path().join("docs")).unwrap();
    std::fs::write(tmp.path().join("docs/notes.md"), "notes\n").unwrap();
    std::fs::write(
        journeys_dir.join("JRN-044.yaml"),
        "id: JRN-044\n\
         title: notes editing\n\
         state: accepted\n\
         actor: user\n\
         description: user edits project notes\n\
         steps: []\n\
         implementation:\n\
         \x20\x20files: [\"docs/notes.md\"]\n\
         \x20\x20tests: [\"tests/test_jrn_044_missing.py\"]\n",
    )
    .unwrap();

    let index = JourneyIndex::open(tmp.path()).unwrap();
    let config = warden_config::Config::default();
    let registry = ToolRegistry::new();
    let exceptions = ExceptionSet::new(Vec::<ExceptionRecord>::new());

    let outcome = run_preflight(PreflightInput {
        config: &config,
        vault: None,
        project_root: tmp.path(),
        changeset: &empty_changeset(&["docs/notes.md"]),
        external_findings: vec![],
        adrs: &[],
        exceptions,
        roles: &[],
        registry: &registry,
        story_id: None,
        council: Default::default(),
        audit_dir: tmp.path().join("audit"),
        journey_index: Some(&index),
    })
    .await
    .unwrap();

    // A missing journey test surfaces as a warning, never a block.
    assert_eq!(outcome.exit_code, exit_code::PASS);
    let gates = outcome.run.role_runs.iter().find(|r| r.role == "gates");
    assert!(gates.is_some());
}

#[tokio::test]
async fn s4_an_accepted_exception_downgrades_a_matching_lint_finding_and_records_a_suppression() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("commands")).unwrap();
    std::fs::write(
        tmp.path().join("commands/utils.py"),
        "ai_service = AIService()\n",
    )
    .unwrap();

    let adr = parse_adr("025", ADR_025).unwrap();
    let exception = ExceptionRecord {
        id: "EXC-001".to_string(),
        status: ExceptionStatus::Accepted,
        rule_reference: "ADR-025".to_string(),
        affected_files_glob: vec!["commands/utils.py".to_string()],
        justification: "legacy module pending rewrite".to_string(),
        conditions: vec![],
    };

    let config = warden_config::Config::default();
    let registry = ToolRegistry::new();
    let exceptions = ExceptionSet::new(vec![exception]);

    let outcome = run_preflight(PreflightInput {
        config: &config,
        vault: None,
        project_root: tmp.path(),
        changeset: &empty_changeset(&["commands/utils.py"]),
        external_findings: vec![],
        adrs: &[adr],
        exceptions,
        roles: &[],
        registry: &registry,
        story_id: None,
        council: Default::default(),
        audit_dir: tmp.path().join("audit"),
        journey_index: None,
    })
    .await
    .unwrap();

    assert_eq!(outcome.exit_code, exit_code::PASS);

    let json = std::fs::read_to_string(&outcome.audit_paths.1).unwrap();
    assert!(json.contains("EXC-001"), "audit JSON should record the suppression: {json}");
}

#[test]
fn s6_a_120k_token_diff_splits_without_breaking_a_hunk() {
    use warden_core::changeset::chunk_changeset;
    use warden_core::model::DiffHunk;

    let hunk_text = "x".repeat(2_000);
    let diff_hunks: Vec<DiffHunk> = (0..60)
        .map(|i| DiffHunk {
            file: format!("src/file_{i}.rs"),
            start_line: 1,
            line_count: 40,
            text: hunk_text.clone(),
        })
        .collect();
    let changeset = Changeset {
        files: diff_hunks.iter().map(|h| h.file.clone()).collect(),
        base_ref: "main".to_string(),
        head_ref: "HEAD".to_string(),
        diff_hunks,
    };

    // ~120k characters total, budget 100k: must split into at least two chunks.
    let chunks = chunk_changeset(&changeset, 100_000, |s| s.len());
    assert!(chunks.len() >= 2);

    for chunk in &chunks {
        let total: usize = chunk.hunks.iter().map(|h| h.text.len()).sum();
        assert!(total <= 100_000 || chunk.hunks.len() == 1);
    }

    let all_hunks: usize = chunks.iter().map(|c| c.hunks.len()).sum();
    assert_eq!(all_hunks, changeset.files.len());
}

/// A fake `Provider` for exercising the fallback chain without a live
/// network call: always transient-fails or always succeeds, and counts
/// how many times `chat` was actually invoked.
struct MockProvider {
    name: String,
    calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    transient_failure: bool,
    models: Vec<ModelInfo>,
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_models(&self) -> &[ModelInfo] {
        &self.models
    }

    async fn chat(&self, _request: &ChatRequest) -> anyhow::Result<ChatResponse> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.transient_failure {
            Err(ProviderError::RateLimited {
                retry_after_ms: 1000,
            }
            .into())
        } else {
            Ok(ChatResponse {
                message: Message {
                    role: MessageRole::Assistant,
                    content: MessageContent::Text("ok".to_string()),
                },
                usage: None,
                finish_reason: None,
            })
        }
    }

    async fn chat_stream(
        &self,
        _request: &ChatRequest,
    ) -> anyhow::Result<BoxStream<'static, anyhow::Result<StreamEvent>>> {
        unimplemented!("not exercised by these scenarios")
    }
}

fn mock_chat_request() -> ChatRequest {
    ChatRequest {
        model: "mock-model".to_string(),
        messages: vec![Message {
            role: MessageRole::User,
            content: MessageContent::Text("hello".to_string()),
        }],
        tools: vec![],
        max_tokens: None,
        temperature: None,
        system: None,
        stream: false,
        thinking: None,
    }
}

#[tokio::test]
async fn s3_provider_fallback_on_429_marks_primary_cooling_and_skips_it_on_the_next_call() {
    let primary_calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let fallback_calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let primary: Box<dyn Provider> = Box::new(MockProvider {
        name: "s3-mock-primary".to_string(),
        calls: primary_calls.clone(),
        transient_failure: true,
        models: vec![],
    });
    let fallback: Box<dyn Provider> = Box::new(MockProvider {
        name: "s3-mock-fallback".to_string(),
        calls: fallback_calls.clone(),
        transient_failure: false,
        models: vec![],
    });

    let chain: Vec<(String, Box<dyn Provider>)> = vec![
        ("s3-mock-primary".to_string(), primary),
        ("s3-mock-fallback".to_string(), fallback),
    ];
    let fallback_cfg = warden_config::FallbackConfig::default();
    let request = mock_chat_request();

    let (winner, _) = warden_provider::chat_with_fallback_over(&chain, &fallback_cfg, &request)
        .await
        .unwrap();
    assert_eq!(winner, "s3-mock-fallback");
    assert_eq!(primary_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(fallback_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    // spec.md §4.5 invariant: no request returns success from a cooling
    // provider until its backoff elapses, so a second call must skip
    // primary entirely rather than retrying it.
    let (winner, _) = warden_provider::chat_with_fallback_over(&chain, &fallback_cfg, &request)
        .await
        .unwrap();
    assert_eq!(winner, "s3-mock-fallback");
    assert_eq!(
        primary_calls.load(std::sync::atomic::Ordering::SeqCst),
        1,
        "cooling provider must not be retried before its backoff elapses"
    );
    assert_eq!(fallback_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn s3_all_providers_cooling_returns_retry_after_without_calling_any_provider() {
    let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let only: Box<dyn Provider> = Box::new(MockProvider {
        name: "s3-mock-solo".to_string(),
        calls: calls.clone(),
        transient_failure: true,
        models: vec![],
    });
    let chain: Vec<(String, Box<dyn Provider>)> = vec![("s3-mock-solo".to_string(), only)];
    let fallback_cfg = warden_config::FallbackConfig::default();
    let request = mock_chat_request();

    warden_provider::chat_with_fallback_over(&chain, &fallback_cfg, &request)
        .await
        .unwrap_err();
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    let err = warden_provider::chat_with_fallback_over(&chain, &fallback_cfg, &request)
        .await
        .unwrap_err();
    assert_eq!(
        calls.load(std::sync::atomic::Ordering::SeqCst),
        1,
        "a cooling provider must not be called at all, not even to fail again"
    );
    let provider_err = err
        .downcast_ref::<ProviderError>()
        .expect("expected a ProviderError");
    assert!(matches!(
        provider_err,
        ProviderError::AllProvidersCooling { .. }
    ));
}

/// A tool whose `execute` never returns inside `TOOL_TIMEOUT`.
struct SlowTool;

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow_tool"
    }

    fn description(&self) -> &str {
        "a tool that never finishes within the timeout"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        tokio::time::sleep(std::time::Duration::from_secs(20)).await;
        Ok(ToolResult {
            output: "should never be reached".to_string(),
            title: "slow_tool".to_string(),
            metadata: Value::Null,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn s5_a_tool_invocation_that_exceeds_the_timeout_surfaces_a_tool_timeout_observation() {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(SlowTool));
    let ctx = ToolContext::new(std::path::PathBuf::from("."));

    let result = registry
        .execute("slow_tool", serde_json::json!({}), &ctx)
        .await
        .unwrap();

    assert_eq!(result.output, "error: tool_timeout");
    assert_eq!(result.metadata, serde_json::json!({ "error": "tool_timeout" }));
}
