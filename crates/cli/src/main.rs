//! Thin subcommand dispatch over the governance core's typed operations
//! (spec.md §6). Every arm builds its inputs, calls exactly one
//! core/provider/auth/index operation, and prints the typed result --
//! governance logic itself lives in `warden-core` and friends, never here.

mod git;

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use warden_auth::Vault;
use warden_config::Config;
use warden_core::audit::{self, AuditArtifact, SuppressionEvent};
use warden_core::council::{self, CouncilConfig, CouncilInput, Engine};
use warden_core::exceptions::ExceptionSet;
use warden_core::lint::parse_adr;
use warden_core::model::{Adr, AdrStatus, ExceptionRecord, Journey, JourneyState};
use warden_core::preflight::{self, exit_code, PreflightInput};
use warden_core::roles::built_in_roles;
use warden_core::tools::default_registry;
use warden_index::journeys::JourneyIndex;
use warden_provider::{ChatRequest, Message, MessageContent, ModelRegistry};

#[derive(Parser)]
#[command(
    name = "warden",
    version,
    about = "Developer-governance CLI: Story-Driven Development with AI Governance Council review"
)]
struct Cli {
    /// Overrides `provider.active` for this invocation.
    #[arg(long, global = true)]
    provider: Option<String>,
    /// Overrides `governance.panel_engine` (legacy, parallel, adk).
    #[arg(long, global = true)]
    panel_engine: Option<String>,
    /// Forces AI-backed commands (council, backfill-tests) to run even when
    /// the command would otherwise default to a deterministic-only mode.
    #[arg(long, global = true)]
    ai: bool,
    /// Refuses to make any provider call; AI-backed commands degrade to
    /// their deterministic subset instead of erroring.
    #[arg(long, global = true)]
    offline: bool,
    /// Emits the audit JSON / machine-readable payload instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the full gate sequence (ADR lint -> journey gate -> council) and
    /// emits a verdict + audit artifact. Exit codes per spec.md §6.
    Preflight {
        /// Ref the working tree is diffed against.
        #[arg(long, default_value = "HEAD")]
        base: String,
        #[arg(long)]
        story: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        skip_lint: bool,
        #[arg(long)]
        skip_journey: bool,
        #[arg(long)]
        skip_council: bool,
    },
    /// Convenes the council alone, with no lint/journey gates, for a quick
    /// look at what the roles would say about the current diff.
    Panel {
        #[arg(long, default_value = "HEAD")]
        base: String,
    },
    /// Reports which user journeys a changeset touches.
    Impact {
        #[arg(long, default_value = "HEAD")]
        base: String,
    },
    /// Runs preflight scoped to a Story id, as a pre-work readiness check.
    Implement {
        story: String,
        #[arg(long, default_value = "HEAD")]
        base: String,
    },
    /// Scaffolds a new Story artifact.
    NewStory { title: String },
    /// Scaffolds a new Runbook artifact.
    NewRunbook { title: String },
    /// Scaffolds a new ADR artifact under `docs/adr/`.
    NewAdr { title: String },
    /// Scaffolds a new Journey artifact under `journeys/`.
    NewJourney { id: String, title: String },
    /// Validates a journey's YAML shape and test-existence invariant.
    ValidateJourney { id: String },
    #[command(subcommand)]
    Journey(JourneyAction),
    #[command(subcommand)]
    Sync(SyncAction),
    #[command(subcommand)]
    Secret(SecretAction),
    /// Prints a past council run's audit artifact, or lists recent runs.
    Audit { run_id: Option<String> },
    /// Ad hoc retrieval query against the local codebase index.
    Query {
        text: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Lists the known model catalog, optionally scoped to one provider.
    ListModels { provider: Option<String> },
    #[command(subcommand)]
    Config(ConfigAction),
}

#[derive(Subcommand)]
enum JourneyAction {
    /// Lists every journey missing a required test.
    Coverage,
    /// Drafts a test skeleton for a journey missing one.
    BackfillTests { id: String },
}

#[derive(Subcommand)]
enum SyncAction {
    Push,
    Pull,
    Status,
}

#[derive(Subcommand)]
enum SecretAction {
    /// Creates a new local secret vault.
    Init {
        #[arg(long)]
        force: bool,
    },
    Set { service: String, key: String },
    Get { service: String, key: String },
    List {
        #[arg(long)]
        reveal: bool,
    },
    Delete { service: String, key: String },
    /// Imports provider credentials from canonical environment variables.
    Import,
    Export,
    RotateKey,
}

#[derive(Subcommand)]
enum ConfigAction {
    Get { key: String },
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    Config::ensure_dirs().context("creating ~/.warden directories")?;
    let mut config = Config::load().context("loading config")?;

    if let Some(provider) = &cli.provider {
        config.provider.active = provider.clone();
    }
    if let Some(engine) = &cli.panel_engine {
        config.governance.panel_engine = engine.parse().context("invalid --panel-engine")?;
    }
    config.provider.validate()?;

    let project_root = std::env::current_dir().context("resolving project root")?;
    let vault = open_vault_if_present();

    let exit = dispatch(cli, &config, vault.as_ref(), &project_root).await?;
    std::process::exit(exit);
}

fn engine_from_config(config: &Config) -> Engine {
    match config.governance.panel_engine {
        warden_config::PanelEngine::Legacy => Engine::Legacy,
        warden_config::PanelEngine::Parallel => Engine::Parallel,
        warden_config::PanelEngine::Adk => Engine::Adk,
    }
}

fn council_config(config: &Config) -> CouncilConfig {
    CouncilConfig {
        max_parallel: config.governance.max_parallel,
        max_steps_per_role: config.governance.max_steps_per_role,
        chunk_budget_tokens: 8000,
        deadline: std::time::Duration::from_millis(config.governance.deadline_ms),
        engine: engine_from_config(config),
    }
}

async fn dispatch(
    cli: Cli,
    config: &Config,
    vault: Option<&Vault>,
    project_root: &Path,
) -> Result<i32> {
    let json = cli.json;
    let ai = cli.ai;
    let offline = cli.offline;
    match cli.command {
        Commands::Preflight {
            base,
            story,
            dry_run,
            skip_lint,
            skip_journey,
            skip_council,
        } => {
            cmd_preflight(
                config,
                vault,
                project_root,
                &base,
                story,
                dry_run,
                skip_lint,
                skip_journey,
                skip_council,
                json,
            )
            .await
        }
        Commands::Panel { base } => cmd_panel(config, vault, project_root, &base, json).await,
        Commands::Impact { base } => cmd_impact(project_root, &base, json).await,
        Commands::Implement { story, base } => {
            cmd_preflight(
                config,
                vault,
                project_root,
                &base,
                Some(story),
                false,
                false,
                false,
                false,
                json,
            )
            .await
        }
        Commands::NewStory { title } => cmd_new_artifact(project_root, "stories", "STORY", &title),
        Commands::NewRunbook { title } => {
            cmd_new_artifact(project_root, "runbooks", "RUNBOOK", &title)
        }
        Commands::NewAdr { title } => cmd_new_adr(project_root, &title),
        Commands::NewJourney { id, title } => cmd_new_journey(project_root, &id, &title),
        Commands::ValidateJourney { id } => cmd_validate_journey(project_root, &id),
        Commands::Journey(action) => {
            cmd_journey(project_root, config, vault, action, ai, offline).await
        }
        Commands::Sync(action) => cmd_sync(action),
        Commands::Secret(action) => cmd_secret(action),
        Commands::Audit { run_id } => cmd_audit(&Config::audit_dir(), run_id),
        Commands::Query { text, limit } => cmd_query(project_root, config, &text, limit).await,
        Commands::ListModels { provider } => cmd_list_models(provider, json),
        Commands::Config(action) => cmd_config(action),
    }
}

// ---------------------------------------------------------------------------
// preflight / panel / impact
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn cmd_preflight(
    config: &Config,
    vault: Option<&Vault>,
    project_root: &Path,
    base: &str,
    story: Option<String>,
    dry_run: bool,
    skip_lint: bool,
    skip_journey: bool,
    skip_council: bool,
    json: bool,
) -> Result<i32> {
    let changeset = git::compute_changeset(project_root, base)?;
    if changeset.is_empty() {
        println!("no changes against {base}; nothing to review");
        return Ok(exit_code::PASS);
    }

    let adrs = if skip_lint {
        tracing::warn!("--skip-lint is audit-logged: ADR lint gate bypassed");
        Vec::new()
    } else {
        load_adrs(project_root)?
    };
    let exceptions = ExceptionSet::new(load_exceptions(project_root)?);
    let journey_index = if skip_journey {
        tracing::warn!("--skip-journey is audit-logged: journey gate bypassed");
        None
    } else {
        Some(JourneyIndex::open(project_root)?)
    };
    let roles = if skip_council {
        tracing::warn!("--skip-council is audit-logged: council not convened");
        Vec::new()
    } else {
        built_in_roles()
    };
    let registry = default_registry(None);

    if dry_run {
        println!(
            "dry run: {} file(s) changed against {base}; {} ADR(s) active, {} role(s) would run",
            changeset.files.len(),
            adrs.iter()
                .filter(|a| a.status == AdrStatus::Accepted)
                .count(),
            roles.len(),
        );
        return Ok(exit_code::PASS);
    }

    let outcome = preflight::run_preflight(PreflightInput {
        config,
        vault,
        project_root,
        changeset: &changeset,
        external_findings: Vec::new(),
        adrs: &adrs,
        exceptions,
        roles: &roles,
        registry: &registry,
        story_id: story,
        council: council_config(config),
        audit_dir: Config::audit_dir(),
        journey_index: journey_index.as_ref(),
    })
    .await?;

    let path = if json {
        &outcome.audit_paths.1
    } else {
        &outcome.audit_paths.0
    };
    println!("{}", std::fs::read_to_string(path)?);

    Ok(outcome.exit_code)
}

async fn cmd_panel(
    config: &Config,
    vault: Option<&Vault>,
    project_root: &Path,
    base: &str,
    json: bool,
) -> Result<i32> {
    let changeset = git::compute_changeset(project_root, base)?;
    let roles = built_in_roles();
    let registry = default_registry(None);
    let known_exception_ids = ExceptionSet::new(load_exceptions(project_root)?).ids();

    let input = CouncilInput {
        config,
        vault,
        roles: &roles,
        changeset: &changeset,
        registry: &registry,
        project_root,
        story_id: None,
        known_exception_ids: &known_exception_ids,
        council: council_config(config),
    };

    let run = council::run_council(input, |_| false).await?;
    let suppressions: Vec<SuppressionEvent> = Vec::new();
    let engine_name = match config.governance.panel_engine {
        warden_config::PanelEngine::Legacy => "legacy",
        warden_config::PanelEngine::Parallel => "parallel",
        warden_config::PanelEngine::Adk => "adk",
    };
    let artifact = AuditArtifact::from_run(&run, engine_name, &suppressions);

    if json {
        println!("{}", audit::render_json(&artifact)?);
    } else {
        println!("{}", audit::render_markdown(&artifact));
    }

    Ok(match run.aggregate_verdict {
        warden_core::model::Verdict::Block => exit_code::GATE_BLOCKED,
        _ => exit_code::PASS,
    })
}

async fn cmd_impact(project_root: &Path, base: &str, json: bool) -> Result<i32> {
    let changeset = git::compute_changeset(project_root, base)?;
    let index = JourneyIndex::open(project_root)?;
    let affected = index.affected(&changeset.files)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&affected_to_json(&affected))?
        );
    } else if affected.is_empty() {
        println!("no journeys affected by this changeset");
    } else {
        for aj in &affected {
            println!("{}: {}", aj.journey_id, aj.matched_files.join(", "));
        }
    }
    Ok(exit_code::PASS)
}

fn affected_to_json(affected: &[warden_index::journeys::AffectedJourney]) -> serde_json::Value {
    serde_json::json!(affected
        .iter()
        .map(|a| serde_json::json!({ "journey_id": a.journey_id, "matched_files": a.matched_files }))
        .collect::<Vec<_>>())
}

// ---------------------------------------------------------------------------
// ADR / exception loading
// ---------------------------------------------------------------------------

const ADR_DIR: &str = "docs/adr";
const EXCEPTIONS_DIR: &str = "exceptions";

fn load_adrs(project_root: &Path) -> Result<Vec<Adr>> {
    let dir = project_root.join(ADR_DIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut adrs = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(id) = extract_adr_id(&path) else {
            continue;
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        match parse_adr(&id, &text) {
            Ok(adr) => adrs.push(adr),
            Err(err) => tracing::warn!(adr_id = %id, error = %err, "skipping malformed ADR"),
        }
    }
    adrs.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(adrs)
}

fn extract_adr_id(path: &Path) -> Option<String> {
    let name = path.file_stem()?.to_str()?;
    let rest = name.strip_prefix("ADR-")?;
    let id: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    (!id.is_empty()).then_some(id)
}

fn load_exceptions(project_root: &Path) -> Result<Vec<ExceptionRecord>> {
    let dir = project_root.join(EXCEPTIONS_DIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut records = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        match serde_yaml::from_str::<ExceptionRecord>(&text) {
            Ok(record) => {
                if ExceptionRecord::validate_rule_reference(&record.rule_reference) {
                    records.push(record);
                } else {
                    tracing::warn!(path = %path.display(), "exception has an invalid rule_reference; skipping");
                }
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping malformed exception")
            }
        }
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Artifact scaffolding (spec.md §1: Markdown/YAML templating is out of
// scope beyond the minimal shape the core needs; these are plain writers).
// ---------------------------------------------------------------------------

fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn cmd_new_artifact(project_root: &Path, dir_name: &str, kind: &str, title: &str) -> Result<i32> {
    let dir = project_root.join(dir_name);
    std::fs::create_dir_all(&dir)?;
    let slug = slugify(title);
    let path = dir.join(format!("{slug}.md"));
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    let body = format!("# {kind}: {title}\n\nStatus: draft\n\n## Summary\n\n## Details\n");
    std::fs::write(&path, body)?;
    println!("wrote {}", path.display());
    Ok(exit_code::PASS)
}

fn cmd_new_adr(project_root: &Path, title: &str) -> Result<i32> {
    let dir = project_root.join(ADR_DIR);
    std::fs::create_dir_all(&dir)?;
    let next_id = std::fs::read_dir(&dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .filter_map(|e| extract_adr_id(&e.path()))
                .filter_map(|id| id.parse::<u32>().ok())
                .max()
                .unwrap_or(0)
                + 1
        })
        .unwrap_or(1);
    let slug = slugify(title);
    let path = dir.join(format!("ADR-{next_id:03}-{slug}.md"));
    let body = format!(
        "# ADR-{next_id:03}: {title}\n\nStatus: Draft\n\n## Context\n\n## Decision\n\n## Enforcement\n\n\
         Add a fenced `enforcement` YAML block here once this ADR is Accepted,\n\
         e.g.:\n\n```enforcement\n- type: regex\n  pattern: \"...\"\n  scope_glob: \"**/*.rs\"\n  \
         violation_message: \"...\"\n  timeout_ms: 2000\n```\n"
    );
    std::fs::write(&path, body)?;
    println!("wrote {}", path.display());
    Ok(exit_code::PASS)
}

fn cmd_new_journey(project_root: &Path, id: &str, title: &str) -> Result<i32> {
    let bare_id = id.trim_start_matches("JRN-").trim_start_matches("jrn-");
    let dir = project_root.join("journeys");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{bare_id}.yaml"));
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    let journey = Journey {
        id: format!("JRN-{bare_id}"),
        title: title.to_string(),
        state: JourneyState::Draft,
        actor: "user".to_string(),
        description: String::new(),
        steps: Vec::new(),
        implementation: Default::default(),
    };
    std::fs::write(&path, serde_yaml::to_string(&journey)?)?;
    println!("wrote {}", path.display());
    Ok(exit_code::PASS)
}

fn load_journey(project_root: &Path, id: &str) -> Result<Journey> {
    let bare_id = id.trim_start_matches("JRN-").trim_start_matches("jrn-");
    let path = project_root.join("journeys").join(format!("{bare_id}.yaml"));
    let text =
        std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing journey {id}"))
}

fn cmd_validate_journey(project_root: &Path, id: &str) -> Result<i32> {
    let journey = load_journey(project_root, id)?;
    let missing_tests = journey_missing_test(project_root, &journey);

    println!("{}: {} ({:?})", journey.id, journey.title, journey.state);
    if missing_tests {
        println!("  missing a required, existing test file");
        return Ok(exit_code::GENERIC_FAILURE);
    }
    println!("  ok");
    Ok(exit_code::PASS)
}

// ---------------------------------------------------------------------------
// journey coverage / backfill-tests
// ---------------------------------------------------------------------------

fn all_journeys(project_root: &Path) -> Result<Vec<Journey>> {
    let dir = project_root.join("journeys");
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        ) {
            let text = std::fs::read_to_string(&path)?;
            match serde_yaml::from_str::<Journey>(&text) {
                Ok(j) => out.push(j),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping malformed journey")
                }
            }
        }
    }
    out.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(out)
}

fn journey_missing_test(project_root: &Path, journey: &Journey) -> bool {
    journey.state.requires_tests()
        && (journey.implementation.tests.is_empty()
            || journey
                .implementation
                .tests
                .iter()
                .any(|t| !project_root.join(t).is_file()))
}

async fn cmd_journey(
    project_root: &Path,
    config: &Config,
    vault: Option<&Vault>,
    action: JourneyAction,
    ai: bool,
    offline: bool,
) -> Result<i32> {
    match action {
        JourneyAction::Coverage => {
            let journeys = all_journeys(project_root)?;
            let mut any_missing = false;
            for journey in &journeys {
                if journey_missing_test(project_root, journey) {
                    any_missing = true;
                    println!(
                        "{}: missing a required test ({:?})",
                        journey.id, journey.state
                    );
                }
            }
            if !any_missing {
                println!("every committed/accepted journey has an existing test");
            }
            Ok(exit_code::PASS)
        }
        JourneyAction::BackfillTests { id } => {
            let journey = load_journey(project_root, &id)?;
            if !journey_missing_test(project_root, &journey) {
                println!("{} already has its required test", journey.id);
                return Ok(exit_code::PASS);
            }

            let suggested_path = journey
                .implementation
                .tests
                .first()
                .cloned()
                .unwrap_or_else(|| {
                    format!(
                        "tests/test_{}.py",
                        journey.id.to_lowercase().replace('-', "_")
                    )
                });

            if !ai || offline {
                println!(
                    "{} needs a test at {suggested_path}; re-run with --ai to draft one",
                    journey.id
                );
                return Ok(exit_code::GENERIC_FAILURE);
            }

            let prompt = format!(
                "Draft a test skeleton (pytest-style) for the following user journey. \
                 Cover its steps as assertions or comments; do not invent implementation details \
                 not present below.\n\nJourney: {}\nActor: {}\nSteps:\n{}\n",
                journey.title,
                journey.actor,
                journey.steps.join("\n"),
            );
            let request = ChatRequest {
                model: council::resolve_model(config, vault, warden_provider::ModelTier::Light)?,
                messages: vec![Message {
                    role: warden_provider::Role::User,
                    content: MessageContent::Text(prompt),
                }],
                tools: Vec::new(),
                max_tokens: Some(1024),
                temperature: Some(0.2),
                system: None,
                stream: false,
                thinking: None,
            };
            let (provider_id, response) =
                warden_provider::chat_with_fallback(config, vault, &request).await?;
            tracing::info!(provider = %provider_id, journey = %journey.id, "drafted a test skeleton");
            println!("{}", response.message.content.as_text());
            Ok(exit_code::PASS)
        }
    }
}

// ---------------------------------------------------------------------------
// sync (spec.md §1: remote sync transport is an external collaborator)
// ---------------------------------------------------------------------------

fn cmd_sync(action: SyncAction) -> Result<i32> {
    match action {
        SyncAction::Push | SyncAction::Pull => {
            println!(
                "no remote sync transport is configured; this core only defines the interface \
                 the Notion/Supabase collaborator would implement"
            );
            Ok(exit_code::GENERIC_FAILURE)
        }
        SyncAction::Status => {
            println!("sync: not configured");
            Ok(exit_code::PASS)
        }
    }
}

// ---------------------------------------------------------------------------
// secret
// ---------------------------------------------------------------------------

fn vault_dir() -> PathBuf {
    Config::secrets_dir()
}

fn open_vault_if_present() -> Option<Vault> {
    let dir = vault_dir();
    if !dir.join("vault.toml").exists() {
        return None;
    }
    let password = read_vault_password().ok()?;
    Vault::open(&dir, &password).ok()
}

fn read_vault_password() -> Result<String> {
    if let Ok(pw) = std::env::var("WARDEN_VAULT_PASSWORD") {
        return Ok(pw);
    }
    print!("Vault master password: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn cmd_secret(action: SecretAction) -> Result<i32> {
    let dir = vault_dir();

    match action {
        SecretAction::Init { force } => {
            let password = read_vault_password()?;
            let config = Config::load()?;
            Vault::init(&dir, &password, config.secrets.pbkdf2_iterations, force)?;
            println!("vault initialized at {}", dir.display());
            Ok(exit_code::PASS)
        }
        SecretAction::Set { service, key } => {
            let password = read_vault_password()?;
            let vault = Vault::open(&dir, &password)?;
            print!("Value for {service}/{key}: ");
            std::io::stdout().flush()?;
            let mut value = String::new();
            std::io::stdin().read_line(&mut value)?;
            vault.set(&service, &key, value.trim())?;
            println!("saved {service}/{key}");
            Ok(exit_code::PASS)
        }
        SecretAction::Get { service, key } => {
            let password = read_vault_password()?;
            let vault = Vault::open(&dir, &password)?;
            println!("{}", vault.get(&service, &key)?);
            Ok(exit_code::PASS)
        }
        SecretAction::List { reveal } => {
            let password = read_vault_password()?;
            let vault = Vault::open(&dir, &password)?;
            for (service, key, value) in vault.list(!reveal)? {
                match value {
                    Some(v) => println!("{service}/{key} = {v}"),
                    None => println!("{service}/{key} = ****"),
                }
            }
            Ok(exit_code::PASS)
        }
        SecretAction::Delete { service, key } => {
            let password = read_vault_password()?;
            let vault = Vault::open(&dir, &password)?;
            vault.delete(&service, &key)?;
            println!("deleted {service}/{key}");
            Ok(exit_code::PASS)
        }
        SecretAction::Import => {
            let password = read_vault_password()?;
            let vault = Vault::open(&dir, &password)?;
            let pairs: Vec<(&str, &str)> = warden_config::BUILT_IN_PROVIDERS
                .iter()
                .map(|d| (d.id, d.env_var))
                .collect();
            let imported = vault.import_env(&pairs)?;
            println!(
                "imported {} credential(s): {}",
                imported.len(),
                imported.join(", ")
            );
            Ok(exit_code::PASS)
        }
        SecretAction::Export => {
            let password = read_vault_password()?;
            let vault = Vault::open(&dir, &password)?;
            for (service, key, value) in vault.export()? {
                println!("{service}.{key}={value}");
            }
            Ok(exit_code::PASS)
        }
        SecretAction::RotateKey => {
            print!("Current master password: ");
            std::io::stdout().flush()?;
            let mut current = String::new();
            std::io::stdin().read_line(&mut current)?;
            let vault = Vault::open(&dir, current.trim())?;
            print!("New master password: ");
            std::io::stdout().flush()?;
            let mut new_pw = String::new();
            std::io::stdin().read_line(&mut new_pw)?;
            vault.rotate(new_pw.trim())?;
            println!("vault rotated to a new master password");
            Ok(exit_code::PASS)
        }
    }
}

// ---------------------------------------------------------------------------
// audit / query / list-models / config
// ---------------------------------------------------------------------------

fn cmd_audit(audit_dir: &Path, run_id: Option<String>) -> Result<i32> {
    match run_id {
        Some(id) => {
            let path = audit_dir.join(format!("{id}.md"));
            if !path.is_file() {
                bail!("no audit artifact found for run {id}");
            }
            println!("{}", std::fs::read_to_string(path)?);
        }
        None => {
            if !audit_dir.is_dir() {
                println!("no audit runs recorded yet");
                return Ok(exit_code::PASS);
            }
            let mut runs: Vec<String> = std::fs::read_dir(audit_dir)?
                .filter_map(|e| e.ok())
                .filter_map(|e| {
                    e.path()
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                })
                .collect();
            runs.sort();
            runs.dedup();
            for run in runs {
                println!("{run}");
            }
        }
    }
    Ok(exit_code::PASS)
}

async fn cmd_query(
    project_root: &Path,
    config: &Config,
    text: &str,
    limit: usize,
) -> Result<i32> {
    let index = warden_index::CodebaseIndex::open_with_options(
        project_root,
        None,
        warden_index::IndexOptions {
            embedding_mode: config.index.embedding_mode.clone(),
            exclude: config.index.exclude.clone(),
        },
    )
    .await?;
    index.build().await?;

    let results = index.search(text, limit).await?;
    if results.is_empty() {
        println!("no matches for {text:?}");
    }
    for r in results {
        println!(
            "{} [{}-{}] score={:.3}",
            r.file, r.start_line, r.end_line, r.score
        );
    }
    Ok(exit_code::PASS)
}

fn cmd_list_models(provider: Option<String>, json: bool) -> Result<i32> {
    let registry = ModelRegistry::new();
    let models: Vec<&warden_provider::ModelInfo> = match &provider {
        Some(p) => registry.models_for(p).iter().collect(),
        None => registry.all_models(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
    } else {
        for m in models {
            println!(
                "{}/{} [{}] context={} in=${:.2}/M out=${:.2}/M",
                m.provider,
                m.id,
                m.tier,
                m.context_display(),
                m.input_price_per_m,
                m.output_price_per_m,
            );
        }
    }
    Ok(exit_code::PASS)
}

fn cmd_config(action: ConfigAction) -> Result<i32> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = toml::Value::try_from(&config)?;
            match lookup_dotted(&value, &key) {
                Some(v) => println!("{v}"),
                None => bail!("unknown config key: {key}"),
            }
        }
        ConfigAction::Set { key, value } => {
            let config = Config::load()?;
            let mut root = toml::Value::try_from(&config)?;
            set_dotted(&mut root, &key, parse_scalar(&value))
                .ok_or_else(|| anyhow::anyhow!("unknown config key: {key}"))?;
            let updated: Config = root.try_into()?;
            updated.save()?;
            println!("set {key} = {value}");
        }
    }
    Ok(exit_code::PASS)
}

fn lookup_dotted<'a>(value: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    key.split('.').try_fold(value, |v, part| v.get(part))
}

fn set_dotted(value: &mut toml::Value, key: &str, new_value: toml::Value) -> Option<()> {
    let mut parts = key.split('.').peekable();
    let mut current = value;
    while let Some(part) = parts.next() {
        let table = current.as_table_mut()?;
        if parts.peek().is_none() {
            table.insert(part.to_string(), new_value);
            return Some(());
        }
        current = table.get_mut(part)?;
    }
    None
}

fn parse_scalar(raw: &str) -> toml::Value {
    if let Ok(b) = raw.parse::<bool>() {
        toml::Value::Boolean(b)
    } else if let Ok(i) = raw.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        toml::Value::Float(f)
    } else {
        toml::Value::String(raw.to_string())
    }
}
