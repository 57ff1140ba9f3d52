//! Core governance data model: roles, findings, ADRs, exceptions, journeys,
//! changesets and council runs (spec data model). IDs are plain strings;
//! cross-references (ADR-n, JRN-n, EXC-n, file:line) are resolved on demand
//! rather than embedded as owned objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_provider::ModelTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    /// Emits a structured VERDICT; findings without a citation are dropped.
    Gatekeeper,
    /// Free-form advice; citations encouraged, not enforced.
    Consultative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub focus_area: String,
    pub system_instruction: String,
    pub governance_checks: Vec<String>,
    pub relevant_paths_glob: Vec<String>,
    pub kind: RoleKind,
    pub model_tier: ModelTier,
    /// Whether this role may issue `delegate_to(role)` requests (adk engine only).
    pub may_delegate: bool,
}

impl Role {
    /// True when the changeset touches at least one of this role's globs.
    pub fn is_relevant(&self, changed_files: &[String]) -> bool {
        self.relevant_paths_glob.iter().any(|pat| {
            changed_files.iter().any(|f| {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(f))
                    .unwrap_or(false)
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reference {
    Adr(String),
    Journey(String),
    Exception(String),
    FileLine(String, u32),
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reference::Adr(id) => write!(f, "ADR-{id}"),
            Reference::Journey(id) => write!(f, "JRN-{id}"),
            Reference::Exception(id) => write!(f, "EXC-{id}"),
            Reference::FileLine(path, line) => write!(f, "{path}:{line}"),
        }
    }
}

impl Reference {
    /// File component used for EXC `affected_files_glob` matching and for
    /// aggregation's file-then-line sort.
    pub fn file(&self) -> Option<&str> {
        match self {
            Reference::FileLine(path, _) => Some(path.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub role: String,
    pub severity: Severity,
    pub message: String,
    pub references: Vec<Reference>,
    pub chunk_id: Option<String>,
}

impl Finding {
    pub fn has_resolvable_reference(&self) -> bool {
        !self.references.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionStatus {
    Accepted,
    Superseded,
    Retired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionRecord {
    pub id: String,
    pub status: ExceptionStatus,
    /// `ADR-\d+` or a lint-rule id; validated at construction (open question decision).
    pub rule_reference: String,
    pub affected_files_glob: Vec<String>,
    pub justification: String,
    pub conditions: Vec<String>,
}

impl ExceptionRecord {
    pub fn is_active(&self) -> bool {
        self.status == ExceptionStatus::Accepted
    }

    /// EXC `rule_reference` is constrained to `ADR-\d+` or a bare lint-rule id.
    pub fn validate_rule_reference(reference: &str) -> bool {
        if let Some(rest) = reference.strip_prefix("ADR-") {
            return !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit());
        }
        !reference.is_empty() && reference.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdrStatus {
    Draft,
    Proposed,
    Accepted,
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LintRuleType {
    Regex,
    Ast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintRule {
    pub adr_id: String,
    pub rule_type: LintRuleType,
    pub pattern: String,
    pub scope_glob: String,
    pub violation_message: String,
    pub timeout_ms: u64,
}

impl LintRule {
    pub const MAX_TIMEOUT_MS: u64 = 5000;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adr {
    pub id: String,
    pub status: AdrStatus,
    pub enforcement: Vec<LintRule>,
}

impl Adr {
    /// Only accepted ADRs contribute lint rules.
    pub fn active_rules(&self) -> &[LintRule] {
        if self.status == AdrStatus::Accepted {
            &self.enforcement
        } else {
            &[]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JourneyState {
    Draft,
    Open,
    Committed,
    Accepted,
    Retired,
}

impl JourneyState {
    /// Journeys in these states require a non-empty, existing test set.
    pub fn requires_tests(&self) -> bool {
        matches!(self, JourneyState::Committed | JourneyState::Accepted)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JourneyImplementation {
    pub files: Vec<String>,
    pub tests: Vec<String>,
    pub framework: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journey {
    pub id: String,
    pub title: String,
    pub state: JourneyState,
    pub actor: String,
    pub description: String,
    pub steps: Vec<String>,
    pub implementation: JourneyImplementation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffHunk {
    pub file: String,
    pub start_line: u32,
    pub line_count: u32,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Changeset {
    pub files: Vec<String>,
    pub base_ref: String,
    pub head_ref: String,
    pub diff_hunks: Vec<DiffHunk>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Block,
    /// A role whose loop failed or timed out contributes this, never `Pass`.
    NeedsInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRun {
    pub role: String,
    pub verdict: Verdict,
    pub findings: Vec<Finding>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilRun {
    pub id: String,
    pub story_id: Option<String>,
    pub changeset_ref: String,
    pub role_runs: Vec<RoleRun>,
    pub aggregate_verdict: Verdict,
    pub audit_path: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub citation_rate: f64,
    pub hallucination_rate: f64,
}

impl CouncilRun {
    pub fn new(story_id: Option<String>, changeset_ref: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            story_id,
            changeset_ref,
            role_runs: Vec::new(),
            aggregate_verdict: Verdict::Pass,
            audit_path: None,
            started_at: Utc::now(),
            finished_at: None,
            citation_rate: 0.0,
            hallucination_rate: 0.0,
        }
    }
}
