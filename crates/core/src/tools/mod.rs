pub mod list_directory;
pub mod pathguard;
pub mod read_adr;
pub mod read_file;
pub mod read_journey;
pub mod search_codebase;
pub mod semantic_lookup;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Every tool call is subject to this wall-clock timeout (spec.md §4.6).
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPermission {
    /// All five canonical retrieval tools: no writes, no network IO.
    ReadOnly,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    fn permission(&self) -> ToolPermission {
        ToolPermission::ReadOnly
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult>;
}

pub type IndexHandle = Arc<warden_index::CodebaseIndex>;

#[derive(Clone)]
pub struct ToolContext {
    pub cwd: PathBuf,
    pub project_root: PathBuf,
    /// 0 = top-level role, 1 = first delegated role, etc. (adk engine only).
    pub depth: u32,
    pub index: Option<IndexHandle>,
}

impl ToolContext {
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            cwd: project_root.clone(),
            project_root,
            depth: 0,
            index: None,
        }
    }
}

pub struct ToolResult {
    pub output: String,
    pub title: String,
    pub metadata: Value,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn definitions(&self) -> Vec<warden_provider::ToolDefinition> {
        let mut defs: Vec<_> = self
            .tools
            .values()
            .map(|t| warden_provider::ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Executes `name` under the tool-call timeout; a timeout surfaces as
    /// `ToolError` observation text rather than a crash (spec.md §7).
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown tool: {name}"))?;
        match tokio::time::timeout(TOOL_TIMEOUT, tool.execute(args, ctx)).await {
            Ok(result) => result,
            Err(_) => Ok(ToolResult {
                output: "error: tool_timeout".to_string(),
                title: format!("{name}: timeout"),
                metadata: serde_json::json!({ "error": "tool_timeout" }),
            }),
        }
    }
}

/// Registers the five canonical retrieval tools (spec.md §4.6). Registering
/// `semantic_lookup` is optional: its absence must not break preflight, it
/// just leaves role-agents with `search_codebase`'s regex scan.
pub fn default_registry(index: Option<IndexHandle>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(read_file::ReadFileTool));
    registry.register(Box::new(search_codebase::SearchCodebaseTool));
    registry.register(Box::new(list_directory::ListDirectoryTool));
    registry.register(Box::new(read_adr::ReadAdrTool));
    registry.register(Box::new(read_journey::ReadJourneyTool));
    if index.is_some() {
        registry.register(Box::new(semantic_lookup::SemanticLookupTool::new(
            index.unwrap(),
        )));
    }
    registry
}
