//! ADR Lint Engine (spec.md §4.7): a deterministic gate that runs before
//! the Council. Rules live inline in accepted ADRs as a fenced
//! `enforcement` YAML block; parsing errors isolate to the owning ADR
//! rather than aborting the run (spec.md §7 `ConfigError`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::model::{Adr, AdrStatus, Finding, LintRule, LintRuleType, Reference, Severity};

#[derive(Debug, thiserror::Error)]
pub enum LintError {
    #[error("{adr_id}: malformed enforcement block: {reason}")]
    MalformedEnforcement { adr_id: String, reason: String },
    #[error("{adr_id}: rule scope_glob escapes the project root: {scope_glob}")]
    ScopeEscapesRoot { adr_id: String, scope_glob: String },
    #[error("{adr_id}: rule timeout_ms {timeout_ms} exceeds the {max}ms ceiling")]
    TimeoutTooLarge {
        adr_id: String,
        timeout_ms: u64,
        max: u64,
    },
}

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(rename = "type")]
    rule_type: String,
    pattern: String,
    scope_glob: String,
    violation_message: String,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    2000
}

/// Parses one ADR markdown document. `id` is the caller-supplied ADR id
/// (derived from the filename, e.g. `ADR-025-foo.md` -> `"025"`).
pub fn parse_adr(id: &str, markdown: &str) -> Result<Adr, LintError> {
    let status = extract_status(markdown);
    let enforcement = extract_enforcement_block(markdown);

    let rules = match enforcement {
        Some(block) => parse_rules(id, &block)?,
        None => Vec::new(),
    };

    Ok(Adr {
        id: id.to_string(),
        status,
        enforcement: rules,
    })
}

fn extract_status(markdown: &str) -> AdrStatus {
    let re = Regex::new(r"(?im)^status:\s*(\w+)\s*$").expect("static pattern");
    let Some(caps) = re.captures(markdown) else {
        return AdrStatus::Draft;
    };
    match caps[1].to_lowercase().as_str() {
        "accepted" => AdrStatus::Accepted,
        "proposed" => AdrStatus::Proposed,
        "superseded" => AdrStatus::Superseded,
        _ => AdrStatus::Draft,
    }
}

fn extract_enforcement_block(markdown: &str) -> Option<String> {
    let re = Regex::new(r"(?s)```enforcement\s*\n(.*?)```").expect("static pattern");
    re.captures(markdown).map(|c| c[1].to_string())
}

fn parse_rules(adr_id: &str, yaml: &str) -> Result<Vec<LintRule>, LintError> {
    let raw: Vec<RawRule> =
        serde_yaml::from_str(yaml).map_err(|e| LintError::MalformedEnforcement {
            adr_id: adr_id.to_string(),
            reason: e.to_string(),
        })?;

    raw.into_iter()
        .map(|r| {
            if r.timeout_ms > LintRule::MAX_TIMEOUT_MS {
                return Err(LintError::TimeoutTooLarge {
                    adr_id: adr_id.to_string(),
                    timeout_ms: r.timeout_ms,
                    max: LintRule::MAX_TIMEOUT_MS,
                });
            }
            if r.scope_glob.starts_with('/') || r.scope_glob.contains("..") {
                return Err(LintError::ScopeEscapesRoot {
                    adr_id: adr_id.to_string(),
                    scope_glob: r.scope_glob,
                });
            }
            let rule_type = match r.rule_type.as_str() {
                "ast" => LintRuleType::Ast,
                _ => LintRuleType::Regex,
            };
            Ok(LintRule {
                adr_id: adr_id.to_string(),
                rule_type,
                pattern: r.pattern,
                scope_glob: r.scope_glob,
                violation_message: r.violation_message,
                timeout_ms: r.timeout_ms,
            })
        })
        .collect()
}

/// Runs every accepted ADR's rules against the project tree and returns the
/// findings. `ast`-typed rules are parsed but not evaluated -- no AST
/// engine is carried, matching the rest of the pack's dependency set -- and
/// are skipped with a warning rather than silently reported as passing.
pub async fn run_lint(project_root: &Path, adrs: &[Adr]) -> Vec<Finding> {
    let mut findings = Vec::new();

    for adr in adrs {
        for rule in adr.active_rules() {
            if rule.rule_type == LintRuleType::Ast {
                tracing::warn!(adr_id = %rule.adr_id, "ast lint rules are not executed");
                continue;
            }
            match run_rule(project_root, rule).await {
                Ok(mut rule_findings) => findings.append(&mut rule_findings),
                Err(err) => {
                    tracing::warn!(adr_id = %rule.adr_id, error = %err, "lint rule failed");
                }
            }
        }
    }

    findings
}

async fn run_rule(project_root: &Path, rule: &LintRule) -> anyhow::Result<Vec<Finding>> {
    let pattern = Regex::new(&rule.pattern)?;
    let files = matching_files(project_root, &rule.scope_glob)?;
    let mut findings = Vec::new();

    for file in files {
        let rel = file
            .strip_prefix(project_root)
            .unwrap_or(&file)
            .to_string_lossy()
            .to_string();
        let timeout = Duration::from_millis(rule.timeout_ms);
        let scan = tokio::time::timeout(timeout, scan_file(file.clone(), pattern.clone()));
        match scan.await {
            Ok(Ok(hits)) => {
                for (line, col) in hits {
                    findings.push(Finding {
                        role: "adr-lint".to_string(),
                        severity: Severity::Block,
                        message: format!("{}:{}:{}: {}", rel, line, col, rule.violation_message),
                        references: vec![
                            Reference::Adr(rule.adr_id.clone()),
                            Reference::FileLine(rel.clone(), line),
                        ],
                        chunk_id: None,
                    });
                }
            }
            Ok(Err(err)) => {
                tracing::warn!(file = %rel, error = %err, "lint scan failed");
            }
            Err(_) => {
                tracing::warn!(file = %rel, "lint rule timed out");
            }
        }
    }

    Ok(findings)
}

async fn scan_file(path: PathBuf, pattern: Regex) -> anyhow::Result<Vec<(u32, u32)>> {
    let content = tokio::fs::read_to_string(&path).await?;
    let mut hits = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if let Some(m) = pattern.find(line) {
            hits.push((line_no as u32 + 1, m.start() as u32 + 1));
        }
    }
    Ok(hits)
}

fn matching_files(project_root: &Path, scope_glob: &str) -> anyhow::Result<Vec<PathBuf>> {
    let pattern = project_root.join(scope_glob);
    let pattern_str = pattern.to_string_lossy().to_string();
    let mut files = Vec::new();
    for entry in glob::glob(&pattern_str)? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# ADR-025: no module-level side effects

Status: Accepted

```enforcement
- type: regex
  pattern: "^ai_service = "
  scope_glob: "**/*.py"
  violation_message: "module-level AIService instantiation is forbidden"
  timeout_ms: 1000
```
"#;

    #[test]
    fn parses_status_and_enforcement_block() {
        let adr = parse_adr("025", SAMPLE).unwrap();
        assert_eq!(adr.status, AdrStatus::Accepted);
        assert_eq!(adr.enforcement.len(), 1);
        assert_eq!(adr.enforcement[0].adr_id, "025");
    }

    #[test]
    fn draft_adr_contributes_no_active_rules() {
        let adr = parse_adr("026", "Status: Draft\n").unwrap();
        assert!(adr.active_rules().is_empty());
    }

    #[test]
    fn rejects_a_scope_glob_that_escapes_the_root() {
        let yaml = "- type: regex\n  pattern: \"x\"\n  scope_glob: \"/etc/*\"\n  violation_message: \"m\"\n";
        let err = parse_rules("027", yaml).unwrap_err();
        assert!(matches!(err, LintError::ScopeEscapesRoot { .. }));
    }

    #[tokio::test]
    async fn run_lint_finds_a_violation_in_a_matching_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("check.py"), "ai_service = AIService()\n").unwrap();
        let adr = parse_adr("025", SAMPLE).unwrap();
        let findings = run_lint(tmp.path(), &[adr]).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Block);
    }
}
