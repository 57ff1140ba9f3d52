//! Parses a role's final structured answer (spec.md §4.9 step 5) and
//! resolves each cited reference against the project root / known ids.
//! Findings whose reference fails to resolve are dropped, never silently
//! kept, per spec.md §4.9 step 6 and the `FindingWithoutReference` kind.

use std::path::Path;

use crate::model::{Finding, Reference, Severity, Verdict};

pub struct ReferenceResolver<'a> {
    pub project_root: &'a Path,
    pub known_exception_ids: &'a [String],
}

impl<'a> ReferenceResolver<'a> {
    pub fn resolve(&self, reference: &str) -> Option<Reference> {
        let reference = reference.trim();
        if let Some(rest) = reference.strip_prefix("ADR-") {
            return self.adr_exists(rest).then(|| Reference::Adr(rest.to_string()));
        }
        if let Some(rest) = reference.strip_prefix("JRN-") {
            return self
                .journey_exists(rest)
                .then(|| Reference::Journey(rest.to_string()));
        }
        if let Some(rest) = reference.strip_prefix("EXC-") {
            return self
                .known_exception_ids
                .iter()
                .any(|id| id == rest || id == reference)
                .then(|| Reference::Exception(rest.to_string()));
        }
        if let Some((path, line)) = reference.rsplit_once(':') {
            if let Ok(line_no) = line.parse::<u32>() {
                let full = self.project_root.join(path);
                if full.exists() {
                    return Some(Reference::FileLine(path.to_string(), line_no));
                }
            }
        }
        None
    }

    fn adr_exists(&self, id: &str) -> bool {
        let dir = self.project_root.join("docs/adr");
        let exact = dir.join(format!("ADR-{id}.md"));
        if exact.is_file() {
            return true;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return false;
        };
        let prefix = format!("ADR-{id}-");
        entries.filter_map(|e| e.ok()).any(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with(&prefix)
        })
    }

    fn journey_exists(&self, id: &str) -> bool {
        self.project_root
            .join("journeys")
            .join(format!("{id}.yaml"))
            .is_file()
    }
}

#[derive(Debug, Default)]
pub struct ParsedRoleAnswer {
    pub verdict: Option<Verdict>,
    pub findings: Vec<Finding>,
    /// Count of references the role cited that failed to resolve; feeds the
    /// hallucination-rate metric.
    pub unresolved_references: usize,
}

/// Parses the `VERDICT: .. / FINDINGS: .. / REFERENCES: ..` block. Tolerant
/// of extra prose before/after -- only lines matching the schema's shape
/// are consumed.
pub fn parse_role_answer(role: &str, text: &str, resolver: &ReferenceResolver) -> ParsedRoleAnswer {
    let mut out = ParsedRoleAnswer::default();

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("VERDICT:") {
            let v = rest.trim().to_uppercase();
            out.verdict = match v.as_str() {
                "PASS" => Some(Verdict::Pass),
                "BLOCK" => Some(Verdict::Block),
                _ => None,
            };
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("- ") {
            if let Some((message, source)) = split_finding_line(rest) {
                let resolved = resolver.resolve(&source);
                match resolved {
                    Some(reference) => {
                        out.findings.push(Finding {
                            role: role.to_string(),
                            severity: Severity::Block,
                            message: message.to_string(),
                            references: vec![reference],
                            chunk_id: None,
                        });
                    }
                    None => {
                        out.unresolved_references += 1;
                    }
                }
            }
        }
    }

    if out.verdict.is_none() {
        out.verdict = Some(Verdict::NeedsInfo);
    }

    // A gatekeeper role whose only surviving content is dropped findings
    // (everything unresolved) cannot claim BLOCK on citation-free grounds.
    if out.verdict == Some(Verdict::Block) && out.findings.is_empty() {
        out.verdict = Some(Verdict::NeedsInfo);
    }

    out
}

fn split_finding_line(line: &str) -> Option<(&str, String)> {
    let open = line.rfind("(Source:")?;
    let close = line[open..].find(')')?;
    let message = line[..open].trim();
    let source = line[open + "(Source:".len()..open + close].trim().to_string();
    Some((message, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_file_line_reference_that_exists_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.rs"), "fn main() {}\n").unwrap();
        let resolver = ReferenceResolver {
            project_root: tmp.path(),
            known_exception_ids: &[],
        };
        assert!(resolver.resolve("a.rs:1").is_some());
        assert!(resolver.resolve("missing.rs:1").is_none());
    }

    #[test]
    fn parses_a_full_verdict_block_and_drops_unresolved_findings() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("check.py"), "ai_service = AIService()\n").unwrap();
        let resolver = ReferenceResolver {
            project_root: tmp.path(),
            known_exception_ids: &[],
        };
        let text = "VERDICT: BLOCK\nFINDINGS:\n- module-level instantiation (Source: check.py:1)\n- ghost issue (Source: nowhere.py:9)\nREFERENCES:\n- ADR-025: reason\n";
        let parsed = parse_role_answer("architect", text, &resolver);
        assert_eq!(parsed.verdict, Some(Verdict::Block));
        assert_eq!(parsed.findings.len(), 1);
        assert_eq!(parsed.unresolved_references, 1);
    }

    #[test]
    fn block_verdict_with_no_surviving_findings_downgrades_to_needs_info() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = ReferenceResolver {
            project_root: tmp.path(),
            known_exception_ids: &[],
        };
        let text = "VERDICT: BLOCK\nFINDINGS:\n- ghost (Source: nowhere.py:9)\n";
        let parsed = parse_role_answer("architect", text, &resolver);
        assert_eq!(parsed.verdict, Some(Verdict::NeedsInfo));
    }
}
