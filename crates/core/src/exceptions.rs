//! Exception Resolver (spec.md §4.11): loads accepted EXC records and
//! decides whether a finding is suppressed by one of them.

use crate::model::{ExceptionRecord, ExceptionStatus, Finding, Reference};

#[derive(Debug, Default)]
pub struct ExceptionSet {
    records: Vec<ExceptionRecord>,
}

impl ExceptionSet {
    pub fn new(records: Vec<ExceptionRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .filter(|r| r.status == ExceptionStatus::Accepted)
                .collect(),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    /// `finding.references ∋ exc.rule_reference AND finding.file ∈
    /// exc.affected_files_glob`. A finding with no file-bearing reference
    /// can still be suppressed on rule match alone -- it has nothing for
    /// the file glob to exclude it on.
    pub fn suppress(&self, finding: &Finding) -> bool {
        self.suppressing_exception(finding).is_some()
    }

    /// The id of the accepted exception that suppresses `finding`, if any --
    /// this is what the audit log's suppression event names.
    pub fn suppressing_exception(&self, finding: &Finding) -> Option<&str> {
        self.records
            .iter()
            .find(|exc| self.matches(exc, finding))
            .map(|exc| exc.id.as_str())
    }

    fn matches(&self, exc: &ExceptionRecord, finding: &Finding) -> bool {
        let rule_matches = finding.references.iter().any(|r| reference_matches_rule(r, &exc.rule_reference));
        if !rule_matches {
            return false;
        }

        let files: Vec<&str> = finding
            .references
            .iter()
            .filter_map(|r| r.file())
            .collect();
        if files.is_empty() {
            return true;
        }

        files.iter().any(|f| {
            exc.affected_files_glob
                .iter()
                .any(|pattern| glob_match(pattern, f))
        })
    }
}

fn reference_matches_rule(reference: &Reference, rule_reference: &str) -> bool {
    let normalized = rule_reference.trim_start_matches("ADR-");
    match reference {
        Reference::Adr(id) => id == normalized || id == rule_reference,
        _ => false,
    }
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(candidate))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;

    fn exc(id: &str, rule_reference: &str, globs: &[&str]) -> ExceptionRecord {
        ExceptionRecord {
            id: id.to_string(),
            status: ExceptionStatus::Accepted,
            rule_reference: rule_reference.to_string(),
            affected_files_glob: globs.iter().map(|s| s.to_string()).collect(),
            justification: "approved".to_string(),
            conditions: vec![],
        }
    }

    fn finding(adr_id: &str, file: &str) -> Finding {
        Finding {
            role: "adr-lint".to_string(),
            severity: Severity::Block,
            message: "m".to_string(),
            references: vec![Reference::Adr(adr_id.to_string()), Reference::FileLine(file.to_string(), 1)],
            chunk_id: None,
        }
    }

    #[test]
    fn suppresses_a_finding_matching_rule_and_file_glob() {
        let set = ExceptionSet::new(vec![exc("EXC-1", "ADR-025", &["legacy/**/*.py"])]);
        assert!(set.suppress(&finding("025", "legacy/old.py")));
        assert!(!set.suppress(&finding("025", "src/new.py")));
    }

    #[test]
    fn retired_exceptions_never_suppress() {
        let mut retired = exc("EXC-2", "ADR-025", &["**/*.py"]);
        retired.status = ExceptionStatus::Retired;
        let set = ExceptionSet::new(vec![retired]);
        assert!(!set.suppress(&finding("025", "src/new.py")));
    }
}
