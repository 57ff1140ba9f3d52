//! Merges per-role outcomes into the council's aggregate verdict (spec.md
//! §4.9 step 6): BLOCK if any gatekeeper role blocks after exception
//! suppression, findings merged and sorted by severity then file, plus the
//! citation/hallucination metrics the audit log records.

use crate::model::{Finding, Reference, RoleRun, Severity, Verdict};

pub struct RoleOutcome {
    pub role_run: RoleRun,
    pub unresolved_references: usize,
}

pub struct Aggregate {
    pub verdict: Verdict,
    /// Per-role outcomes with suppressed findings downgraded to `Info` and
    /// a role's verdict pulled back to `Pass` if suppression cleared its
    /// only blocking findings.
    pub role_runs: Vec<RoleRun>,
    /// All findings across roles, merged and sorted by severity then file,
    /// for the audit log.
    pub findings: Vec<Finding>,
    /// Roles with >=1 valid reference, over total roles (spec.md §4.9).
    pub citation_rate: f64,
    pub hallucination_rate: f64,
}

/// `is_suppressed` should consult the active exception set; findings it
/// accepts are downgraded to `Severity::Info` rather than dropped, so the
/// audit trail still shows what was waived.
pub fn aggregate(
    outcomes: Vec<RoleOutcome>,
    mut is_suppressed: impl FnMut(&Finding) -> bool,
) -> Aggregate {
    let total_roles = outcomes.len();
    let mut role_runs = Vec::with_capacity(outcomes.len());
    let mut total_findings = 0usize;
    let mut total_unresolved = 0usize;
    let mut cited_roles = 0usize;
    let mut any_block = false;

    for outcome in outcomes {
        total_unresolved += outcome.unresolved_references;
        total_findings += outcome.role_run.findings.len() + outcome.unresolved_references;
        if !outcome.role_run.findings.is_empty() {
            cited_roles += 1;
        }

        let mut role_run = outcome.role_run;
        let mut survives_block = false;

        for finding in role_run.findings.iter_mut() {
            if is_suppressed(finding) {
                finding.severity = Severity::Info;
            } else if finding.severity == Severity::Block {
                survives_block = true;
            }
        }

        if role_run.verdict == Verdict::Block && !survives_block {
            role_run.verdict = Verdict::Pass;
        }
        any_block = any_block || role_run.verdict == Verdict::Block;

        role_runs.push(role_run);
    }

    let mut findings: Vec<Finding> = role_runs
        .iter()
        .flat_map(|r| r.findings.iter().cloned())
        .collect();
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| file_of(a).cmp(file_of(b)))
    });

    // spec.md §4.9: citation rate is per-role (roles with >=1 valid
    // reference over total roles), not per-finding.
    let citation_rate = if total_roles == 0 {
        1.0
    } else {
        cited_roles as f64 / total_roles as f64
    };
    let hallucination_rate = if total_findings == 0 {
        0.0
    } else {
        total_unresolved as f64 / total_findings as f64
    };

    let verdict = if any_block { Verdict::Block } else { Verdict::Pass };

    Aggregate {
        verdict,
        role_runs,
        findings,
        citation_rate,
        hallucination_rate,
    }
}

fn file_of(f: &Finding) -> &str {
    f.references
        .iter()
        .find_map(|r| match r {
            Reference::FileLine(path, _) => Some(path.as_str()),
            _ => None,
        })
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Reference;

    fn finding(severity: Severity, file: &str) -> Finding {
        Finding {
            role: "architect".to_string(),
            severity,
            message: "m".to_string(),
            references: vec![Reference::FileLine(file.to_string(), 1)],
            chunk_id: None,
        }
    }

    #[test]
    fn one_blocking_role_blocks_the_whole_run() {
        let outcomes = vec![
            RoleOutcome {
                role_run: RoleRun {
                    role: "architect".to_string(),
                    verdict: Verdict::Block,
                    findings: vec![finding(Severity::Block, "b.rs")],
                    duration_ms: 10,
                },
                unresolved_references: 0,
            },
            RoleOutcome {
                role_run: RoleRun {
                    role: "qa".to_string(),
                    verdict: Verdict::Pass,
                    findings: vec![],
                    duration_ms: 10,
                },
                unresolved_references: 0,
            },
        ];
        let agg = aggregate(outcomes, |_| false);
        assert_eq!(agg.verdict, Verdict::Block);
        assert_eq!(agg.findings.len(), 1);
    }

    #[test]
    fn an_active_exception_downgrades_a_block_to_pass() {
        let outcomes = vec![RoleOutcome {
            role_run: RoleRun {
                role: "architect".to_string(),
                verdict: Verdict::Block,
                findings: vec![finding(Severity::Block, "b.rs")],
                duration_ms: 10,
            },
            unresolved_references: 0,
        }];
        let agg = aggregate(outcomes, |_| true);
        assert_eq!(agg.verdict, Verdict::Pass);
        assert_eq!(agg.findings[0].severity, Severity::Info);
    }

    #[test]
    fn hallucination_rate_counts_dropped_unresolved_findings() {
        let outcomes = vec![RoleOutcome {
            role_run: RoleRun {
                role: "architect".to_string(),
                verdict: Verdict::Pass,
                findings: vec![finding(Severity::Warn, "a.rs")],
                duration_ms: 10,
            },
            unresolved_references: 1,
        }];
        let agg = aggregate(outcomes, |_| false);
        assert_eq!(agg.hallucination_rate, 0.5);
        // citation_rate is per-role: this role still has one valid reference.
        assert_eq!(agg.citation_rate, 1.0);
    }

    #[test]
    fn citation_rate_is_zero_when_a_roles_only_finding_is_unresolved() {
        let outcomes = vec![RoleOutcome {
            role_run: RoleRun {
                role: "architect".to_string(),
                verdict: Verdict::Pass,
                findings: vec![],
                duration_ms: 10,
            },
            unresolved_references: 1,
        }];
        let agg = aggregate(outcomes, |_| false);
        assert_eq!(agg.citation_rate, 0.0);
    }
}
