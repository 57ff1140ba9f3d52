//! Built-in Council roles (spec.md §3 Role / §4.9). Each role is a named
//! governance perspective scoped to a set of path globs; the scheduler skips
//! a role entirely when none of its globs intersect the changeset.

use crate::model::{Role, RoleKind};
use warden_provider::ModelTier;

const ARCHITECT_INSTRUCTION: &str = "\
You are the Architect role on a governance council. Evaluate structural \
soundness: module boundaries, coupling, and consistency with accepted ADRs. \
You may not evaluate security, test coverage, or style -- those are other \
roles' domains.";

const SECURITY_INSTRUCTION: &str = "\
You are the Security role on a governance council. Evaluate the diff for \
injection risk, secret leakage, unsafe deserialization, and authorization \
gaps. You may not evaluate architecture, style, or test coverage -- those \
are other roles' domains.";

const QA_INSTRUCTION: &str = "\
You are the QA role on a governance council. Evaluate whether the diff has \
adequate test coverage and whether any affected journey's tests still apply. \
You may not evaluate architecture, security, or style -- those are other \
roles' domains.";

const CONSISTENCY_INSTRUCTION: &str = "\
You are the Consistency role on a governance council. Evaluate whether the \
diff follows established conventions (naming, error handling, logging) \
elsewhere in the codebase. You may not evaluate security or test coverage -- \
those are other roles' domains.";

const PERFORMANCE_INSTRUCTION: &str = "\
You are the Performance role on a governance council, running in \
consultative mode. Flag likely hot-path regressions or unbounded resource \
use; your findings are advisory and never block on their own.";

/// The default role roster convened by `panel`/`preflight` unless the config
/// narrows it. Order is irrelevant -- the scheduler fans these out in
/// parallel and aggregation re-sorts by severity, then file.
pub fn built_in_roles() -> Vec<Role> {
    vec![
        Role {
            name: "architect".to_string(),
            focus_area: "structural soundness and ADR compliance".to_string(),
            system_instruction: ARCHITECT_INSTRUCTION.to_string(),
            governance_checks: vec!["module-boundaries".to_string(), "adr-compliance".to_string()],
            relevant_paths_glob: vec!["**/*".to_string()],
            kind: RoleKind::Gatekeeper,
            model_tier: ModelTier::Advanced,
            may_delegate: true,
        },
        Role {
            name: "security".to_string(),
            focus_area: "security and secret hygiene".to_string(),
            system_instruction: SECURITY_INSTRUCTION.to_string(),
            governance_checks: vec!["injection".to_string(), "secret-leakage".to_string()],
            relevant_paths_glob: vec!["**/*".to_string()],
            kind: RoleKind::Gatekeeper,
            model_tier: ModelTier::Advanced,
            may_delegate: false,
        },
        Role {
            name: "qa".to_string(),
            focus_area: "test coverage and journey regressions".to_string(),
            system_instruction: QA_INSTRUCTION.to_string(),
            governance_checks: vec!["test-coverage".to_string(), "journey-regression".to_string()],
            relevant_paths_glob: vec!["**/*".to_string()],
            kind: RoleKind::Gatekeeper,
            model_tier: ModelTier::Standard,
            may_delegate: false,
        },
        Role {
            name: "consistency".to_string(),
            focus_area: "codebase convention consistency".to_string(),
            system_instruction: CONSISTENCY_INSTRUCTION.to_string(),
            governance_checks: vec!["naming".to_string(), "error-handling".to_string()],
            relevant_paths_glob: vec!["**/*".to_string()],
            kind: RoleKind::Gatekeeper,
            model_tier: ModelTier::Standard,
            may_delegate: false,
        },
        Role {
            name: "performance".to_string(),
            focus_area: "performance regressions".to_string(),
            system_instruction: PERFORMANCE_INSTRUCTION.to_string(),
            governance_checks: vec!["hot-path".to_string(), "resource-bounds".to_string()],
            relevant_paths_glob: vec!["**/*".to_string()],
            kind: RoleKind::Consultative,
            model_tier: ModelTier::Light,
            may_delegate: false,
        },
    ]
}

pub fn find_role<'a>(roles: &'a [Role], name: &str) -> Option<&'a Role> {
    roles.iter().find(|r| r.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_roles_cover_architect_security_qa() {
        let roles = built_in_roles();
        assert!(find_role(&roles, "architect").is_some());
        assert!(find_role(&roles, "security").is_some());
        assert!(find_role(&roles, "qa").is_some());
    }

    #[test]
    fn consultative_role_is_never_a_gatekeeper() {
        let roles = built_in_roles();
        let perf = find_role(&roles, "performance").unwrap();
        assert_eq!(perf.kind, RoleKind::Consultative);
    }
}
