//! Per-role system prompt assembly (spec.md §4.9 step 2-3): role identity,
//! scoped focus area, the "may not evaluate other domains" boundary, and a
//! compact list of reference IDs -- never full ADR/journey bodies, which are
//! retrieved on demand through the tool registry.

use crate::model::{Role, RoleKind};

/// Builds the system instruction handed to a role's first turn. `reference_ids`
/// is the compact `ADR-n`/`JRN-n`/`EXC-n` id list injected per spec.md §4.9.3;
/// bodies are fetched via `read_adr`/`read_journey` if the role needs them.
pub fn build_role_prompt(role: &Role, other_roles: &[String], reference_ids: &[String]) -> String {
    let schema = match role.kind {
        RoleKind::Gatekeeper => {
            "Respond in exactly this schema once you have reached a conclusion:\n\
             VERDICT: PASS | BLOCK\n\
             FINDINGS:\n\
             - <text> (Source: <path|ADR-id|JRN-id>)\n\
             REFERENCES:\n\
             - ADR-N: reason\n\
             Every BLOCK finding must cite a source that resolves on disk. \
             A finding without a resolvable citation will be dropped."
        }
        RoleKind::Consultative => {
            "Offer free-form advice. Citations are encouraged but not required."
        }
    };

    let others = if other_roles.is_empty() {
        String::new()
    } else {
        format!(
            "\n\nYou may not evaluate domains owned by other roles: {}.",
            other_roles.join(", ")
        )
    };

    let refs = if reference_ids.is_empty() {
        String::new()
    } else {
        format!(
            "\n\nKnown reference ids for this changeset: {}. Fetch bodies with \
             read_adr/read_journey/read_file as needed; do not assume their content.",
            reference_ids.join(", ")
        )
    };

    format!(
        "{instruction}\n\nFocus area: {focus}.{others}{refs}\n\n{schema}",
        instruction = role.system_instruction,
        focus = role.focus_area,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoleKind;
    use warden_provider::ModelTier;

    fn sample_role() -> Role {
        Role {
            name: "architect".to_string(),
            focus_area: "structure".to_string(),
            system_instruction: "You are the Architect.".to_string(),
            governance_checks: vec![],
            relevant_paths_glob: vec!["**/*".to_string()],
            kind: RoleKind::Gatekeeper,
            model_tier: ModelTier::Advanced,
            may_delegate: false,
        }
    }

    #[test]
    fn gatekeeper_prompt_requires_the_verdict_schema() {
        let prompt = build_role_prompt(&sample_role(), &["security".to_string()], &["ADR-025".to_string()]);
        assert!(prompt.contains("VERDICT: PASS | BLOCK"));
        assert!(prompt.contains("ADR-025"));
        assert!(prompt.contains("security"));
    }
}
