//! Changeset chunking (spec.md §4.9 Chunking). Git invocation itself is an
//! external collaborator (spec.md §1); this module only splits an already
//! computed `Changeset` into model-budget-sized chunks without ever
//! breaking a hunk across chunk boundaries.

use crate::model::{Changeset, DiffHunk};

/// One chunk handed to a single role review: a contiguous run of hunks that
/// fits the active model's effective input budget.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub hunks: Vec<DiffHunk>,
}

/// Walks hunks in order, packing each into the current chunk until the next
/// one would overflow `budget_tokens`, then starts a new chunk. A hunk is
/// never split across two chunks. `estimate_tokens` is the caller's
/// tokenizer (delegates to the provider's when available, per the Token
/// Manager's own fallback rule).
pub fn chunk_changeset(
    changeset: &Changeset,
    budget_tokens: usize,
    estimate_tokens: impl Fn(&str) -> usize,
) -> Vec<Chunk> {
    if changeset.diff_hunks.is_empty() {
        return Vec::new();
    }

    let total: usize = changeset
        .diff_hunks
        .iter()
        .map(|h| estimate_tokens(&h.text))
        .sum();
    if total <= budget_tokens {
        return vec![Chunk {
            id: "chunk-0".to_string(),
            hunks: changeset.diff_hunks.clone(),
        }];
    }

    let mut chunks = Vec::new();
    let mut current: Vec<DiffHunk> = Vec::new();
    let mut current_tokens = 0usize;

    for hunk in &changeset.diff_hunks {
        let hunk_tokens = estimate_tokens(&hunk.text);
        let would_overflow = current_tokens + hunk_tokens > budget_tokens && !current.is_empty();

        if would_overflow {
            chunks.push(Chunk {
                id: format!("chunk-{}", chunks.len()),
                hunks: std::mem::take(&mut current),
            });
            current_tokens = 0;
        }

        current_tokens += hunk_tokens;
        current.push(hunk.clone());
    }

    if !current.is_empty() {
        chunks.push(Chunk {
            id: format!("chunk-{}", chunks.len()),
            hunks: current,
        });
    }

    chunks
}

/// Dedup key for findings aggregated across chunks reviewed by the same role.
pub fn dedup_key(rule_ref: &str, file: &str, line: u32) -> (String, String, u32) {
    (rule_ref.to_string(), file.to_string(), line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hunk(file: &str, text: &str) -> DiffHunk {
        DiffHunk {
            file: file.to_string(),
            start_line: 1,
            line_count: 1,
            text: text.to_string(),
        }
    }

    #[test]
    fn small_changeset_is_one_chunk() {
        let cs = Changeset {
            files: vec!["a.rs".into()],
            base_ref: "main".into(),
            head_ref: "HEAD".into(),
            diff_hunks: vec![hunk("a.rs", "short")],
        };
        let chunks = chunk_changeset(&cs, 1000, |s| s.len());
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn oversized_changeset_splits_without_breaking_a_hunk() {
        let cs = Changeset {
            files: vec!["a.rs".into(), "b.rs".into()],
            base_ref: "main".into(),
            head_ref: "HEAD".into(),
            diff_hunks: vec![
                hunk("a.rs", &"x".repeat(60)),
                hunk("a.rs", &"x".repeat(60)),
                hunk("b.rs", &"x".repeat(60)),
            ],
        };
        let chunks = chunk_changeset(&cs, 100, |s| s.len());
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            for hunk in &chunk.hunks {
                assert!(hunk.text.len() <= 100 || chunk.hunks.len() == 1);
            }
        }
    }
}
