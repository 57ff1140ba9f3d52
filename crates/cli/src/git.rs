//! Git is an external collaborator (spec.md §1): this module only turns its
//! plain-text output into the typed `Changeset` the core consumes. No other
//! part of the workspace shells out to a subprocess.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use warden_core::model::{Changeset, DiffHunk};

/// Diffs `base_ref` against the working tree and turns the result into a
/// `Changeset`. `head_ref` is left empty so the council labels it
/// `working-tree`, matching an uncommitted preflight run.
pub fn compute_changeset(project_root: &Path, base_ref: &str) -> Result<Changeset> {
    let name_only = run_git(project_root, &["diff", "--name-only", base_ref])?;
    let files: Vec<String> = name_only
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    let diff_text = run_git(project_root, &["diff", "--unified=3", base_ref])?;
    let diff_hunks = parse_unified_diff(&diff_text);

    Ok(Changeset {
        files,
        base_ref: base_ref.to_string(),
        head_ref: String::new(),
        diff_hunks,
    })
}

fn run_git(project_root: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(project_root)
        .args(args)
        .output()
        .context("invoking git")?;
    if !output.status.success() {
        bail!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// One `DiffHunk` per `@@ ... @@` block in a unified diff. A hunk never
/// spans two files -- the file-header line always precedes its hunks.
fn parse_unified_diff(text: &str) -> Vec<DiffHunk> {
    let mut hunks = Vec::new();
    let mut current_file = String::new();
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.next() {
        if let Some(rest) = line.strip_prefix("+++ b/") {
            current_file = rest.to_string();
            continue;
        }
        if line.starts_with("@@") {
            let (start_line, line_count) = parse_hunk_header(line);
            let mut body = String::new();
            while let Some(next) = lines.peek() {
                if next.starts_with("@@") || next.starts_with("diff --git") {
                    break;
                }
                body.push_str(lines.next().unwrap());
                body.push('\n');
            }
            hunks.push(DiffHunk {
                file: current_file.clone(),
                start_line,
                line_count,
                text: body,
            });
        }
    }
    hunks
}

/// `@@ -a,b +c,d @@ ...` -> the new-side `(start, count)`.
fn parse_hunk_header(line: &str) -> (u32, u32) {
    let new_side = line
        .split('+')
        .nth(1)
        .and_then(|s| s.split(' ').next())
        .unwrap_or("1,0");
    let mut parts = new_side.splitn(2, ',');
    let start = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1);
    let count = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    (start, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_hunk_header() {
        let (start, count) = parse_hunk_header("@@ -10,5 +12,7 @@ fn main() {");
        assert_eq!(start, 12);
        assert_eq!(count, 7);
    }

    #[test]
    fn parses_hunks_across_two_files() {
        let diff = "\
diff --git a/src/a.rs b/src/a.rs
--- a/src/a.rs
+++ b/src/a.rs
@@ -1,2 +1,3 @@
 fn a() {}
+// new
diff --git a/src/b.rs b/src/b.rs
--- a/src/b.rs
+++ b/src/b.rs
@@ -5,1 +5,1 @@
-old
+new
";
        let hunks = parse_unified_diff(diff);
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].file, "src/a.rs");
        assert_eq!(hunks[1].file, "src/b.rs");
        assert_eq!(hunks[1].start_line, 5);
    }
}
