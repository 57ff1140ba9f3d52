use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::Pattern;
use rusqlite::{params, Connection};
use serde::Deserialize;
use thiserror::Error;

const JOURNEYS_DIR: &str = "journeys";
const WARN_MATCH_THRESHOLD: usize = 100;

#[derive(Debug, Error)]
pub enum JourneyError {
    #[error("{path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("journey {journey_id}: implementation file pattern '{pattern}' resolves outside the project root")]
    PathEscape { journey_id: String, pattern: String },
}

#[derive(Debug, Default, Deserialize)]
struct JourneyFile {
    id: String,
    #[serde(default)]
    implementation: JourneyImplementation,
}

#[derive(Debug, Default, Deserialize)]
struct JourneyImplementation {
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AffectedJourney {
    pub journey_id: String,
    pub matched_files: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct JourneyIndexStats {
    pub journeys_indexed: usize,
    pub patterns_indexed: usize,
}

/// Reverse index from file pattern to journey id, keyed on `(pattern,
/// journey_id)` and persisted in the same embedded store as the codebase
/// index. Rebuilds lazily: `affected()` triggers a build on first use and a
/// rebuild whenever a journey YAML's mtime has moved past what was stored.
pub struct JourneyIndex {
    conn: std::sync::Mutex<Connection>,
    project_root: PathBuf,
}

impl JourneyIndex {
    pub fn open(project_root: &Path) -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening journey index store")?;
        conn.execute_batch(
            "CREATE TABLE journey_sources (
                path TEXT PRIMARY KEY,
                journey_id TEXT NOT NULL,
                mtime INTEGER NOT NULL
            );
            CREATE TABLE journey_patterns (
                pattern TEXT NOT NULL,
                journey_id TEXT NOT NULL,
                source_path TEXT NOT NULL
            );
            CREATE INDEX idx_patterns_journey ON journey_patterns(journey_id);",
        )?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
            project_root: project_root.to_path_buf(),
        })
    }

    /// Opens the index backed by a file on disk so rebuilds survive process
    /// restarts (the codebase index uses the equivalent `Store::open`).
    pub fn open_persistent(project_root: &Path, db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path).context("opening journey index store")?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS journey_sources (
                path TEXT PRIMARY KEY,
                journey_id TEXT NOT NULL,
                mtime INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS journey_patterns (
                pattern TEXT NOT NULL,
                journey_id TEXT NOT NULL,
                source_path TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_patterns_journey ON journey_patterns(journey_id);",
        )?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
            project_root: project_root.to_path_buf(),
        })
    }

    /// Rebuilds entries for any journey YAML whose mtime has moved past the
    /// stored value, or that isn't stored yet. Journeys removed from disk
    /// since the last build are pruned.
    pub fn build(&self) -> Result<JourneyIndexStats> {
        let journeys_dir = self.project_root.join(JOURNEYS_DIR);
        if !journeys_dir.is_dir() {
            return Ok(JourneyIndexStats::default());
        }

        let files = discover_journey_files(&journeys_dir)?;
        let conn = self.conn.lock().unwrap();

        let mut seen_paths = Vec::new();
        let mut journeys_indexed = 0usize;
        let mut patterns_indexed = 0usize;

        for path in &files {
            let rel = path
                .strip_prefix(&self.project_root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            seen_paths.push(rel.clone());

            let mtime = mtime_secs(path)?;
            let stored_mtime: Option<i64> = conn
                .query_row(
                    "SELECT mtime FROM journey_sources WHERE path = ?1",
                    params![rel],
                    |r| r.get(0),
                )
                .ok();

            if stored_mtime == Some(mtime) {
                journeys_indexed += 1;
                patterns_indexed += conn
                    .query_row(
                        "SELECT COUNT(*) FROM journey_patterns WHERE source_path = ?1",
                        params![rel],
                        |r| r.get::<_, i64>(0),
                    )
                    .unwrap_or(0) as usize;
                continue;
            }

            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading journey file {}", path.display()))?;
            let parsed: JourneyFile = serde_yaml::from_str(&content).map_err(|source| {
                JourneyError::Parse {
                    path: rel.clone(),
                    source,
                }
            })?;

            for pattern in &parsed.implementation.files {
                validate_pattern(&parsed.id, pattern)?;
            }

            conn.execute(
                "DELETE FROM journey_patterns WHERE source_path = ?1",
                params![rel],
            )?;
            conn.execute(
                "INSERT INTO journey_sources (path, journey_id, mtime) VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO UPDATE SET journey_id = ?2, mtime = ?3",
                params![rel, parsed.id, mtime],
            )?;

            for pattern in &parsed.implementation.files {
                conn.execute(
                    "INSERT INTO journey_patterns (pattern, journey_id, source_path) VALUES (?1, ?2, ?3)",
                    params![pattern, parsed.id, rel],
                )?;
                patterns_indexed += 1;

                let match_count = count_disk_matches(&self.project_root, pattern);
                if match_count > WARN_MATCH_THRESHOLD {
                    tracing::warn!(
                        journey = %parsed.id,
                        pattern = %pattern,
                        matches = match_count,
                        "journey implementation pattern matches an unusually large number of files"
                    );
                }
            }

            journeys_indexed += 1;
        }

        // Prune sources that no longer exist on disk.
        let stored: Vec<String> = {
            let mut stmt = conn.prepare("SELECT path FROM journey_sources")?;
            stmt.query_map([], |r| r.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .collect()
        };
        for path in stored {
            if !seen_paths.contains(&path) {
                conn.execute(
                    "DELETE FROM journey_sources WHERE path = ?1",
                    params![path],
                )?;
                conn.execute(
                    "DELETE FROM journey_patterns WHERE source_path = ?1",
                    params![path],
                )?;
            }
        }

        Ok(JourneyIndexStats {
            journeys_indexed,
            patterns_indexed,
        })
    }

    /// `affected(changeset)`: for each changed file, match against every
    /// stored pattern (glob first, then exact filename), deduplicated by
    /// journey id.
    pub fn affected(&self, changeset: &[String]) -> Result<Vec<AffectedJourney>> {
        self.build()?;

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT pattern, journey_id FROM journey_patterns")?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .filter_map(|r| r.ok())
            .collect();

        let mut by_journey: std::collections::HashMap<String, Vec<String>> =
            std::collections::HashMap::new();

        for changed in changeset {
            for (pattern, journey_id) in &rows {
                if matches_entry(pattern, changed) {
                    let files = by_journey.entry(journey_id.clone()).or_default();
                    if !files.contains(changed) {
                        files.push(changed.clone());
                    }
                }
            }
        }

        let mut result: Vec<AffectedJourney> = by_journey
            .into_iter()
            .map(|(journey_id, matched_files)| AffectedJourney {
                journey_id,
                matched_files,
            })
            .collect();
        result.sort_by(|a, b| a.journey_id.cmp(&b.journey_id));
        Ok(result)
    }
}

fn matches_entry(pattern: &str, changed_file: &str) -> bool {
    if let Ok(glob_pattern) = Pattern::new(pattern) {
        if glob_pattern.matches(changed_file) {
            return true;
        }
    }
    let pattern_basename = Path::new(pattern).file_name().and_then(|n| n.to_str());
    let changed_basename = Path::new(changed_file).file_name().and_then(|n| n.to_str());
    matches!((pattern_basename, changed_basename), (Some(a), Some(b)) if a == b)
}

fn validate_pattern(journey_id: &str, pattern: &str) -> Result<(), JourneyError> {
    if Path::new(pattern).is_absolute() || pattern.split('/').any(|seg| seg == "..") {
        return Err(JourneyError::PathEscape {
            journey_id: journey_id.to_string(),
            pattern: pattern.to_string(),
        });
    }
    Ok(())
}

fn count_disk_matches(project_root: &Path, pattern: &str) -> usize {
    let abs_pattern = project_root.join(pattern);
    match glob::glob(&abs_pattern.to_string_lossy()) {
        Ok(paths) => paths.filter_map(|p| p.ok()).count(),
        Err(_) => 0,
    }
}

fn mtime_secs(path: &Path) -> Result<i64> {
    let meta = std::fs::metadata(path)?;
    let modified = meta.modified()?;
    let secs = modified
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(secs)
}

fn discover_journey_files(journeys_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk(journeys_dir, &mut out);
    out.sort();
    Ok(out)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, out);
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        ) {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_journey(dir: &Path, name: &str, id: &str, files: &[&str]) {
        let files_yaml = files
            .iter()
            .map(|f| format!("    - \"{f}\""))
            .collect::<Vec<_>>()
            .join("\n");
        let content = format!(
            "id: {id}\ntitle: test journey\nactor: user\nsteps: []\nimplementation:\n  files:\n{files_yaml}\n"
        );
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn glob_pattern_matches_changed_file() {
        let tmp = tempfile::tempdir().unwrap();
        let journeys = tmp.path().join(JOURNEYS_DIR);
        fs::create_dir_all(&journeys).unwrap();
        write_journey(&journeys, "checkout.yaml", "JRN-001", &["src/checkout/*.rs"]);

        let index = JourneyIndex::open(tmp.path()).unwrap();
        let affected = index
            .affected(&["src/checkout/cart.rs".to_string()])
            .unwrap();
        assert_eq!(affected.len(), 1);
        assert_eq!(affected[0].journey_id, "JRN-001");
    }

    #[test]
    fn bare_filename_falls_back_to_exact_match() {
        let tmp = tempfile::tempdir().unwrap();
        let journeys = tmp.path().join(JOURNEYS_DIR);
        fs::create_dir_all(&journeys).unwrap();
        write_journey(&journeys, "notes.yaml", "JRN-044", &["docs/notes.md"]);

        let index = JourneyIndex::open(tmp.path()).unwrap();
        let affected = index.affected(&["docs/notes.md".to_string()]).unwrap();
        assert_eq!(affected.len(), 1);
        assert_eq!(affected[0].journey_id, "JRN-044");
    }

    #[test]
    fn unrelated_file_is_not_affected() {
        let tmp = tempfile::tempdir().unwrap();
        let journeys = tmp.path().join(JOURNEYS_DIR);
        fs::create_dir_all(&journeys).unwrap();
        write_journey(&journeys, "checkout.yaml", "JRN-001", &["src/checkout/*.rs"]);

        let index = JourneyIndex::open(tmp.path()).unwrap();
        let affected = index
            .affected(&["src/unrelated/module.rs".to_string()])
            .unwrap();
        assert!(affected.is_empty());
    }

    #[test]
    fn rejects_patterns_escaping_project_root() {
        let journey_id = "JRN-999";
        let err = validate_pattern(journey_id, "../outside/file.rs").unwrap_err();
        assert!(matches!(err, JourneyError::PathEscape { .. }));
    }
}
