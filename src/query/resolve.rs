//! Turns playbook steps into ready-to-run queries.

use std::path::Path;

use tracing::debug;

use super::ReadyQuery;
use crate::config::Step;
use crate::error::{Result, RunnerError};

/// A query plus how its output should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedQuery {
    pub query: ReadyQuery,
    pub capture_output: bool,
}

/// A step whose SQL files have all been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyStep {
    pub name: String,
    pub queries: Vec<PlannedQuery>,
}

/// Reads every query's SQL file relative to `sql_root`.
///
/// When `from_step` is given, steps before it are dropped; naming a step the
/// playbook does not have is an error.
pub async fn resolve_steps(
    steps: &[Step],
    sql_root: &Path,
    from_step: Option<&str>,
) -> Result<Vec<ReadyStep>> {
    let start = match from_step {
        Some(name) => steps
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| RunnerError::config(format!("Step '{name}' not found in playbook")))?,
        None => 0,
    };

    let mut ready = Vec::with_capacity(steps.len() - start);
    for step in &steps[start..] {
        let mut queries = Vec::with_capacity(step.queries.len());
        for entry in &step.queries {
            let path = sql_root.join(&entry.file);
            debug!("Reading {} for query '{}'", path.display(), entry.name);

            let script = tokio::fs::read_to_string(&path).await.map_err(|e| {
                RunnerError::config(format!("Failed to read SQL file {}: {e}", path.display()))
            })?;

            queries.push(PlannedQuery {
                query: ReadyQuery::new(&entry.name, script, path.display().to_string()),
                capture_output: entry.output,
            });
        }
        ready.push(ReadyStep {
            name: step.name.clone(),
            queries,
        });
    }

    Ok(ready)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;

    fn step(name: &str, files: &[(&str, bool)]) -> Step {
        Step {
            name: name.to_string(),
            queries: files
                .iter()
                .map(|(file, output)| QueryConfig {
                    name: file.trim_end_matches(".sql").to_string(),
                    file: file.to_string(),
                    output: *output,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_resolve_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.sql"), "SELECT 1;").unwrap();
        std::fs::write(dir.path().join("b.sql"), "UPDATE t SET x = 1;").unwrap();

        let steps = vec![step("one", &[("a.sql", true)]), step("two", &[("b.sql", false)])];
        let ready = resolve_steps(&steps, dir.path(), None).await.unwrap();

        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].name, "one");
        assert_eq!(ready[0].queries[0].query.script, "SELECT 1;");
        assert_eq!(ready[0].queries[0].query.name, "a");
        assert!(ready[0].queries[0].capture_output);
        assert!(ready[0].queries[0].query.path.ends_with("a.sql"));
        assert!(!ready[1].queries[0].capture_output);
    }

    #[tokio::test]
    async fn test_resolve_from_step() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.sql"), "SELECT 2;").unwrap();

        // a.sql does not exist, so skipping its step must avoid reading it.
        let steps = vec![step("one", &[("a.sql", false)]), step("two", &[("b.sql", false)])];
        let ready = resolve_steps(&steps, dir.path(), Some("two")).await.unwrap();

        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].name, "two");
    }

    #[tokio::test]
    async fn test_resolve_unknown_step() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_steps(&[], dir.path(), Some("missing"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Step 'missing' not found"));
    }

    #[tokio::test]
    async fn test_resolve_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let steps = vec![step("one", &[("nope.sql", false)])];
        let err = resolve_steps(&steps, dir.path(), None).await.unwrap_err();
        assert!(matches!(err, RunnerError::Config(_)));
        assert!(err.to_string().contains("nope.sql"));
    }
}
