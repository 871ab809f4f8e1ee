//! Apply `*.up.sql` files to a fresh test database.
//!
//! Files run in lexicographic order, so number them:
//!
//! ```text
//! 001_create_users.up.sql
//! 002_create_posts.up.sql
//! 003_create_comments.up.sql
//! ```
//!
//! Nothing records which files have run; this is for initializing throwaway
//! databases, not for managing a long-lived schema.

use std::path::{Path, PathBuf};

use crate::db::SqlExecutor;
use crate::error::MigrationError;

/// Sorted list of `*.up.sql` files directly inside `dir`.
pub fn migration_files(dir: &Path) -> Result<Vec<PathBuf>, MigrationError> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{}/*.up.sql", escaped.trim_end_matches('/'));

    let paths = glob::glob(&pattern).map_err(|e| MigrationError::Pattern {
        pattern: pattern.clone(),
        reason: e.to_string(),
    })?;

    let mut files = paths.collect::<Result<Vec<_>, _>>()?;
    files.sort();
    Ok(files)
}

/// Execute every `*.up.sql` file in `dir`, in order, stopping at the first
/// failure. Returns the files that were applied.
pub async fn run_migrations(
    db: &dyn SqlExecutor,
    dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>, MigrationError> {
    let files = migration_files(dir.as_ref())?;

    for path in &files {
        let sql = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| MigrationError::Read {
                path: path.clone(),
                source,
            })?;

        db.batch_execute(&sql)
            .await
            .map_err(|source| MigrationError::Exec {
                path: path.clone(),
                source,
            })?;

        tracing::info!(file = %path.display(), "Applied migration");
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::testing::RecordingExecutor;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[tokio::test]
    async fn test_runs_up_files_in_lexicographic_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "002_posts.up.sql", "CREATE TABLE posts ();");
        write(dir.path(), "001_users.up.sql", "CREATE TABLE users ();");
        write(dir.path(), "010_tags.up.sql", "CREATE TABLE tags ();");
        write(dir.path(), "001_users.down.sql", "DROP TABLE users;");
        write(dir.path(), "README.md", "not sql");

        let db = RecordingExecutor::default();
        let applied = run_migrations(&db, dir.path()).await.unwrap();

        let names: Vec<_> = applied
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["001_users.up.sql", "002_posts.up.sql", "010_tags.up.sql"]
        );

        let sql: Vec<_> = db.statements().into_iter().map(|s| s.sql).collect();
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE users ();",
                "CREATE TABLE posts ();",
                "CREATE TABLE tags ();",
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_dir_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let db = RecordingExecutor::default();
        let applied = run_migrations(&db, dir.path()).await.unwrap();
        assert!(applied.is_empty());
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_a.up.sql", "SELECT 1;");
        write(dir.path(), "002_b.up.sql", "oops;");
        write(dir.path(), "003_c.up.sql", "SELECT 3;");

        let db = RecordingExecutor::failing_at(1);
        let err = run_migrations(&db, dir.path()).await.unwrap_err();

        match err {
            MigrationError::Exec { path, .. } => assert!(path.ends_with("002_b.up.sql")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(db.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_dir_with_glob_characters() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("schema[v1]");
        fs::create_dir(&dir).unwrap();
        write(&dir, "001_init.up.sql", "SELECT 1;");

        let files = migration_files(&dir).unwrap();
        assert_eq!(files.len(), 1);
    }
}
