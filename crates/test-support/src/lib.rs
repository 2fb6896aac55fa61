use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Temporary directory holding a file-backed sqlite database for tests that
/// exercise a real connection pool. Dropped with the guard.
pub struct TempDb {
    dir: TempDir,
}

impl TempDb {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("db.sqlite")
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path().to_string_lossy())
    }
}
