use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::platform::{NativePlatform, Platform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotCategory {
    Workflows,
    Config,
}

impl SnapshotCategory {
    pub fn prefix(self) -> &'static str {
        match self {
            SnapshotCategory::Workflows => "workflows",
            SnapshotCategory::Config => "config",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub archive: PathBuf,
    pub stable: PathBuf,
}

/// `2026-10-16T08:15:30.123Z` becomes `2026-10-16T08-15-30-123Z`.
pub fn filename_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// Timestamped archives plus one stable file per category, all in one
/// directory. The stable file always holds the latest export.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        // Fails with "file exists" when a non-directory holds the path.
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        NativePlatform::restrict_dir_permissions(&self.dir);
        info!("Created backup directory {}", self.dir.display());
        Ok(())
    }

    pub fn stable_path(&self, category: SnapshotCategory) -> PathBuf {
        self.dir.join(format!("{}_backup.json", category.prefix()))
    }

    fn archive_path(&self, category: SnapshotCategory, at: DateTime<Utc>) -> PathBuf {
        let stem = format!("{}_backup_{}", category.prefix(), filename_timestamp(at));
        let mut path = self.dir.join(format!("{}.json", stem));
        // Two runs inside the same millisecond must not share an archive.
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{}-{}.json", stem, n));
            n += 1;
        }
        path
    }

    /// Writes `body` to a new archive file and replaces the stable file with
    /// identical bytes.
    pub async fn write(
        &self,
        category: SnapshotCategory,
        body: &Value,
        at: DateTime<Utc>,
    ) -> Result<SnapshotPaths> {
        let bytes = serde_json::to_vec_pretty(body)?;

        let archive = self.archive_path(category, at);
        fs::write(&archive, &bytes)
            .await
            .with_context(|| format!("failed to write {}", archive.display()))?;

        let stable = self.stable_path(category);
        let staging = stable.with_extension("json.tmp");
        fs::write(&staging, &bytes)
            .await
            .with_context(|| format!("failed to write {}", staging.display()))?;
        fs::rename(&staging, &stable)
            .await
            .with_context(|| format!("failed to replace {}", stable.display()))?;

        if category == SnapshotCategory::Config {
            NativePlatform::restrict_file_permissions(&archive);
            NativePlatform::restrict_file_permissions(&stable);
        }

        Ok(SnapshotPaths { archive, stable })
    }

    /// Parsed stable file, or `None` when the category was never exported.
    pub async fn read_stable(&self, category: SnapshotCategory) -> Result<Option<Value>> {
        let path = self.stable_path(category);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(value))
    }
}
