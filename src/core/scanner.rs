use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::core::config::ENGINE_CONFIG_FILE;
use crate::core::document::{DocumentKind, DocumentRecord};

pub const DOCUMENT_EXTENSION: &str = "json";

#[derive(Debug, Default)]
pub struct ScanReport {
    pub records: Vec<DocumentRecord>,
    /// Candidate files that could not be read or parsed.
    pub skipped: Vec<PathBuf>,
}

/// Configuration is known by location only: the engine config file sits at
/// a fixed path directly under the document root. Everything else falls
/// through to `classify`.
pub fn classify_path(root: &Path, path: &Path) -> Option<DocumentKind> {
    (path == root.join(ENGINE_CONFIG_FILE)).then_some(DocumentKind::Configuration)
}

/// Workflows are recognized purely by shape (a top-level `nodes` or
/// `connections` key); the format carries no schema version to go by.
pub fn classify(value: &Value) -> DocumentKind {
    match value.as_object() {
        Some(obj) if obj.contains_key("nodes") || obj.contains_key("connections") => {
            DocumentKind::Workflow
        }
        _ => DocumentKind::Unrecognized,
    }
}

fn is_candidate(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
}

/// Walks `root` and returns every workflow document it can parse.
///
/// Never fails: unreadable directories and malformed files are logged and
/// the walk carries on. Entries are visited in name order so the result
/// (and therefore remote write order) is deterministic.
pub async fn scan(root: &Path) -> ScanReport {
    let mut report = ScanReport::default();

    if !root.is_dir() {
        warn!("Document directory {} does not exist; nothing to scan", root.display());
        return report;
    }

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = match read_sorted(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                continue;
            }
        };

        let mut subdirs = Vec::new();
        for (path, is_dir) in entries.drain(..) {
            if is_dir {
                subdirs.push(path);
            } else if classify_path(root, &path).is_some() {
                debug!("Ignoring {}: configuration is collected by path", path.display());
            } else if is_candidate(&path) {
                inspect_file(&path, &mut report).await;
            }
        }
        // Reverse so the stack pops subdirectories in name order.
        pending.extend(subdirs.into_iter().rev());
    }

    debug!(
        records = report.records.len(),
        skipped = report.skipped.len(),
        "Scan of {} finished",
        root.display()
    );
    report
}

async fn read_sorted(dir: &Path) -> std::io::Result<Vec<(PathBuf, bool)>> {
    let mut out = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        out.push((entry.path(), is_dir));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

async fn inspect_file(path: &Path, report: &mut ScanReport) {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            warn!("Skipping {}: unreadable ({})", path.display(), e);
            report.skipped.push(path.to_path_buf());
            return;
        }
    };

    let value: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            warn!("Skipping {}: invalid JSON ({})", path.display(), e);
            report.skipped.push(path.to_path_buf());
            return;
        }
    };

    match classify(&value) {
        DocumentKind::Workflow => {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            report.records.push(DocumentRecord {
                name,
                data: value,
                source_path: path.to_path_buf(),
                captured_at: Utc::now(),
            });
        }
        DocumentKind::Configuration | DocumentKind::Unrecognized => {
            debug!("Ignoring {}: not a workflow document", path.display())
        }
    }
}
