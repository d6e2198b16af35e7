use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

use crate::platform::{NativePlatform, Platform};

pub const LOG_FILE_NAME: &str = "flowsync.log";

/// Sends every formatted log line to stdout and, when available, appends
/// it to the sync log next to the backups.
#[derive(Clone)]
pub(crate) struct TeeMakeWriter {
    pub log_file: Option<Arc<Mutex<File>>>,
}

impl<'a> MakeWriter<'a> for TeeMakeWriter {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter {
            log_file: self.log_file.clone(),
        }
    }
}

pub(crate) struct TeeWriter {
    log_file: Option<Arc<Mutex<File>>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(file) = &self.log_file {
            let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
            let _ = file.write_all(buf); // A full disk must not silence stdout
        }
        std::io::stdout().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(file) = &self.log_file {
            let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
            let _ = file.flush();
        }
        std::io::stdout().flush()
    }
}

fn open_log_file(backup_dir: &Path) -> Option<File> {
    if !backup_dir.is_dir() {
        std::fs::create_dir_all(backup_dir).ok()?;
        NativePlatform::restrict_dir_permissions(backup_dir);
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(backup_dir.join(LOG_FILE_NAME))
        .ok()
}

/// Installs the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub(crate) fn init(backup_dir: &Path, quiet: bool) {
    let make_writer = TeeMakeWriter {
        log_file: open_log_file(backup_dir).map(|f| Arc::new(Mutex::new(f))),
    };
    let level = if quiet { Level::WARN } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
