use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tokio::signal::unix::{Signal, SignalKind, signal};

use super::Platform;

pub struct NativePlatform;

/// SIGTERM, SIGINT and SIGUSR2 listeners.
pub struct ShutdownSignals {
    term: Signal,
    int: Signal,
    usr2: Signal,
}

impl ShutdownSignals {
    /// Wait for the next delivery and return the signal's name.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.term.recv() => "SIGTERM",
            _ = self.int.recv() => "SIGINT",
            _ = self.usr2.recv() => "SIGUSR2",
        }
    }
}

impl Platform for NativePlatform {
    fn shutdown_signal_names() -> &'static [&'static str] {
        &["SIGTERM", "SIGINT", "SIGUSR2"]
    }

    fn shutdown_signals() -> std::io::Result<ShutdownSignals> {
        Ok(ShutdownSignals {
            term: signal(SignalKind::terminate())?,
            int: signal(SignalKind::interrupt())?,
            usr2: signal(SignalKind::user_defined2())?,
        })
    }

    fn restrict_dir_permissions(path: &Path) {
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700));
    }

    fn restrict_file_permissions(path: &Path) {
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
}
