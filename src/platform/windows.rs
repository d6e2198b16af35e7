use std::path::Path;

use super::Platform;

pub struct NativePlatform;

/// Windows has no SIGTERM/SIGUSR2; Ctrl-C is the only shutdown trigger.
pub struct ShutdownSignals {
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl ShutdownSignals {
    pub async fn recv(&mut self) -> &'static str {
        self.ctrl_c.recv().await;
        "CTRL_C"
    }
}

impl Platform for NativePlatform {
    fn shutdown_signal_names() -> &'static [&'static str] {
        &["CTRL_C"]
    }

    fn shutdown_signals() -> std::io::Result<ShutdownSignals> {
        Ok(ShutdownSignals {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    fn restrict_dir_permissions(_path: &Path) {
        // Windows uses ACLs; no simple equivalent to Unix mode bits.
    }

    fn restrict_file_permissions(_path: &Path) {
        // Windows uses ACLs; no simple equivalent to Unix mode bits.
    }
}
