use std::path::Path;

/// Platform-specific operations abstracted behind a common interface.
/// Each OS provides its own `NativePlatform` implementation so call sites
/// remain free of `#[cfg]` blocks.
pub trait Platform {
    /// Names of the signals that trigger the final export in `watch` mode.
    fn shutdown_signal_names() -> &'static [&'static str];

    /// Install listeners for every shutdown signal.
    fn shutdown_signals() -> std::io::Result<ShutdownSignals>;

    /// Set restrictive *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);

    /// Set restrictive *file* permissions (0o600 on Unix, no-op on Windows).
    /// Config snapshots carry the engine's encryption key.
    fn restrict_file_permissions(path: &Path);
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::{NativePlatform, ShutdownSignals};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::{NativePlatform, ShutdownSignals};
