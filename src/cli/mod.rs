mod export;
mod import;
mod watch;

use anyhow::{Context, Result, bail};
use console::style;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::config::{
    CONFIG_FILE_NAME, DATABASE_URL_ENV, EnvSource, FileConfig, HOME_ENV, ProcessEnv,
    REST_URL_ENV, SERVICE_KEY_ENV, SyncConfig,
};
use crate::core::terminal::{GuideSection, print_error};

fn print_help() {
    GuideSection::new("Sync")
        .command("export", "Scan the document tree, push it and write backups")
        .command("import", "Restore the document tree from the remote store")
        .command("watch", "Wait for a shutdown signal, then export and exit")
        .command("help", "Show this help")
        .print();

    GuideSection::new("Options")
        .command("--base-dir <path>", "Directory holding n8n-config/ and backups/")
        .command("--quiet", "Only log warnings and errors")
        .print();

    GuideSection::new("Environment")
        .command(DATABASE_URL_ENV, "Postgres connection string of the Supabase project")
        .command(SERVICE_KEY_ENV, "Service key sent with every request")
        .command(REST_URL_ENV, "Explicit REST endpoint, overrides the derived one")
        .command(HOME_ENV, "Default for --base-dir")
        .blank()
        .info(&format!(
            "Optional settings are read from <base-dir>/{}",
            CONFIG_FILE_NAME
        ))
        .print();

    println!(
        "\n {} {} [options] <command>\n",
        style("Usage:").bold(),
        style("flowsync").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GlobalFlags {
    pub command: Option<String>,
    pub base_dir: PathBuf,
    pub quiet: bool,
}

/// Flags may appear before or after the command. The base directory falls
/// back to `FLOWSYNC_HOME`, then to `cwd`.
pub(crate) fn parse_global_flags(
    args: &[String],
    start: usize,
    env: &dyn EnvSource,
    cwd: &Path,
) -> Result<GlobalFlags> {
    let mut command = None;
    let mut base_dir = None;
    let mut quiet = false;
    let mut help = false;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--base-dir" | "-d" => {
                if i + 1 < args.len() {
                    base_dir = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    bail!("--base-dir requires a path");
                }
            }
            "--quiet" | "-q" => {
                quiet = true;
                i += 1;
            }
            "--help" | "-h" => {
                help = true;
                i += 1;
            }
            other => {
                if command.is_none() {
                    command = Some(other.to_string());
                }
                i += 1;
            }
        }
    }

    // `-h` wins over any command next to it
    if help {
        command = Some("help".to_string());
    }

    let base_dir = base_dir
        .or_else(|| env.var(HOME_ENV).map(PathBuf::from))
        .unwrap_or_else(|| cwd.to_path_buf());
    let base_dir = if base_dir.is_absolute() {
        base_dir
    } else {
        cwd.join(base_dir)
    };

    Ok(GlobalFlags {
        command,
        base_dir,
        quiet,
    })
}

/// Loads `flowsync.toml`, starts logging next to the backups, then resolves
/// the remote settings. A broken config file is reported and ignored.
fn load_config(flags: &GlobalFlags) -> SyncConfig {
    let (file, file_error) = match FileConfig::load(&flags.base_dir) {
        Ok(file) => (file, None),
        Err(e) => (FileConfig::default(), Some(e)),
    };

    crate::logging::init(&file.backup_path(&flags.base_dir), flags.quiet);
    if let Some(e) = file_error {
        warn!("Ignoring {}: {:#}", CONFIG_FILE_NAME, e);
    }

    SyncConfig::resolve(&flags.base_dir, file, &ProcessEnv)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let flags = parse_global_flags(&args, 1, &ProcessEnv, &cwd)?;

    let Some(cmd) = flags.command.as_deref() else {
        print_help();
        return Ok(());
    };

    match cmd {
        "export" => export::run_export(&load_config(&flags)).await,
        "import" => import::run_import(&load_config(&flags)).await,
        "watch" => watch::run_watch(&load_config(&flags)).await,
        "help" => {
            print_help();
            Ok(())
        }
        _ => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(())
        }
    }
}
