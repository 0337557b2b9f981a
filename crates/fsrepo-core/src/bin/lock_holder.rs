//! Holds the bulk lock of a repository until stdin closes.
//!
//! Used by the cross-process tests to play "another worker process running
//! store-all". Prints `locked <name>` once the lock is held, or
//! `busy <name>` (exit code 3) if it could not be taken within five seconds.
//!
//! Usage:
//!   lock_holder <manifest.toml>

use fsrepo_core::{GlobalLock, BULK_LOCK_PURPOSE};
use fsrepo_schema::{ConfigurationSource, ManifestFile};
use fsrepo_store::RepositoryLayout;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

const EXIT_USAGE: u8 = 2;
const EXIT_BUSY: u8 = 3;
/// Filter used when `FSREPO_LOG` is unset.
const DEFAULT_LOG_LEVEL: &str = "info";

fn run(manifest: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    let config = ManifestFile::new(manifest).build()?;
    RepositoryLayout::from_config(&config).initialize()?;
    let lock = GlobalLock::new(BULK_LOCK_PURPOSE, config.root_path(), config.lock_dir())?;

    let Some(guard) = lock.try_acquire(Duration::from_secs(5))? else {
        println!("busy {}", lock.name());
        return Ok(false);
    };
    println!("locked {}", guard.name());
    io::stdout().flush()?;
    info!("holding {} until stdin closes", lock.path().display());

    let mut discard = Vec::new();
    io::stdin().read_to_end(&mut discard)?;
    guard.release();
    Ok(true)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("FSREPO_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_LEVEL)),
        )
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .init();

    let Some(manifest) = std::env::args_os().nth(1) else {
        eprintln!("usage: lock_holder <manifest.toml>");
        return ExitCode::from(EXIT_USAGE);
    };

    match run(Path::new(&manifest)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_BUSY),
        Err(e) => {
            error!("lock_holder failed: {e}");
            ExitCode::FAILURE
        }
    }
}
