use anyhow::{Context, Result};
use clap::Parser;
use docsync::activity::ActivityListener;
use docsync::adapters::memory::{MemoryExtendedAttributes, MemorySession, MemoryStorage};
use docsync::cli::CliArgs;
use docsync::config::Config;
use docsync::handlers::{Situation, SituationSolver, SolverTable};
use docsync::repository::{RepositoryPorts, SyncRepository};
use docsync_core::domain::{CapabilityChanges, ObjectEvent, RemoteObject, RepositoryCapabilities};
use std::fs;
use std::io::{self, BufRead};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Reports the overall busy/idle signal
struct LoggingActivityListener;

impl ActivityListener for LoggingActivityListener {
    fn activity_started(&self) {
        info!("Sync activity started");
    }

    fn activity_stopped(&self) {
        info!("Sync activity finished");
    }
}

/// Logs what would be transferred instead of transferring it
struct LoggingSolver;

impl SituationSolver for LoggingSolver {
    fn solve(&self, event: &ObjectEvent, local: Situation, remote: Situation) -> Result<()> {
        info!("Local {} / remote {}: {}", local, remote, event);
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = CliArgs::parse();
    let config_path = args.config.clone();
    let watch = !args.no_watch;
    let config = Config::from_cli_and_file(args, config_path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.bus.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let local_path = &config.repository.local_path;
    fs::create_dir_all(local_path)
        .with_context(|| format!("Failed to create {}", local_path.display()))?;
    info!("Syncing {} with {}", local_path.display(), config.repository.url);

    let session = Arc::new(MemorySession::new(
        config.repository.name.clone(),
        RepositoryCapabilities {
            changes: Some(CapabilityChanges::ObjectIdsOnly),
        },
    ));
    session.insert(RemoteObject::folder(
        "root",
        config.repository.remote_path.clone(),
        config.repository.remote_path.clone(),
    ));

    let repository = SyncRepository::new(
        &config,
        RepositoryPorts {
            storage: Arc::new(MemoryStorage::new(local_path, config.repository.remote_path.clone())),
            attributes: Arc::new(MemoryExtendedAttributes::new()),
            activity: Arc::new(LoggingActivityListener),
            solvers: SolverTable::new().with_fallback(Arc::new(LoggingSolver)),
        },
    )?;
    repository.connect(session)?;
    repository.start(watch)?;

    info!("Running, close stdin to stop");
    for line in io::stdin().lock().lines() {
        if line?.trim() == "sync" {
            repository.request_full_sync()?;
        }
    }

    repository.shutdown();
    Ok(())
}
