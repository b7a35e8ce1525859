use anyhow::Result;
use docsync::activity::ActivityListener;
use docsync::adapters::memory::{MemoryExtendedAttributes, MemorySession, MemoryStorage};
use docsync::bus::EventQueue;
use docsync::config::Config;
use docsync::handlers::{Situation, SituationSolver, SolverTable, WiringState};
use docsync::repository::{RepositoryPorts, SyncRepository};
use docsync_core::domain::{
    CapabilityChanges, FileTransmissionEvent, ObjectEvent, RemoteChangeKind, RemoteObject, RepositoryCapabilities,
    StartNextSyncEvent, TransmissionProgress, TransmissionType,
};
use docsync_core::ports::MetaDataStorage;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingSolver {
    calls: Mutex<Vec<(Option<PathBuf>, Option<String>, Situation, Situation)>>,
}

impl SituationSolver for RecordingSolver {
    fn solve(&self, event: &ObjectEvent, local: Situation, remote: Situation) -> Result<()> {
        self.calls.lock().unwrap().push((
            event.local_path().map(Path::to_path_buf),
            event.remote_object().map(|o| o.id.clone()),
            local,
            remote,
        ));
        Ok(())
    }
}

struct Idle;

impl ActivityListener for Idle {
    fn activity_started(&self) {}
    fn activity_stopped(&self) {}
}

struct Harness {
    _dir: TempDir,
    root: PathBuf,
    session: Arc<MemorySession>,
    storage: Arc<MemoryStorage>,
    solver: Arc<RecordingSolver>,
    repository: SyncRepository,
}

fn harness(changes: Option<CapabilityChanges>, populate: impl FnOnce(&Path) -> Result<()>) -> Result<Harness> {
    let dir = TempDir::new()?;
    let root = dir.path().to_path_buf();
    populate(&root)?;

    let mut config = Config::default();
    config.repository.local_path = root.clone();
    config.repository.remote_path = "/".to_string();
    config.repository.url = "http://localhost/cmis".to_string();
    config.repository.poll_interval_secs = 3600;
    config.bus.shutdown_timeout_secs = 10;

    let session = Arc::new(MemorySession::new("repo", RepositoryCapabilities { changes }));
    session.insert(RemoteObject::folder("root", "/", "/"));
    let storage = Arc::new(MemoryStorage::new(&root, "/"));
    let solver = Arc::new(RecordingSolver::default());

    let repository = SyncRepository::new(
        &config,
        RepositoryPorts {
            storage: storage.clone(),
            attributes: Arc::new(MemoryExtendedAttributes::new()),
            activity: Arc::new(Idle),
            solvers: SolverTable::new().with_fallback(solver.clone()),
        },
    )?;

    Ok(Harness {
        _dir: dir,
        root,
        session,
        storage,
        solver,
        repository,
    })
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_first_sync_crawls_local_tree() -> Result<()> {
    let h = harness(None, |root| {
        fs::write(root.join("notes.txt"), "hello")?;
        fs::create_dir(root.join("photos"))?;
        fs::write(root.join("scratch.tmp"), "ignored")?;
        Ok(())
    })?;

    h.repository.connect(h.session.clone())?;
    h.repository.start(false)?;
    wait_until("two solver calls", || h.solver.calls.lock().unwrap().len() >= 2);
    assert!(h.repository.shutdown());

    assert_eq!(h.repository.initializer().state(), WiringState::WiredWithoutChangeTracking);
    let mut calls = h.solver.calls.lock().unwrap().clone();
    calls.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        calls,
        vec![
            (Some(h.root.join("notes.txt")), None, Situation::Added, Situation::NoChange),
            (Some(h.root.join("photos")), None, Situation::Added, Situation::NoChange),
        ]
    );
    Ok(())
}

#[test]
fn test_change_log_drives_later_syncs() -> Result<()> {
    let h = harness(Some(CapabilityChanges::ObjectIdsOnly), |_| Ok(()))?;

    h.repository.connect(h.session.clone())?;
    h.repository.start(false)?;
    // The first crawl records the remote token once it completes
    wait_until("stored change log token", || matches!(h.storage.change_log_token(), Ok(Some(_))));
    assert_eq!(h.repository.initializer().state(), WiringState::WiredWithChangeTracking);

    h.session
        .insert(RemoteObject::document("doc-1", "report.pdf", "/report.pdf").with_parent("root"));
    let token = h.session.record_change(RemoteChangeKind::Created, "doc-1");
    h.repository.queue().add_event(StartNextSyncEvent::new(false).into())?;

    wait_until("remote addition", || !h.solver.calls.lock().unwrap().is_empty());
    assert!(h.repository.shutdown());

    assert_eq!(
        *h.solver.calls.lock().unwrap(),
        vec![(None, Some("doc-1".to_string()), Situation::NoChange, Situation::Added)]
    );
    assert_eq!(h.storage.change_log_token()?, Some(token));
    Ok(())
}

#[test]
fn test_transmissions_are_tracked_until_finished() -> Result<()> {
    let h = harness(None, |_| Ok(()))?;
    let transmissions = Arc::clone(h.repository.activity().transmission_manager());

    let transfer = Arc::new(FileTransmissionEvent::new(
        TransmissionType::DownloadNewFile,
        h.root.join("big.iso"),
    ));
    h.repository.queue().add_event(Arc::clone(&transfer).into())?;
    wait_until("tracked transfer", || transmissions.len() == 1);

    transfer.report_progress(TransmissionProgress {
        completed: Some(true),
        ..Default::default()
    });
    assert!(transmissions.is_empty());
    assert!(h.repository.shutdown());
    Ok(())
}

#[test]
fn test_shutdown_rejects_new_events() -> Result<()> {
    let h = harness(None, |_| Ok(()))?;
    h.repository.start(false)?;
    assert!(h.repository.shutdown());
    assert!(h.repository.queue().is_stopped());
    assert!(h.repository.request_full_sync().is_err());
    Ok(())
}
