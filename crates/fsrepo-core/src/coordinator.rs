use crate::concurrency::{CancellationToken, GlobalLock, GlobalLockGuard};
use crate::jobs::{BulkJobRunner, FileSystemJobs, JobContext, RecordSink, RecordSource};
use crate::lifecycle::{validate_transition, BulkKind, OperationState};
use crate::result::{LogEntry, RepositoryActionResult};
use crate::serializer::{describe, FileSystemSerializer, ObjectSerializer};
use crate::CoreError;
use fsrepo_schema::{ConfigurationSource, RepositoryConfiguration, TypedRecord};
use fsrepo_store::RepositoryLayout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Purpose tag of the cross-process lock held for the whole of a bulk run.
pub const BULK_LOCK_PURPOSE: &str = "fsrepo-bulk";

struct CachedConfiguration {
    snapshot: Arc<RepositoryConfiguration>,
    stale: bool,
}

/// Serializes per-object operations against store-all and restore-all.
///
/// Two lock tiers, always taken in this order:
///
/// 1. the local state lock, held only for short decisions and per-object
///    writes;
/// 2. the global bulk lock, held by a bulk run from start to finish and
///    only checked by per-object operations.
///
/// A bulk job itself runs with only the global lock held, so per-object
/// calls in this process see the running flag and fail fast, while other
/// processes see the global lock.
pub struct RepositoryCoordinator {
    source: Box<dyn ConfigurationSource>,
    config: RwLock<CachedConfiguration>,
    serializer: Box<dyn ObjectSerializer>,
    jobs: Box<dyn BulkJobRunner>,
    bulk_lock: GlobalLock,
    state: Mutex<OperationState>,
    bulk_running: AtomicBool,
}

impl RepositoryCoordinator {
    /// Build the first configuration snapshot, create the repository root
    /// and bind the global bulk lock to it.
    pub fn new(
        source: impl ConfigurationSource + 'static,
        serializer: impl ObjectSerializer + 'static,
        jobs: impl BulkJobRunner + 'static,
    ) -> Result<Self, CoreError> {
        let config = source.build()?;
        config.validate()?;
        RepositoryLayout::from_config(&config).initialize()?;
        let bulk_lock = GlobalLock::new(BULK_LOCK_PURPOSE, config.root_path(), config.lock_dir())?;
        debug!(
            "coordinator for {} uses lock {}",
            config.root_path().display(),
            bulk_lock.name()
        );

        Ok(Self {
            source: Box::new(source),
            config: RwLock::new(CachedConfiguration {
                snapshot: Arc::new(config),
                stale: false,
            }),
            serializer: Box::new(serializer),
            jobs: Box::new(jobs),
            bulk_lock,
            state: Mutex::new(OperationState::Idle),
            bulk_running: AtomicBool::new(false),
        })
    }

    /// Coordinator with the default JSON serializer and file-system jobs.
    pub fn with_file_system(
        source: impl ConfigurationSource + 'static,
        records: Arc<dyn RecordSource>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, CoreError> {
        Self::new(
            source,
            FileSystemSerializer::new(),
            FileSystemJobs::new(records, sink),
        )
    }

    /// The current configuration snapshot, rebuilt first if it was
    /// invalidated.
    pub fn configuration(&self) -> Result<Arc<RepositoryConfiguration>, CoreError> {
        {
            let cached = self.config.read().unwrap_or_else(PoisonError::into_inner);
            if !cached.stale {
                return Ok(Arc::clone(&cached.snapshot));
            }
        }

        let mut cached = self.config.write().unwrap_or_else(PoisonError::into_inner);
        if cached.stale {
            let fresh = self.source.build()?;
            fresh.validate()?;
            if fresh.root_path() != cached.snapshot.root_path() {
                warn!(
                    "repository root changed to {}; the bulk lock stays bound to {}",
                    fresh.root_path().display(),
                    cached.snapshot.root_path().display()
                );
            }
            debug!("rebuilt repository configuration");
            cached.snapshot = Arc::new(fresh);
            cached.stale = false;
        }
        Ok(Arc::clone(&cached.snapshot))
    }

    /// Mark the cached configuration stale, for example after the object
    /// type metadata changed. The next call rebuilds it.
    pub fn invalidate_configuration(&self) {
        self.config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .stale = true;
    }

    #[inline]
    pub fn bulk_lock(&self) -> &GlobalLock {
        &self.bulk_lock
    }

    pub fn state(&self) -> OperationState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a bulk run is in progress in this process.
    pub fn is_bulk_running(&self) -> bool {
        self.bulk_running.load(Ordering::SeqCst)
    }

    /// Whether a bulk run is in progress in this or any other process.
    pub fn is_bulk_running_globally(&self) -> Result<bool, CoreError> {
        Ok(self.is_bulk_running() || !self.bulk_lock.is_free()?)
    }

    /// Write one object. Returns `Ok(false)` when its type is not included.
    pub fn store_one(&self, record: &dyn TypedRecord) -> Result<bool, CoreError> {
        self.run_single(record, "store", |serializer, config| {
            let path = serializer.store(record, config)?;
            debug!("stored {} at {}", describe(record), path.display());
            Ok(())
        })
    }

    /// Delete one object. Returns `Ok(false)` when its type is not included.
    pub fn delete_one(&self, record: &dyn TypedRecord) -> Result<bool, CoreError> {
        self.run_single(record, "delete", |serializer, config| {
            if !serializer.delete(record, config)? {
                debug!("{} had no file to delete", describe(record));
            }
            Ok(())
        })
    }

    pub fn store_all(
        &self,
        progress: Option<&dyn Fn(&LogEntry)>,
        cancel: Option<&CancellationToken>,
    ) -> Result<RepositoryActionResult, CoreError> {
        self.run_bulk(BulkKind::StoreAll, progress, cancel)
    }

    /// Fails with [`CoreError::FeatureDisabled`] when the configuration
    /// disables restore-all.
    pub fn restore_all(
        &self,
        progress: Option<&dyn Fn(&LogEntry)>,
        cancel: Option<&CancellationToken>,
    ) -> Result<RepositoryActionResult, CoreError> {
        self.run_bulk(BulkKind::RestoreAll, progress, cancel)
    }

    fn run_single(
        &self,
        record: &dyn TypedRecord,
        action: &str,
        op: impl FnOnce(&dyn ObjectSerializer, &RepositoryConfiguration) -> Result<(), CoreError>,
    ) -> Result<bool, CoreError> {
        if record.object_type().is_blank() {
            return Err(CoreError::InvalidArgument(
                "object type must not be empty".to_owned(),
            ));
        }
        if record.name().is_blank() {
            return Err(CoreError::InvalidArgument(
                "object name must not be empty".to_owned(),
            ));
        }

        let config = self.configuration()?;
        if !config.is_object_type_included(record.object_type()) {
            debug!(
                "{} not {action}d: object type is not included",
                describe(record)
            );
            return Ok(false);
        }

        // Fast path: no need to touch the global lock.
        if self.is_bulk_running() {
            return Err(conflict(action, record));
        }

        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_bulk_running() {
            return Err(conflict(action, record));
        }
        if !self.bulk_lock.is_free()? {
            debug!("global lock {} is held elsewhere", self.bulk_lock.name());
            return Err(conflict(action, record));
        }
        op(self.serializer.as_ref(), config.as_ref())?;
        drop(state);
        Ok(true)
    }

    fn run_bulk(
        &self,
        kind: BulkKind,
        progress: Option<&dyn Fn(&LogEntry)>,
        cancel: Option<&CancellationToken>,
    ) -> Result<RepositoryActionResult, CoreError> {
        let config = self.configuration()?;
        if kind == BulkKind::RestoreAll && !config.restore_all_enabled() {
            return Err(CoreError::FeatureDisabled(
                "restore-all is disabled by the repository configuration".to_owned(),
            ));
        }

        if self.is_bulk_running() {
            info!("{kind} not started: a bulk operation is already running in this process");
            return Ok(RepositoryActionResult::already_running(kind));
        }

        let run = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.is_bulk_running() {
                return Ok(RepositoryActionResult::already_running(kind));
            }
            let Some(global) = self.bulk_lock.try_acquire(Duration::ZERO)? else {
                info!(
                    "{kind} not started: global lock {} is held by another process",
                    self.bulk_lock.name()
                );
                return Ok(RepositoryActionResult::already_running(kind));
            };
            let next = OperationState::BulkRunning(kind);
            validate_transition(*state, next)?;
            *state = next;
            self.bulk_running.store(true, Ordering::SeqCst);
            BulkRun {
                coordinator: self,
                global: Some(global),
            }
        };

        info!("{kind} started in {}", config.root_path().display());
        let mut ctx = JobContext::new(kind, config, self.serializer.as_ref(), cancel, progress);
        let outcome = match kind {
            BulkKind::StoreAll => self.jobs.store_all(&mut ctx),
            BulkKind::RestoreAll => self.jobs.restore_all(&mut ctx),
        };
        if let Err(e) = outcome {
            ctx.error(format!("{kind} aborted: {e}"));
        }
        let result = ctx.into_result();
        drop(run);

        info!(
            "{kind} finished: success={}, {} error(s), {} warning(s)",
            result.success(),
            result.error_count(),
            result.warning_count()
        );
        Ok(result)
    }
}

fn conflict(action: &str, record: &dyn TypedRecord) -> CoreError {
    CoreError::OperationConflict(format!(
        "cannot {action} {} while a store-all or restore-all operation is running",
        describe(record)
    ))
}

/// Ownership of a running bulk operation. Dropping it, on any exit path
/// including unwinding, puts the coordinator back to idle and then
/// releases the global lock.
struct BulkRun<'a> {
    coordinator: &'a RepositoryCoordinator,
    global: Option<GlobalLockGuard>,
}

impl Drop for BulkRun<'_> {
    fn drop(&mut self) {
        let mut state = self
            .coordinator
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = validate_transition(*state, OperationState::Idle) {
            warn!("resetting coordinator state: {e}");
        }
        *state = OperationState::Idle;
        self.coordinator.bulk_running.store(false, Ordering::SeqCst);
        if let Some(global) = self.global.take() {
            global.release();
        }
    }
}
