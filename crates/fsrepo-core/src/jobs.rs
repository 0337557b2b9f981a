use crate::concurrency::CancellationToken;
use crate::lifecycle::BulkKind;
use crate::result::{LogEntry, LogSeverity, RepositoryActionResult};
use crate::serializer::{describe, ObjectSerializer};
use crate::CoreError;
use fsrepo_schema::{ObjectTypeId, Record, RepositoryConfiguration};
use fsrepo_store::{RecordStore, RepositoryLayout};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything a bulk job may use while it runs.
///
/// The configuration is the snapshot taken when the job started. Every
/// logged entry is forwarded to the caller's progress handler and, for
/// warnings and errors, recorded in the result.
pub struct JobContext<'a> {
    kind: BulkKind,
    config: Arc<RepositoryConfiguration>,
    serializer: &'a dyn ObjectSerializer,
    cancel: Option<&'a CancellationToken>,
    handler: Option<&'a dyn Fn(&LogEntry)>,
    result: RepositoryActionResult,
}

impl<'a> JobContext<'a> {
    pub(crate) fn new(
        kind: BulkKind,
        config: Arc<RepositoryConfiguration>,
        serializer: &'a dyn ObjectSerializer,
        cancel: Option<&'a CancellationToken>,
        handler: Option<&'a dyn Fn(&LogEntry)>,
    ) -> Self {
        Self {
            kind,
            config,
            serializer,
            cancel,
            handler,
            result: RepositoryActionResult::new(),
        }
    }

    pub(crate) fn into_result(self) -> RepositoryActionResult {
        self.result
    }

    #[inline]
    pub fn kind(&self) -> BulkKind {
        self.kind
    }

    #[inline]
    pub fn config(&self) -> &RepositoryConfiguration {
        &self.config
    }

    pub fn snapshot(&self) -> Arc<RepositoryConfiguration> {
        Arc::clone(&self.config)
    }

    pub fn serializer(&self) -> &'a dyn ObjectSerializer {
        self.serializer
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancellationToken::is_cancelled)
    }

    pub fn log(&mut self, entry: LogEntry) {
        match entry.severity {
            LogSeverity::Info => info!("{}: {}", self.kind, entry.message),
            LogSeverity::Warning => warn!("{}: {}", self.kind, entry.message),
            LogSeverity::Error => error!("{}: {}", self.kind, entry.message),
        }
        if let Some(handler) = self.handler {
            handler(&entry);
        }
        self.result.log(entry);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogEntry::info(message));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.log(LogEntry::warning(message));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(LogEntry::error(message));
    }

    pub fn has_errors(&self) -> bool {
        !self.result.success()
    }
}

/// Runs the two bulk operations. Injected into the coordinator so
/// alternative strategies (and tests) can replace the file-system jobs.
///
/// An `Err` return aborts the job; the coordinator records it as an error
/// entry. Per-object failures should be logged through the context instead.
pub trait BulkJobRunner: Send + Sync {
    fn store_all(&self, ctx: &mut JobContext<'_>) -> Result<(), CoreError>;
    fn restore_all(&self, ctx: &mut JobContext<'_>) -> Result<(), CoreError>;
}

/// Enumerates the application's objects for store-all.
pub trait RecordSource: Send + Sync {
    fn object_types(&self) -> Vec<ObjectTypeId>;
    fn records(&self, object_type: &ObjectTypeId) -> Result<Vec<Record>, CoreError>;
}

/// Receives objects read back by restore-all.
pub trait RecordSink: Send + Sync {
    fn apply(&self, record: Record) -> Result<(), CoreError>;
}

/// Bulk jobs over the record files of a [`RecordStore`].
///
/// Store-all writes every record of every included type through the
/// serializer and then deletes record files of those types that were not
/// written in this run. Restore-all reads every record file and hands it to
/// the sink.
pub struct FileSystemJobs {
    source: Arc<dyn RecordSource>,
    sink: Arc<dyn RecordSink>,
}

impl FileSystemJobs {
    pub fn new(source: Arc<dyn RecordSource>, sink: Arc<dyn RecordSink>) -> Self {
        Self { source, sink }
    }

    fn remove_stale(
        &self,
        ctx: &mut JobContext<'_>,
        store: &RecordStore,
        folders: &BTreeSet<String>,
        written: &HashSet<PathBuf>,
    ) -> Result<(), CoreError> {
        let mut removed = 0usize;
        for folder in folders {
            let dir = store.layout().root().join(store.layout().type_dir(folder)?);
            // Nested type folders belong to their own type.
            let stale: Vec<PathBuf> = store
                .list_folder(folder)?
                .into_iter()
                .filter(|p| p.parent() == Some(dir.as_path()) && !written.contains(p))
                .collect();
            for path in stale {
                match store.remove_path(&path) {
                    Ok(_) => removed += 1,
                    Err(e) => ctx.error(format!(
                        "failed to remove stale file {}: {e}",
                        path.display()
                    )),
                }
            }
        }
        if removed > 0 {
            ctx.info(format!("removed {removed} stale file(s)"));
        }
        Ok(())
    }
}

impl BulkJobRunner for FileSystemJobs {
    fn store_all(&self, ctx: &mut JobContext<'_>) -> Result<(), CoreError> {
        let config = ctx.snapshot();
        let serializer = ctx.serializer();
        let store = RecordStore::new(RepositoryLayout::from_config(&config));
        let mut folders = BTreeSet::new();
        let mut written = HashSet::new();
        let mut stored = 0usize;

        let types: Vec<ObjectTypeId> = self
            .source
            .object_types()
            .into_iter()
            .filter(|t| config.is_object_type_included(t))
            .collect();

        for object_type in &types {
            folders.insert(config.type_folder(object_type).to_owned());
            let records = match self.source.records(object_type) {
                Ok(records) => records,
                Err(e) => {
                    ctx.error(format!("failed to enumerate {object_type} objects: {e}"));
                    continue;
                }
            };
            for record in &records {
                if ctx.is_cancelled() {
                    ctx.warning(format!("store-all cancelled after {stored} object(s)"));
                    return Ok(());
                }
                match serializer.store(record, &config) {
                    Ok(path) => {
                        written.insert(path);
                        stored += 1;
                    }
                    Err(e) => ctx.error(format!("failed to store {}: {e}", describe(record))),
                }
            }
        }
        ctx.info(format!(
            "stored {stored} object(s) of {} type(s)",
            types.len()
        ));

        if ctx.has_errors() {
            ctx.warning("stale file cleanup skipped because errors were logged");
            return Ok(());
        }
        self.remove_stale(ctx, &store, &folders, &written)
    }

    fn restore_all(&self, ctx: &mut JobContext<'_>) -> Result<(), CoreError> {
        let config = ctx.snapshot();
        let store = RecordStore::new(RepositoryLayout::from_config(&config));
        let mut restored = 0usize;

        for path in store.list()? {
            if ctx.is_cancelled() {
                ctx.warning(format!("restore-all cancelled after {restored} object(s)"));
                return Ok(());
            }
            let record = match store.get(&path) {
                Ok(record) => record,
                Err(e) => {
                    ctx.error(format!("failed to read {}: {e}", path.display()));
                    continue;
                }
            };
            if !config.is_object_type_included(&record.object_type) {
                ctx.warning(format!(
                    "skipped {}: object type {} is not included",
                    path.display(),
                    record.object_type
                ));
                continue;
            }
            let object = describe(&record);
            match self.sink.apply(record) {
                Ok(()) => restored += 1,
                Err(e) => ctx.error(format!("failed to restore {object}: {e}")),
            }
        }
        ctx.info(format!("restored {restored} object(s)"));
        Ok(())
    }
}
