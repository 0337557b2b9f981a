use crate::CoreError;
use fs2::FileExt;
use fsrepo_store::make_safe_name;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const LOCK_NAME_PREFIX: &str = "Global\\";
const LOCK_NAME_MAX_LENGTH: usize = 100;
const LOCK_NAME_HASH_LENGTH: usize = 10;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A named lock visible to every process on the machine.
///
/// The name is derived from a purpose tag and the repository root, so all
/// processes working on the same repository agree on it across restarts.
/// It is backed by an advisory `flock` on `<lock_dir>/<name>.lock`; the lock
/// file and its directory are opened up to all local users because workers
/// may run under different accounts. The kernel drops the lock when the
/// holding process dies.
#[derive(Debug)]
pub struct GlobalLock {
    name: String,
    path: PathBuf,
}

impl GlobalLock {
    pub fn new(purpose: &str, repository_root: &Path, lock_dir: &Path) -> Result<Self, CoreError> {
        // Spell the same root the same way in every process.
        let root = fs::canonicalize(repository_root).unwrap_or_else(|_| repository_root.to_path_buf());
        let safe = make_safe_name(
            &format!("{purpose}{}", root.display()),
            None,
            LOCK_NAME_MAX_LENGTH,
            LOCK_NAME_HASH_LENGTH,
        )?;

        fs::create_dir_all(lock_dir)?;
        share_with_everyone(lock_dir, 0o1777);
        let path = lock_dir.join(format!("{safe}.lock"));
        open_lock_file(&path)?;
        share_with_everyone(&path, 0o666);

        Ok(Self {
            name: format!("{LOCK_NAME_PREFIX}{safe}"),
            path,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to take the lock, polling until `timeout` elapses. A zero timeout
    /// makes a single attempt. A timeout too large to represent waits
    /// without limit. `Ok(None)` means another holder has it.
    pub fn try_acquire(&self, timeout: Duration) -> Result<Option<GlobalLockGuard>, CoreError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait_forever().map(Some);
        };
        let file = open_lock_file(&self.path)?;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!("acquired global lock {}", self.name);
                    return Ok(Some(GlobalLockGuard {
                        file,
                        name: self.name.clone(),
                    }));
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {}
                Err(e) => return Err(CoreError::Io(e)),
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Block until the lock is ours.
    pub fn wait_forever(&self) -> Result<GlobalLockGuard, CoreError> {
        let file = open_lock_file(&self.path)?;
        file.lock_exclusive()?;
        debug!("acquired global lock {} (blocking)", self.name);
        Ok(GlobalLockGuard {
            file,
            name: self.name.clone(),
        })
    }

    /// Acquire-then-release check: true when nobody holds the lock right now.
    pub fn is_free(&self) -> Result<bool, CoreError> {
        Ok(self.try_acquire(Duration::ZERO)?.is_some())
    }
}

/// Ownership of a [`GlobalLock`]. Released on drop.
pub struct GlobalLockGuard {
    file: File,
    name: String,
}

impl GlobalLockGuard {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for GlobalLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!("failed to unlock global lock {}: {e}", self.name);
        }
        debug!("released global lock {}", self.name);
    }
}

impl std::fmt::Debug for GlobalLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalLockGuard")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn open_lock_file(path: &Path) -> Result<File, io::Error> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
}

/// Best effort: only the owner may change permissions, and a lock directory
/// created by another account is already shared.
#[cfg(unix)]
fn share_with_everyone(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        debug!("could not set mode {mode:o} on {}: {e}", path.display());
    }
}

#[cfg(not(unix))]
fn share_with_everyone(_path: &Path, _mode: u32) {}

/// Cooperative cancellation flag for bulk operations.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancel `token` on the first Ctrl-C; exit on the second.
pub fn install_signal_handler(token: CancellationToken) {
    let result = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(1);
        }
        token.cancel();
        warn!("shutdown requested, finishing current object...");
    });
    if let Err(e) = result {
        warn!("failed to install signal handler: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_lock() -> (tempfile::TempDir, GlobalLock) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        fs::create_dir_all(&root).unwrap();
        let lock = GlobalLock::new("test-bulk", &root, &dir.path().join("locks")).unwrap();
        (dir, lock)
    }

    #[test]
    fn name_is_prefixed_and_bounded() {
        let (_dir, lock) = test_lock();
        assert!(lock.name().starts_with("Global\\test-bulk"));
        assert!(lock.name().len() <= LOCK_NAME_PREFIX.len() + LOCK_NAME_MAX_LENGTH);
        assert!(lock.path().exists());
    }

    #[test]
    fn name_is_stable_for_same_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        fs::create_dir_all(&root).unwrap();
        let locks = dir.path().join("locks");
        let a = GlobalLock::new("bulk", &root, &locks).unwrap();
        let b = GlobalLock::new("bulk", &root.join("."), &locks).unwrap();
        assert_eq!(a.name(), b.name());
        assert_eq!(a.path(), b.path());
    }

    #[test]
    fn name_differs_per_purpose_and_root() {
        let dir = tempfile::tempdir().unwrap();
        let locks = dir.path().join("locks");
        for sub in ["one", "two"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        let a = GlobalLock::new("bulk", &dir.path().join("one"), &locks).unwrap();
        let b = GlobalLock::new("bulk", &dir.path().join("two"), &locks).unwrap();
        let c = GlobalLock::new("other", &dir.path().join("one"), &locks).unwrap();
        assert_ne!(a.name(), b.name());
        assert_ne!(a.name(), c.name());
    }

    #[test]
    fn lock_acquire_and_release() {
        let (_dir, lock) = test_lock();
        let guard = lock.try_acquire(Duration::ZERO).unwrap();
        assert!(guard.is_some());
        assert!(!lock.is_free().unwrap());
        drop(guard);
        assert!(lock.is_free().unwrap());
    }

    #[test]
    fn try_acquire_returns_none_when_held() {
        let (_dir, lock) = test_lock();
        let _guard = lock.wait_forever().unwrap();
        assert!(lock.try_acquire(Duration::ZERO).unwrap().is_none());
    }

    #[test]
    fn try_acquire_times_out() {
        let (_dir, lock) = test_lock();
        let _guard = lock.wait_forever().unwrap();
        let start = Instant::now();
        assert!(lock
            .try_acquire(Duration::from_millis(50))
            .unwrap()
            .is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn unbounded_timeout_acquires_free_lock() {
        let (_dir, lock) = test_lock();
        let guard = lock.try_acquire(Duration::MAX).unwrap();
        assert!(guard.is_some());
        assert!(!lock.is_free().unwrap());
    }

    #[test]
    fn unbounded_timeout_waits_for_holder() {
        let (_dir, lock) = test_lock();
        let lock = Arc::new(lock);
        let guard = lock.wait_forever().unwrap();
        let waiter = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || lock.try_acquire(Duration::MAX).unwrap().is_some())
        };
        std::thread::sleep(Duration::from_millis(30));
        drop(guard);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn release_unlocks_immediately() {
        let (_dir, lock) = test_lock();
        let guard = lock.try_acquire(Duration::ZERO).unwrap().unwrap();
        assert!(!lock.is_free().unwrap());
        guard.release();
        assert!(lock.is_free().unwrap());
    }

    #[test]
    fn try_acquire_waits_for_release() {
        let (_dir, lock) = test_lock();
        let lock = Arc::new(lock);
        let guard = lock.wait_forever().unwrap();
        let waiter = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || lock.try_acquire(Duration::from_secs(5)).unwrap().is_some())
        };
        std::thread::sleep(Duration::from_millis(30));
        guard.release();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn is_free_does_not_keep_lock() {
        let (_dir, lock) = test_lock();
        assert!(lock.is_free().unwrap());
        assert!(lock.is_free().unwrap());
        assert!(lock.try_acquire(Duration::ZERO).unwrap().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn lock_file_is_shared() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, lock) = test_lock();
        let mode = fs::metadata(lock.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o666, 0o666);
    }

    #[test]
    fn cancellation_token_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
