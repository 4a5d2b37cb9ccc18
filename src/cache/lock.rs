//! Artifact lock strategies
//!
//! The cache serializes work on a cache path through a `LockStrategy`
//! selected by settings:
//!
//! - `no-lock`: no coordination at all
//! - `artifact-lock`: a `<path>.lck` file created exclusively, shared by every
//!   process using the same cache directory
//! - `in-process`: threads of this process only
//!
//! Locks are reentrant per thread: a thread may lock a path it already holds
//! and must unlock it as many times.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::module::artifact::Artifact;

pub const NO_LOCK: &str = "no-lock";
pub const ARTIFACT_LOCK: &str = "artifact-lock";
pub const IN_PROCESS_LOCK: &str = "in-process";

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const FILE_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("interrupted while waiting for lock on {0:?}")]
    Interrupted(PathBuf),

    #[error("cannot create lock file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Shared cancellation flag
///
/// Cancelling is sticky: the flag stays set so that every layer above the
/// one that noticed it also stops.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
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

pub trait LockStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Block until `path` is locked for `artifact`
    ///
    /// `Ok(false)` when the lock could not be obtained in time. Returns
    /// `LockError::Interrupted` as soon as `cancel` is set.
    fn lock_artifact(
        &self,
        artifact: &Artifact,
        path: &Path,
        cancel: &CancelFlag,
    ) -> Result<bool, LockError>;

    fn unlock_artifact(&self, artifact: &Artifact, path: &Path);
}

/// Strategy registered under `name`
pub fn lock_strategy_by_name(name: &str) -> Option<Arc<dyn LockStrategy>> {
    match name {
        NO_LOCK => Some(Arc::new(NoLockStrategy)),
        ARTIFACT_LOCK => Some(Arc::new(ArtifactLockStrategy::default())),
        IN_PROCESS_LOCK => Some(Arc::new(InProcessLockStrategy::default())),
        _ => None,
    }
}

/// Held locks: path -> (owner thread, hold count)
type Holders = HashMap<PathBuf, (ThreadId, usize)>;

fn holders(mutex: &Mutex<Holders>) -> MutexGuard<'_, Holders> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Increment the hold count if the current thread already owns `path`
fn reenter(held: &mut Holders, path: &Path) -> bool {
    match held.get_mut(path) {
        Some((owner, count)) if *owner == thread::current().id() => {
            *count += 1;
            true
        }
        _ => false,
    }
}

/// Decrement the hold count; true when the lock was fully released
fn release(held: &mut Holders, path: &Path) -> bool {
    let released = match held.get_mut(path) {
        Some((owner, count)) if *owner == thread::current().id() => {
            *count -= 1;
            *count == 0
        }
        _ => return false,
    };
    if released {
        held.remove(path);
    }
    released
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoLockStrategy;

impl LockStrategy for NoLockStrategy {
    fn name(&self) -> &str {
        NO_LOCK
    }

    fn lock_artifact(&self, _: &Artifact, _: &Path, _: &CancelFlag) -> Result<bool, LockError> {
        Ok(true)
    }

    fn unlock_artifact(&self, _: &Artifact, _: &Path) {}
}

/// Lock file next to the cache path, visible to other processes
#[derive(Debug)]
pub struct ArtifactLockStrategy {
    timeout: Duration,
    held: Mutex<Holders>,
}

impl Default for ArtifactLockStrategy {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_LOCK_TIMEOUT)
    }
}

impl ArtifactLockStrategy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn lock_file(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".lck");
        PathBuf::from(name)
    }

    fn try_create(lock_file: &Path) -> Result<bool, LockError> {
        let io_err = |source| LockError::Io {
            path: lock_file.to_path_buf(),
            source,
        };
        if let Some(parent) = lock_file.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_file)
        {
            Ok(mut file) => {
                // owner pid, informational only
                let _ = writeln!(file, "{}", std::process::id());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(io_err(e)),
        }
    }
}

impl LockStrategy for ArtifactLockStrategy {
    fn name(&self) -> &str {
        ARTIFACT_LOCK
    }

    fn lock_artifact(
        &self,
        artifact: &Artifact,
        path: &Path,
        cancel: &CancelFlag,
    ) -> Result<bool, LockError> {
        let lock_file = Self::lock_file(path);
        if reenter(&mut holders(&self.held), &lock_file) {
            return Ok(true);
        }
        let start = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Err(LockError::Interrupted(lock_file));
            }
            if Self::try_create(&lock_file)? {
                holders(&self.held).insert(lock_file, (thread::current().id(), 1));
                debug!("Locked {} at {:?}", artifact, path);
                return Ok(true);
            }
            if start.elapsed() >= self.timeout {
                warn!(
                    "Could not lock {} within {:?}, lock file {:?} still present",
                    artifact, self.timeout, lock_file
                );
                return Ok(false);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn unlock_artifact(&self, artifact: &Artifact, path: &Path) {
        let lock_file = Self::lock_file(path);
        if release(&mut holders(&self.held), &lock_file) {
            if let Err(e) = fs::remove_file(&lock_file) {
                warn!("Failed to remove lock file {:?}: {}", lock_file, e);
            }
            debug!("Unlocked {} at {:?}", artifact, path);
        }
    }
}

/// Exclusive `<path>.lck` file guarding a short critical section
///
/// Unlike `ArtifactLockStrategy` this is not reentrant. The lock file is
/// removed when the guard drops.
#[derive(Debug)]
pub struct FileLock {
    lock_file: PathBuf,
}

impl FileLock {
    /// `Ok(None)` when another holder kept the lock for `timeout`
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Option<Self>, LockError> {
        let lock_file = ArtifactLockStrategy::lock_file(path);
        let start = Instant::now();
        loop {
            if ArtifactLockStrategy::try_create(&lock_file)? {
                return Ok(Some(Self { lock_file }));
            }
            if start.elapsed() >= timeout {
                warn!("Lock file {:?} still present after {:?}", lock_file, timeout);
                return Ok(None);
            }
            thread::sleep(FILE_LOCK_POLL_INTERVAL);
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_file) {
            warn!("Failed to remove lock file {:?}: {}", self.lock_file, e);
        }
    }
}

/// Lock table shared by the threads of this process
#[derive(Debug)]
pub struct InProcessLockStrategy {
    timeout: Duration,
    held: Mutex<Holders>,
    released: Condvar,
}

impl Default for InProcessLockStrategy {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_LOCK_TIMEOUT)
    }
}

impl InProcessLockStrategy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            held: Mutex::new(HashMap::new()),
            released: Condvar::new(),
        }
    }
}

impl LockStrategy for InProcessLockStrategy {
    fn name(&self) -> &str {
        IN_PROCESS_LOCK
    }

    fn lock_artifact(
        &self,
        artifact: &Artifact,
        path: &Path,
        cancel: &CancelFlag,
    ) -> Result<bool, LockError> {
        let start = Instant::now();
        let mut held = holders(&self.held);
        loop {
            if reenter(&mut held, path) {
                return Ok(true);
            }
            if !held.contains_key(path) {
                held.insert(path.to_path_buf(), (thread::current().id(), 1));
                debug!("Locked {} at {:?}", artifact, path);
                return Ok(true);
            }
            if cancel.is_cancelled() {
                return Err(LockError::Interrupted(path.to_path_buf()));
            }
            if start.elapsed() >= self.timeout {
                warn!("Could not lock {} within {:?}", artifact, self.timeout);
                return Ok(false);
            }
            held = self
                .released
                .wait_timeout(held, POLL_INTERVAL)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    fn unlock_artifact(&self, artifact: &Artifact, path: &Path) {
        if release(&mut holders(&self.held), path) {
            debug!("Unlocked {} at {:?}", artifact, path);
            self.released.notify_all();
        }
    }
}
