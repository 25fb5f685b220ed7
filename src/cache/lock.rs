//! Execution lock serializing builds that share a cache-output volume
//!
//! One lock file per volume, held via `flock`. The kernel drops the lock
//! when the holding file handle closes, so a crashed build never leaves a
//! stale lock behind. Acquisition polls with a configurable interval and
//! honors the caller's cancellation token; the wait is unbounded unless a
//! timeout is configured.

use crate::cancel::CancelToken;
use crate::error::{KilnError, KilnResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Metadata written into a held lock file for operator diagnostics
#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
    /// PID of the holding process
    pub pid: u32,
    /// Cache volume the lock serializes
    pub volume: String,
    /// When the lock was acquired
    pub acquired_at: DateTime<Utc>,
}

/// Lock for a single cache-output volume
pub struct BuildLock {
    path: PathBuf,
    volume: String,
}

/// RAII guard; dropping releases the flock
#[derive(Debug)]
pub struct BuildLockGuard {
    _file: File,
    volume: String,
    acquired_at: Instant,
}

impl BuildLockGuard {
    /// The volume this guard serializes
    pub fn volume(&self) -> &str {
        &self.volume
    }

    /// When the lock was acquired (monotonic)
    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }
}

impl Drop for BuildLockGuard {
    fn drop(&mut self) {
        debug!(
            "Released build lock on {} after {:?}",
            self.volume,
            self.acquired_at.elapsed()
        );
    }
}

impl BuildLock {
    /// Lock for the named volume, with the lock file under `locks_dir`
    pub fn for_volume(locks_dir: &Path, volume: &str) -> Self {
        Self {
            path: locks_dir.join(format!("{volume}.lock")),
            volume: volume.to_string(),
        }
    }

    /// The lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempt a non-blocking acquire; `None` when another holder exists
    pub fn try_acquire(&self) -> KilnResult<Option<BuildLockGuard>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| KilnError::LockFile {
                path: self.path.clone(),
                reason: format!("creating lock directory: {e}"),
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| KilnError::LockFile {
                path: self.path.clone(),
                reason: format!("opening: {e}"),
            })?;

        match try_flock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => {
                return Err(KilnError::LockFile {
                    path: self.path.clone(),
                    reason: format!("flock: {e}"),
                })
            }
        }

        self.write_metadata(&file)?;
        debug!("Acquired build lock on {}", self.volume);

        Ok(Some(BuildLockGuard {
            _file: file,
            volume: self.volume.clone(),
            acquired_at: Instant::now(),
        }))
    }

    /// Acquire the lock, waiting until it is free.
    ///
    /// `wait` of `None` blocks indefinitely; `Some(limit)` yields
    /// [`KilnError::LockTimeout`] once the limit elapses. Cancellation is
    /// checked between polls.
    pub async fn acquire(
        &self,
        wait: Option<Duration>,
        poll: Duration,
        cancel: &CancelToken,
    ) -> KilnResult<BuildLockGuard> {
        let started = Instant::now();

        loop {
            if let Some(guard) = self.try_acquire()? {
                return Ok(guard);
            }

            if let Some(limit) = wait {
                if started.elapsed() >= limit {
                    return Err(KilnError::LockTimeout {
                        volume: self.volume.clone(),
                        waited_secs: started.elapsed().as_secs(),
                    });
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = cancel.cancelled() => return Err(KilnError::Cancelled),
            }
        }
    }

    fn write_metadata(&self, file: &File) -> KilnResult<()> {
        let metadata = LockMetadata {
            pid: std::process::id(),
            volume: self.volume.clone(),
            acquired_at: Utc::now(),
        };

        let write = |mut f: &File| -> io::Result<()> {
            f.set_len(0)?;
            let body = serde_json::to_vec_pretty(&metadata).map_err(io::Error::other)?;
            f.write_all(&body)?;
            f.flush()
        };

        write(file).map_err(|e| KilnError::LockFile {
            path: self.path.clone(),
            reason: format!("writing metadata: {e}"),
        })
    }
}

#[cfg(unix)]
fn try_flock_exclusive(file: &File) -> io::Result<()> {
    use rustix::fs::{flock, FlockOperation};
    use std::os::unix::io::AsFd;

    flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
        .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const POLL: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let lock = BuildLock::for_volume(dir.path(), "proj_cache");

        let guard = lock
            .acquire(None, POLL, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(guard.volume(), "proj_cache");
        assert!(lock.path().exists());
    }

    #[tokio::test]
    async fn contended_try_acquire_returns_none() {
        let dir = TempDir::new().unwrap();
        let lock = BuildLock::for_volume(dir.path(), "proj_cache");

        let _held = lock.try_acquire().unwrap().expect("first acquire");
        assert!(lock.try_acquire().unwrap().is_none());
    }

    #[tokio::test]
    async fn released_on_drop() {
        let dir = TempDir::new().unwrap();
        let lock = BuildLock::for_volume(dir.path(), "proj_cache");

        {
            let _guard = lock.try_acquire().unwrap().expect("first acquire");
        }

        assert!(lock.try_acquire().unwrap().is_some());
    }

    #[tokio::test]
    async fn bounded_wait_times_out() {
        let dir = TempDir::new().unwrap();
        let lock = BuildLock::for_volume(dir.path(), "proj_cache");
        let _held = lock.try_acquire().unwrap().expect("first acquire");

        let err = lock
            .acquire(Some(Duration::from_millis(50)), POLL, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KilnError::LockTimeout { .. }));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_wait() {
        let dir = TempDir::new().unwrap();
        let lock = BuildLock::for_volume(dir.path(), "proj_cache");
        let _held = lock.try_acquire().unwrap().expect("first acquire");

        let cancel = CancelToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = lock.acquire(None, POLL, &cancel).await.unwrap_err();
        assert!(matches!(err, KilnError::Cancelled));
    }

    #[tokio::test]
    async fn disjoint_volumes_do_not_contend() {
        let dir = TempDir::new().unwrap();
        let a = BuildLock::for_volume(dir.path(), "alpha_cache");
        let b = BuildLock::for_volume(dir.path(), "beta_cache");

        let _ga = a.try_acquire().unwrap().expect("alpha");
        let _gb = b.try_acquire().unwrap().expect("beta held concurrently");
    }

    #[tokio::test]
    async fn hold_intervals_never_overlap() {
        let dir = TempDir::new().unwrap();
        let dir_path = dir.path().to_path_buf();
        let intervals: Arc<Mutex<Vec<(Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let dir_path = dir_path.clone();
            let intervals = Arc::clone(&intervals);
            handles.push(tokio::spawn(async move {
                let lock = BuildLock::for_volume(&dir_path, "shared_cache");
                let guard = lock
                    .acquire(None, POLL, &CancelToken::new())
                    .await
                    .unwrap();
                let start = Instant::now();
                tokio::time::sleep(Duration::from_millis(25)).await;
                let end = Instant::now();
                drop(guard);
                intervals.lock().unwrap().push((start, end));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut held = intervals.lock().unwrap().clone();
        held.sort_by_key(|(start, _)| *start);
        assert_eq!(held.len(), 4);
        for pair in held.windows(2) {
            let (_, prev_end) = pair[0];
            let (next_start, _) = pair[1];
            assert!(
                prev_end <= next_start,
                "lock hold intervals overlapped: {prev_end:?} > {next_start:?}"
            );
        }
    }

    #[test]
    fn metadata_is_readable_while_held() {
        let dir = TempDir::new().unwrap();
        let lock = BuildLock::for_volume(dir.path(), "proj_cache");
        let _guard = lock.try_acquire().unwrap().expect("acquire");

        let contents = fs::read_to_string(lock.path()).unwrap();
        let metadata: LockMetadata = serde_json::from_str(&contents).unwrap();
        assert_eq!(metadata.pid, std::process::id());
        assert_eq!(metadata.volume, "proj_cache");
    }
}
