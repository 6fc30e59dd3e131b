//! Per-document lock files

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use appnet_core::{NetworkError, Result};

/// Default bound on lock acquisition
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Contents of a lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub timestamp: u64,
    pub caller: String,
}

/// Exclusive lock on one persisted document, released on drop
#[derive(Debug)]
pub struct DocumentLock {
    path: PathBuf,
    info: LockInfo,
}

impl DocumentLock {
    /// Acquire the lock for `document` inside `dir`, waiting at most `timeout`.
    pub async fn acquire(
        dir: &Path,
        document: &str,
        caller: &str,
        timeout: Duration,
    ) -> Result<Self> {
        fs::create_dir_all(dir).await?;

        let path = dir.join(format!(".{}.lock", document));
        let info = LockInfo {
            pid: std::process::id(),
            timestamp: unix_now(),
            caller: caller.to_string(),
        };

        let started = Instant::now();
        loop {
            if Self::try_create(&path, &info).await? {
                debug!("{} locked {}", caller, document);
                return Ok(Self { path, info });
            }

            if Self::break_if_stale(&path, timeout).await? {
                continue;
            }

            if started.elapsed() >= timeout {
                return Err(NetworkError::LockTimeout {
                    document: document.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    async fn try_create(path: &Path, info: &LockInfo) -> Result<bool> {
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        file.write_all(&serde_json::to_vec(info)?).await?;
        file.sync_all().await?;
        Ok(true)
    }

    /// Remove a lock whose holder is gone. Returns true if one was removed.
    async fn break_if_stale(path: &Path, timeout: Duration) -> Result<bool> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            // released between our attempts
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        let stale = match serde_json::from_str::<LockInfo>(&content) {
            Ok(holder) => !process_running(holder.pid),
            // a holder may be mid-write; only give up on it once it is old
            Err(_) => {
                let modified = fs::metadata(path).await?.modified()?;
                modified.elapsed().unwrap_or_default() > timeout
            }
        };

        if stale {
            warn!("Breaking stale lock {:?}", path);
            match fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(stale)
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release lock {:?}: {}", self.path, e);
        }
    }
}

fn process_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
