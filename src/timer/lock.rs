use std::{io::ErrorKind, path::Path};

use anyhow::Result;
use fs4::{lock_contended_error, tokio::AsyncFileExt};
use tokio::fs::File;
use tracing::debug;

const TIMER_LOCK_FILE: &str = "timer.lock";

/// Held by the process that is currently timing a session. Only one timer runs at a time, no
/// matter how many processes share the entries directory. Released when dropped.
pub struct TimerLock {
    _file: File,
}

impl TimerLock {
    /// Returns `None` when another process holds the lock.
    pub async fn acquire(entries_dir: &Path) -> Result<Option<Self>> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(entries_dir.join(TIMER_LOCK_FILE))
            .await?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { _file: file })),
            Err(e)
                if e.kind() == ErrorKind::WouldBlock
                    || e.raw_os_error() == lock_contended_error().raw_os_error() =>
            {
                debug!("Timer lock is held by another process");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
