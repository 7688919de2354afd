use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use anyhow::Result;
use chrono::NaiveDate;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::utils::clock::Clock;

use super::{
    entities::{DailyEntries, Session},
    repository::EntryRepository,
};

/// Write scheduled by [EntryStore::upsert_today] that hasn't happened yet.
struct PendingWrite {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// State shared with the task performing a scheduled write.
struct Shared {
    repository: Arc<dyn EntryRepository>,
    entries: RwLock<DailyEntries>,
    /// What this store last read from or wrote to the repository.
    base: RwLock<DailyEntries>,
    /// Ids removed through this store or by another process since it was opened.
    deleted: Mutex<HashSet<Arc<str>>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl Shared {
    /// Every write stores the snapshot as it is when the write happens, so a newer write always
    /// carries at least as much as an older one. Changes made by other processes since the last
    /// write are merged in instead of being overwritten.
    async fn write(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let base = read_entries(&self.base).clone();
        let local = read_entries(&self.entries).clone();

        let merged = self.repository.sync(&base, &local).await?;

        let kept = merged.ids();
        let removed = local
            .ids()
            .into_iter()
            .filter(|id| !kept.contains(id))
            .collect::<Vec<_>>();
        if !removed.is_empty() {
            debug!("Sessions removed elsewhere {removed:?}");
            lock_deleted(&self.deleted).extend(removed);
        }

        {
            // Changes made while the write was in flight stay on top of the merged result.
            let mut entries = write_entries(&self.entries);
            let current = std::mem::take(&mut *entries);
            *entries = DailyEntries::merge(&local, &current, &merged);
        }
        *write_entries(&self.base) = merged;
        Ok(())
    }
}

/// Owns every persisted session. Readers get data from an in-memory snapshot that is only ever
/// replaced as a whole, so browsing one day while today's timer writes never sees a half
/// updated mapping.
///
/// Rapid updates of today's bucket are coalesced: the snapshot changes immediately, the durable
/// write happens once the debounce window passes without another update. Dropping the store
/// cancels a write that hasn't happened yet, call [EntryStore::flush] before shutting down.
pub struct EntryStore {
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
    debounce: Duration,
    pending: Mutex<Option<PendingWrite>>,
}

impl EntryStore {
    /// Loads persisted entries. Storage failures are logged and result in an empty store.
    pub async fn open(
        repository: Arc<dyn EntryRepository>,
        clock: Arc<dyn Clock>,
        debounce: Duration,
    ) -> Self {
        let entries = load_or_empty(repository.as_ref()).await;
        Self {
            shared: Arc::new(Shared {
                repository,
                base: RwLock::new(entries.clone()),
                entries: RwLock::new(entries),
                deleted: Mutex::new(HashSet::new()),
                write_lock: tokio::sync::Mutex::new(()),
            }),
            clock,
            debounce,
            pending: Mutex::new(None),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.time().date_naive()
    }

    /// Replaces the snapshot with what is currently persisted. A pending write is flushed first
    /// so nothing written through this store gets lost.
    pub async fn load(&self) -> Result<DailyEntries> {
        self.flush().await?;
        let entries = load_or_empty(self.shared.repository.as_ref()).await;
        *write_entries(&self.shared.entries) = entries.clone();
        *write_entries(&self.shared.base) = entries.clone();
        Ok(entries)
    }

    /// Overwrites the whole persisted mapping.
    pub async fn save(&self, entries: DailyEntries) -> Result<()> {
        if let Some(pending) = self.take_pending() {
            pending.token.cancel();
        }
        let _guard = self.shared.write_lock.lock().await;
        *write_entries(&self.shared.entries) = entries.clone();
        self.shared.repository.save(&entries).await?;
        *write_entries(&self.shared.base) = entries;
        Ok(())
    }

    pub fn snapshot(&self) -> DailyEntries {
        read_entries(&self.shared.entries).clone()
    }

    pub fn has_bucket(&self, date: NaiveDate) -> bool {
        read_entries(&self.shared.entries).contains(date)
    }

    pub fn entries_for_date(&self, date: NaiveDate) -> Vec<Session> {
        read_entries(&self.shared.entries).bucket(date).to_vec()
    }

    pub fn available_dates(&self) -> Vec<NaiveDate> {
        read_entries(&self.shared.entries).dates()
    }

    pub fn all_sessions(&self) -> Vec<Session> {
        read_entries(&self.shared.entries).all_sessions()
    }

    /// Replaces today's bucket. A session that belongs to another day is updated in that day's
    /// bucket instead of being copied into today, so a timer started before midnight is closed
    /// where it was opened. Sessions deleted through any store are not brought back.
    ///
    /// Must be called within a tokio runtime, the durable write is a spawned task.
    pub fn upsert_today(&self, sessions: Vec<Session>) {
        let today = self.today();
        {
            let deleted = lock_deleted(&self.shared.deleted);
            let mut entries = write_entries(&self.shared.entries);
            let mut current = Vec::with_capacity(sessions.len());
            for session in sessions {
                if deleted.contains(&session.id) {
                    trace!("Skipping deleted session {}", session.id);
                    continue;
                }
                match entries.owner_of(&session.id) {
                    Some(day) if day != today => {
                        entries.edit_by_id(&session);
                    }
                    _ => current.push(session),
                }
            }
            if !current.is_empty() || entries.contains(today) {
                entries.set_bucket(today, current);
            }
        }
        self.schedule_write();
    }

    /// Removes the session from every day. Unknown ids leave the store untouched.
    #[instrument(skip(self))]
    pub async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let removed = write_entries(&self.shared.entries).delete_by_id(id);
        if !removed {
            debug!("No session to delete");
            return Ok(false);
        }
        lock_deleted(&self.shared.deleted).insert(id.into());
        self.persist_now().await?;
        info!("Deleted session");
        Ok(true)
    }

    /// Replaces the session with the same id wherever it's stored. Unknown ids leave the store
    /// untouched.
    #[instrument(skip(self, session), fields(id = %session.id))]
    pub async fn edit_by_id(&self, session: &Session) -> Result<bool> {
        let found = write_entries(&self.shared.entries).edit_by_id(session);
        if !found {
            debug!("No session to edit");
            return Ok(false);
        }
        self.persist_now().await?;
        info!("Edited session");
        Ok(true)
    }

    /// Drops today's bucket. Other days are untouched.
    pub async fn reset_today(&self) -> Result<()> {
        let today = self.today();
        let removed = write_entries(&self.shared.entries).remove_bucket(today);
        info!(
            "Reset {today}, dropped {} sessions",
            removed.map_or(0, |v| v.len())
        );
        self.persist_now().await
    }

    /// Performs a scheduled write right away.
    pub async fn flush(&self) -> Result<()> {
        let Some(pending) = self.take_pending() else {
            return Ok(());
        };
        pending.token.cancel();
        if pending.handle.is_finished() {
            trace!("Scheduled write already happened");
            return Ok(());
        }
        self.shared.write().await
    }

    /// Forgets a scheduled write. Used on teardown.
    pub fn cancel_pending(&self) {
        if let Some(pending) = self.take_pending() {
            if !pending.handle.is_finished() {
                warn!("Cancelling a write that hasn't happened yet");
            }
            pending.token.cancel();
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingWrite>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_pending(&self) -> Option<PendingWrite> {
        self.pending().take()
    }

    async fn persist_now(&self) -> Result<()> {
        if let Some(pending) = self.take_pending() {
            pending.token.cancel();
        }
        self.shared.write().await
    }

    fn schedule_write(&self) {
        let mut pending = self.pending();
        if let Some(previous) = pending.take() {
            previous.token.cancel();
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let clock = self.clock.clone();
        let debounce = self.debounce;
        let shared = self.shared.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {
                    trace!("Scheduled write superseded");
                }
                _ = clock.sleep(debounce) => {
                    if let Err(e) = shared.write().await {
                        error!("Failed to save entries {e:?}");
                    }
                }
            }
        });

        *pending = Some(PendingWrite { token, handle });
    }
}

impl Drop for EntryStore {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

async fn load_or_empty(repository: &dyn EntryRepository) -> DailyEntries {
    match repository.load().await {
        Ok(v) => v,
        Err(e) => {
            warn!("Couldn't load entries, using an empty mapping {e:?}");
            DailyEntries::default()
        }
    }
}

fn read_entries(entries: &RwLock<DailyEntries>) -> RwLockReadGuard<'_, DailyEntries> {
    entries.read().unwrap_or_else(|e| e.into_inner())
}

fn write_entries(entries: &RwLock<DailyEntries>) -> RwLockWriteGuard<'_, DailyEntries> {
    entries.write().unwrap_or_else(|e| e.into_inner())
}

fn lock_deleted(deleted: &Mutex<HashSet<Arc<str>>>) -> MutexGuard<'_, HashSet<Arc<str>>> {
    deleted.lock().unwrap_or_else(|e| e.into_inner())
}
