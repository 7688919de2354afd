use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use chrono::NaiveDate;

use crate::utils::duration::diff_clock;

use super::{entities::Session, store::EntryStore};

/// What the presentation layer works with: the list of sessions currently on screen plus the
/// operations it may trigger. It holds no business logic of its own beyond keeping that list in
/// sync with [EntryStore].
pub struct DailyCases {
    store: Arc<EntryStore>,
    view: RwLock<Vec<Session>>,
    initial: Vec<Session>,
}

impl DailyCases {
    /// Starts from today's bucket if there is one, otherwise from `initial`.
    pub fn new(store: Arc<EntryStore>, initial: Vec<Session>) -> Self {
        let today = store.today();
        let view = if store.has_bucket(today) {
            store.entries_for_date(today)
        } else {
            initial.clone()
        };
        Self {
            store,
            view: RwLock::new(view),
            initial,
        }
    }

    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    pub fn all_cases(&self) -> Vec<Session> {
        self.view().clone()
    }

    pub fn find(&self, id: &str) -> Option<Session> {
        self.view().iter().find(|v| &*v.id == id).cloned()
    }

    /// Updates the list from its previous value and schedules today's bucket to be written.
    pub fn set_all_cases(&self, update: impl FnOnce(Vec<Session>) -> Vec<Session>) {
        let next = {
            let mut view = self.view_mut();
            let next = update(std::mem::take(&mut *view));
            *view = next.clone();
            next
        };
        self.store.upsert_today(next);
    }

    /// Re-reads persisted entries and shows today's sessions.
    pub async fn refresh_cases(&self) -> Result<()> {
        let today = self.store.today();
        let entries = self.store.load().await?;
        *self.view_mut() = entries.bucket(today).to_vec();
        Ok(())
    }

    pub fn refresh_cases_for_date(&self, date: NaiveDate) {
        *self.view_mut() = self.store.entries_for_date(date);
    }

    /// Deletes the session from whichever day holds it. On success the list shows every stored
    /// session.
    pub async fn delete_case(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete_by_id(id).await?;
        if deleted {
            *self.view_mut() = self.store.all_sessions();
        }
        Ok(deleted)
    }

    pub async fn edit_case(&self, session: &Session) -> Result<bool> {
        let edited = self.store.edit_by_id(session).await?;
        if edited {
            *self.view_mut() = self.store.all_sessions();
        }
        Ok(edited)
    }

    pub fn calculate_total_time(&self, start_time: &str, end_time: &str) -> String {
        diff_clock(start_time, end_time)
    }

    pub fn get_entries_for_date(&self, date: NaiveDate) -> Vec<Session> {
        self.store.entries_for_date(date)
    }

    pub fn get_available_dates(&self) -> Vec<NaiveDate> {
        self.store.available_dates()
    }

    pub async fn reset_today(&self) -> Result<()> {
        self.store.reset_today().await?;
        *self.view_mut() = self.initial.clone();
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }

    fn view(&self) -> RwLockReadGuard<'_, Vec<Session>> {
        self.view.read().unwrap_or_else(|e| e.into_inner())
    }

    fn view_mut(&self) -> RwLockWriteGuard<'_, Vec<Session>> {
        self.view.write().unwrap_or_else(|e| e.into_inner())
    }
}
