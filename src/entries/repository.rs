use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::Result;
use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::debug;

use super::entities::DailyEntries;

/// Name of the single record holding every day. Plays the role of a fixed storage key.
pub const ENTRIES_FILE: &str = "entries.json";
const LOCK_FILE: &str = "entries.lock";
const TEMP_FILE: &str = "entries.json.tmp";

/// Interface for abstracting durable storage of [DailyEntries]. The mapping is always read and
/// written as a whole.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntryRepository: Send + Sync + 'static {
    /// Missing or unreadable content is an empty mapping, not an error.
    async fn load(&self) -> Result<DailyEntries>;

    /// Overwrites whatever is stored.
    async fn save(&self, entries: &DailyEntries) -> Result<()>;

    /// Merges the changes `local` made since `base` into what is stored right now and stores
    /// the result, all in one step. Other processes may have written since `base` was read.
    async fn sync(&self, base: &DailyEntries, local: &DailyEntries) -> Result<DailyEntries>;
}

/// The main realization of [EntryRepository]. Keeps everything in one JSON file inside
/// `entries_dir`.
pub struct JsonFileRepository {
    entries_dir: PathBuf,
}

impl JsonFileRepository {
    pub fn new(entries_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&entries_dir)?;

        Ok(Self { entries_dir })
    }

    pub fn entries_path(&self) -> PathBuf {
        self.entries_dir.join(ENTRIES_FILE)
    }

    async fn open_lock(&self) -> Result<File, std::io::Error> {
        File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.entries_dir.join(LOCK_FILE))
            .await
    }

    async fn read_inner(path: &Path) -> Result<String, std::io::Error> {
        let mut raw = String::new();
        match File::open(path).await {
            Ok(mut file) => {
                file.read_to_string(&mut raw).await?;
                Ok(raw)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(raw),
            Err(e) => Err(e),
        }
    }

    /// Has to be called with the lock held.
    async fn read_entries(&self) -> Result<DailyEntries> {
        let raw = Self::read_inner(&self.entries_path()).await?;
        if raw.trim().is_empty() {
            return Ok(DailyEntries::default());
        }
        Ok(DailyEntries::from_json(&raw))
    }

    /// Has to be called with the lock held exclusively. Readers never see a partial file.
    async fn replace_entries(&self, entries: &DailyEntries) -> Result<()> {
        let buffer = entries.to_json()?;
        let temp_path = self.entries_dir.join(TEMP_FILE);
        let mut file = File::create(&temp_path).await?;
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        tokio::fs::rename(&temp_path, self.entries_path()).await?;
        Ok(())
    }
}

#[async_trait]
impl EntryRepository for JsonFileRepository {
    async fn load(&self) -> Result<DailyEntries> {
        debug!("Loading entries from {:?}", self.entries_path());

        let lock = self.open_lock().await?;
        lock.lock_shared()?;
        let entries = self.read_entries().await;
        lock.unlock_async().await?;
        entries
    }

    async fn save(&self, entries: &DailyEntries) -> Result<()> {
        let lock = self.open_lock().await?;
        lock.lock_exclusive()?;
        let result = self.replace_entries(entries).await;
        lock.unlock_async().await?;

        result?;
        debug!("Saved {} days of entries", entries.dates().len());
        Ok(())
    }

    async fn sync(&self, base: &DailyEntries, local: &DailyEntries) -> Result<DailyEntries> {
        let lock = self.open_lock().await?;
        lock.lock_exclusive()?;
        let result = async {
            let remote = self.read_entries().await?;
            let merged = DailyEntries::merge(base, local, &remote);
            self.replace_entries(&merged).await?;
            Ok::<_, anyhow::Error>(merged)
        }
        .await;
        lock.unlock_async().await?;

        let merged = result?;
        debug!("Synced {} days of entries", merged.dates().len());
        Ok(merged)
    }
}

/// Keeps the serialized mapping in memory. Used where nothing should touch the disk.
#[derive(Default)]
pub struct InMemoryRepository {
    raw: Mutex<Option<String>>,
}

impl InMemoryRepository {
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.raw
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl EntryRepository for InMemoryRepository {
    async fn load(&self) -> Result<DailyEntries> {
        Ok(self
            .raw()
            .map(|raw| DailyEntries::from_json(&raw))
            .unwrap_or_default())
    }

    async fn save(&self, entries: &DailyEntries) -> Result<()> {
        let raw = entries.to_json()?;
        *self.raw.lock().unwrap_or_else(|e| e.into_inner()) = Some(raw);
        Ok(())
    }

    async fn sync(&self, base: &DailyEntries, local: &DailyEntries) -> Result<DailyEntries> {
        let mut raw = self.raw.lock().unwrap_or_else(|e| e.into_inner());
        let remote = raw
            .as_deref()
            .map(DailyEntries::from_json)
            .unwrap_or_default();
        let merged = DailyEntries::merge(base, local, &remote);
        *raw = Some(merged.to_json()?);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;
    use crate::entries::entities::tests::{closed, TEST_DATE};

    #[tokio::test]
    async fn test_file_repository_missing_file() -> Result<()> {
        let dir = tempdir()?;
        let repository = JsonFileRepository::new(dir.path().join("entries"))?;
        assert_eq!(repository.load().await?, DailyEntries::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_file_repository_basic() -> Result<()> {
        let dir = tempdir()?;
        let repository = JsonFileRepository::new(dir.path().to_owned())?;
        let mut entries = DailyEntries::default();
        entries.set_bucket(
            TEST_DATE,
            vec![
                closed("a", "Acme", "Review", "00:01:00"),
                closed("b", "Acme", "Call", "00:02:30"),
            ],
        );

        repository.save(&entries).await?;
        assert_eq!(repository.load().await?, entries);

        entries.remove_bucket(TEST_DATE);
        repository.save(&entries).await?;
        assert_eq!(repository.load().await?, DailyEntries::default());
        assert!(!dir.path().join(TEMP_FILE).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_file_repository_corrupted() -> Result<()> {
        let dir = tempdir()?;
        let repository = JsonFileRepository::new(dir.path().to_owned())?;
        tokio::fs::write(repository.entries_path(), b"{\"2018-07-04\": [tru").await?;
        assert_eq!(repository.load().await?, DailyEntries::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_file_repository_sync_keeps_foreign_changes() -> Result<()> {
        let dir = tempdir()?;
        let repository = JsonFileRepository::new(dir.path().to_owned())?;
        let mut base = DailyEntries::default();
        base.set_bucket(
            TEST_DATE,
            vec![
                closed("a", "Acme", "Review", "00:01:00"),
                closed("b", "Acme", "Call", "00:02:30"),
            ],
        );
        repository.save(&base).await?;

        // Someone else removes "a" while this copy adds "c".
        let mut foreign = base.clone();
        foreign.delete_by_id("a");
        repository.save(&foreign).await?;

        let mut local = base.clone();
        let mut today = local.bucket(TEST_DATE).to_vec();
        today.insert(0, closed("c", "Other", "Call", "00:00:05"));
        local.set_bucket(TEST_DATE, today);

        let merged = repository.sync(&base, &local).await?;
        assert_eq!(repository.load().await?, merged);
        let ids = merged
            .bucket(TEST_DATE)
            .iter()
            .map(|v| v.id.to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["c", "b"]);
        assert!(!dir.path().join(TEMP_FILE).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_in_memory_repository() -> Result<()> {
        let repository = InMemoryRepository::default();
        assert_eq!(repository.load().await?, DailyEntries::default());

        let mut entries = DailyEntries::default();
        entries.set_bucket(TEST_DATE, vec![closed("a", "Acme", "Review", "00:01:00")]);
        repository.save(&entries).await?;
        assert_eq!(repository.load().await?, entries);

        let broken = InMemoryRepository::with_raw("garbage");
        assert_eq!(broken.load().await?, DailyEntries::default());
        Ok(())
    }
}
