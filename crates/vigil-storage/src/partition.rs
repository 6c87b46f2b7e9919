use crate::error::{Result, StorageError};
use crate::PartitionInfo;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SAMPLES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    cpu REAL NOT NULL,
    ram REAL NOT NULL,
    received_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_samples_agent_time
    ON samples(agent_id, timestamp);
";

const PARTITION_DATE_FORMAT: &str = "%Y-%m-%d";

/// Daily SQLite partitions for delivered samples, keyed by the sample's own
/// timestamp (`YYYY-MM-DD.db`).
pub struct PartitionManager {
    data_dir: PathBuf,
    connections: Mutex<HashMap<String, Connection>>,
}

impl PartitionManager {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            connections: Mutex::new(HashMap::new()),
        })
    }

    /// Lock the connections map, recovering from a poisoned Mutex if necessary.
    fn lock_connections(&self) -> MutexGuard<'_, HashMap<String, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn partition_key(ts: DateTime<Utc>) -> String {
        ts.format(PARTITION_DATE_FORMAT).to_string()
    }

    fn partition_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.db"))
    }

    fn open_partition(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SAMPLES_SCHEMA)?;
        Ok(conn)
    }

    /// Returns the key of the partition holding `ts`, creating it on first use.
    pub fn get_or_create(&self, ts: DateTime<Utc>) -> Result<String> {
        let key = Self::partition_key(ts);
        let mut conns = self.lock_connections();
        if !conns.contains_key(&key) {
            let path = self.partition_path(&key);
            let existed = path.exists();
            let conn = Self::open_partition(&path)?;
            if !existed {
                tracing::info!(partition = %key, "Created new partition");
            }
            conns.insert(key.clone(), conn);
        }
        Ok(key)
    }

    pub fn with_partition<F, R>(&self, key: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let mut conns = self.lock_connections();
        if !conns.contains_key(key) {
            let path = self.partition_path(key);
            if !path.exists() {
                return Err(StorageError::PartitionNotFound(key.to_string()));
            }
            conns.insert(key.to_string(), Self::open_partition(&path)?);
        }
        let conn = conns
            .get(key)
            .ok_or_else(|| StorageError::PartitionNotFound(key.to_string()))?;
        f(conn)
    }

    /// Partition keys present on disk, newest first.
    pub fn keys_newest_first(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .scan_partition_files()?
            .into_iter()
            .map(|(date, _)| date)
            .collect();
        keys.sort_by(|a, b| b.cmp(a));
        Ok(keys)
    }

    fn scan_partition_files(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(date_str) = name.strip_suffix(".db") {
                if NaiveDate::parse_from_str(date_str, PARTITION_DATE_FORMAT).is_ok() {
                    found.push((date_str.to_string(), entry.path()));
                }
            }
        }
        Ok(found)
    }

    pub fn cleanup_older_than(&self, retention_days: u32) -> Result<u32> {
        let Some(cutoff) =
            Utc::now().checked_sub_signed(chrono::Duration::days(i64::from(retention_days)))
        else {
            return Ok(0);
        };
        let cutoff_date = cutoff.date_naive();
        let mut removed = 0u32;

        let expired: Vec<(String, PathBuf)> = self
            .scan_partition_files()?
            .into_iter()
            .filter(|(date_str, _)| {
                NaiveDate::parse_from_str(date_str, PARTITION_DATE_FORMAT)
                    .map(|date| date < cutoff_date)
                    .unwrap_or(false)
            })
            .collect();

        // Best-effort: log errors, don't abort
        for (date_str, db_path) in &expired {
            // Dropping the Connection checkpoints the WAL
            self.lock_connections().remove(date_str.as_str());

            if let Err(e) = std::fs::remove_file(db_path) {
                tracing::error!(partition = %date_str, error = %e, "Failed to remove partition file");
                continue;
            }
            for suffix in ["db-wal", "db-shm"] {
                let aux = self.data_dir.join(format!("{date_str}.{suffix}"));
                if aux.exists() {
                    if let Err(e) = std::fs::remove_file(&aux) {
                        tracing::warn!(path = %aux.display(), error = %e, "Failed to remove partition side file");
                    }
                }
            }

            tracing::info!(partition = %date_str, "Removed expired partition");
            removed += 1;
        }

        Ok(removed)
    }

    /// Returns information about all existing partitions on disk, oldest first.
    pub fn list_partition_info(&self) -> Result<Vec<PartitionInfo>> {
        let mut infos = Vec::new();
        for (date, path) in self.scan_partition_files()? {
            let metadata = std::fs::metadata(&path)?;
            infos.push(PartitionInfo {
                date,
                size_bytes: metadata.len(),
                path: path.to_string_lossy().to_string(),
            });
        }
        infos.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_cleanup_removes_expired_partitions_and_wal_files() {
        let tmp = TempDir::new().unwrap();
        let pm = PartitionManager::new(tmp.path()).unwrap();

        let old_key = pm.get_or_create(Utc::now() - Duration::days(10)).unwrap();
        let old_db = tmp.path().join(format!("{old_key}.db"));
        let today_key = pm.get_or_create(Utc::now()).unwrap();
        let today_db = tmp.path().join(format!("{today_key}.db"));
        assert!(old_db.exists());
        assert!(today_db.exists());

        let old_wal = tmp.path().join(format!("{old_key}.db-wal"));
        let old_shm = tmp.path().join(format!("{old_key}.db-shm"));
        std::fs::write(&old_wal, b"wal data").unwrap();
        std::fs::write(&old_shm, b"shm data").unwrap();

        let removed = pm.cleanup_older_than(7).unwrap();

        assert_eq!(removed, 1);
        assert!(!old_db.exists(), "old .db should be deleted");
        assert!(!old_wal.exists(), "old .db-wal should be deleted");
        assert!(!old_shm.exists(), "old .db-shm should be deleted");
        assert!(today_db.exists(), "today partition should still exist");
    }

    #[test]
    fn test_keys_ignore_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let pm = PartitionManager::new(tmp.path()).unwrap();
        pm.get_or_create(Utc::now() - Duration::days(1)).unwrap();
        pm.get_or_create(Utc::now()).unwrap();
        std::fs::write(tmp.path().join("control.db"), b"").unwrap();

        let keys = pm.keys_newest_first().unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys[0] > keys[1]);
    }

    #[test]
    fn test_with_partition_missing_key() {
        let tmp = TempDir::new().unwrap();
        let pm = PartitionManager::new(tmp.path()).unwrap();
        let err = pm.with_partition("1999-01-01", |_| Ok(())).unwrap_err();
        assert!(matches!(err, StorageError::PartitionNotFound(_)));
    }
}
