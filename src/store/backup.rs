use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::Connection;

use super::Store;
use crate::error::{IdsError, Result};

impl Store {
    /// Produces a standalone, integrity-clean copy of the database as of the
    /// moment this call returns, using SQLite's online backup API so
    /// concurrent writers are never blocked out and never see a torn read.
    pub fn backup_snapshot(&self) -> Result<Vec<u8>> {
        let tmp_path = std::env::temp_dir().join(format!(
            ".vigilnet-backup-{}-{}.sqlite3",
            std::process::id(),
            super::new_id()
        ));

        {
            let conn = self.reader.lock().unwrap();
            let mut dst = Connection::open(&tmp_path)?;
            let backup = Backup::new(&conn, &mut dst)
                .map_err(|e| IdsError::Storage(format!("backup init failed: {e}")))?;
            backup
                .run_to_completion(5, Duration::from_millis(50), None)
                .map_err(|e| IdsError::Storage(format!("backup failed: {e}")))?;
        }

        let bytes = std::fs::read(&tmp_path)?;
        std::fs::remove_file(&tmp_path).ok();
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::open_memory_db;

    #[test]
    fn snapshot_is_a_standalone_readable_database() {
        let store = open_memory_db();
        store.add_alert("1.2.3.4", "hit", "low", "SIGNATURE").unwrap();
        let bytes = store.backup_snapshot().unwrap();
        assert!(!bytes.is_empty());

        let path = std::env::temp_dir().join(format!("vigilnet-snapshot-test-{}.sqlite3", std::process::id()));
        std::fs::write(&path, &bytes).unwrap();
        let reopened = crate::store::Store::open(&path).unwrap();
        assert_eq!(reopened.integrity_check().unwrap(), "ok");
        assert_eq!(reopened.list_alerts(10, None).unwrap().len(), 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn snapshot_reflects_rows_committed_before_the_call() {
        let store = open_memory_db();
        store.add_block("9.9.9.9", "block", "auto-high", None).unwrap();
        let bytes = store.backup_snapshot().unwrap();
        assert!(bytes.len() > 0);
    }
}
