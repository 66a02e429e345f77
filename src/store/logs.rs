use rusqlite::params;

use super::{new_id, now_rfc3339, Store};
use crate::error::Result;
use crate::model::LogEvent;

impl Store {
    pub fn insert_log_event(&self, level: &str, source: &str, message: &str) -> Result<()> {
        let event = LogEvent {
            id: new_id(),
            ts: now_rfc3339(),
            level: level.to_string(),
            source: source.to_string(),
            message: message.to_string(),
        };
        self.with_transaction(|tx| {
            tx.prepare_cached("INSERT INTO logs (id, ts, level, source, message) VALUES (?1, ?2, ?3, ?4, ?5)")?
                .execute(params![event.id, event.ts, event.level, event.source, event.message])?;
            Ok(())
        })
    }

    /// Newest-first, filtered by optional exact-match `level`/`source`.
    pub fn list_log_events_filtered(
        &self,
        level: Option<&str>,
        source: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LogEvent>> {
        let conn = self.reader.lock().unwrap();
        let sql = "SELECT id, ts, level, source, message FROM logs
                   WHERE (?1 IS NULL OR level = ?1) AND (?2 IS NULL OR source = ?2)
                   ORDER BY ts DESC, id DESC LIMIT ?3";
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![level, source, limit as i64], |row| {
            Ok(LogEvent {
                id: row.get(0)?,
                ts: row.get(1)?,
                level: row.get(2)?,
                source: row.get(3)?,
                message: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::open_memory_db;

    #[test]
    fn insert_then_list_round_trips() {
        let store = open_memory_db();
        store.insert_log_event("info", "monitor", "started").unwrap();
        let events = store.list_log_events_filtered(None, None, 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "started");
    }

    #[test]
    fn filters_by_level_and_source() {
        let store = open_memory_db();
        store.insert_log_event("info", "monitor", "ok").unwrap();
        store.insert_log_event("warn", "monitor", "degraded").unwrap();
        store.insert_log_event("warn", "retrain", "skipped").unwrap();

        let warns = store.list_log_events_filtered(Some("warn"), None, 10).unwrap();
        assert_eq!(warns.len(), 2);

        let monitor_warns = store.list_log_events_filtered(Some("warn"), Some("monitor"), 10).unwrap();
        assert_eq!(monitor_warns.len(), 1);
        assert_eq!(monitor_warns[0].message, "degraded");
    }

    #[test]
    fn list_is_newest_first() {
        let store = open_memory_db();
        store.insert_log_event("info", "a", "first").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.insert_log_event("info", "a", "second").unwrap();
        let events = store.list_log_events_filtered(None, None, 10).unwrap();
        assert_eq!(events[0].message, "second");
    }
}
