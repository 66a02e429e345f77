use rusqlite::params;

use super::{new_id, now_rfc3339, Store};
use crate::error::Result;
use crate::model::Alert;

impl Store {
    /// Generates an id and timestamp, then inserts. Returns the new row's id.
    pub fn add_alert(&self, src_ip: &str, label: &str, severity: &str, kind: &str) -> Result<String> {
        let alert = Alert {
            id: new_id(),
            ts: now_rfc3339(),
            src_ip: src_ip.to_string(),
            label: label.to_string(),
            severity: severity.to_string(),
            kind: kind.to_string(),
        };
        self.insert_alert(&alert)?;
        Ok(alert.id)
    }

    pub fn insert_alert(&self, alert: &Alert) -> Result<()> {
        self.with_transaction(|tx| {
            tx.prepare_cached(
                "INSERT INTO alerts (id, ts, src_ip, label, severity, kind) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?
            .execute(params![alert.id, alert.ts, alert.src_ip, alert.label, alert.severity, alert.kind])?;
            Ok(())
        })
    }

    /// Newest-first listing with keyset pagination: `cursor` is the
    /// `(ts, id)` of the last row from a previous page, so the next page
    /// starts strictly after it even when several alerts share a `ts`.
    pub fn list_alerts(&self, limit: usize, cursor: Option<(String, String)>) -> Result<Vec<Alert>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = if cursor.is_some() {
            conn.prepare_cached(
                "SELECT id, ts, src_ip, label, severity, kind FROM alerts
                 WHERE (ts, id) < (?1, ?2)
                 ORDER BY ts DESC, id DESC LIMIT ?3",
            )?
        } else {
            conn.prepare_cached(
                "SELECT id, ts, src_ip, label, severity, kind FROM alerts
                 ORDER BY ts DESC, id DESC LIMIT ?1",
            )?
        };

        let rows = if let Some((ts, id)) = cursor {
            stmt.query_map(params![ts, id, limit as i64], map_alert_row)?
        } else {
            stmt.query_map(params![limit as i64], map_alert_row)?
        };

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn map_alert_row(row: &rusqlite::Row) -> rusqlite::Result<Alert> {
    Ok(Alert {
        id: row.get(0)?,
        ts: row.get(1)?,
        src_ip: row.get(2)?,
        label: row.get(3)?,
        severity: row.get(4)?,
        kind: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::tests::open_memory_db;

    #[test]
    fn add_then_list_round_trips() {
        let store = open_memory_db();
        store.add_alert("1.2.3.4", "anomaly detected", "high", "ANOMALY").unwrap();
        let alerts = store.list_alerts(10, None).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].src_ip, "1.2.3.4");
        assert_eq!(alerts[0].kind, "ANOMALY");
    }

    #[test]
    fn list_alerts_respects_limit() {
        let store = open_memory_db();
        for i in 0..5 {
            store.add_alert(&format!("10.0.0.{i}"), "hit", "low", "SIGNATURE").unwrap();
        }
        let page = store.list_alerts(2, None).unwrap();
        assert_eq!(page.len(), 2);
    }

    #[test]
    fn keyset_cursor_excludes_already_seen_rows() {
        let store = open_memory_db();
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(store.add_alert(&format!("10.0.0.{i}"), "hit", "low", "SIGNATURE").unwrap());
        }
        let first_page = store.list_alerts(2, None).unwrap();
        assert_eq!(first_page.len(), 2);
        let cursor = (first_page[1].ts.clone(), first_page[1].id.clone());
        let second_page = store.list_alerts(2, Some(cursor)).unwrap();
        let seen_ids: std::collections::HashSet<_> = first_page.iter().map(|a| a.id.clone()).collect();
        assert!(second_page.iter().all(|a| !seen_ids.contains(&a.id)));
    }

    #[test]
    fn list_alerts_is_newest_first() {
        let store = open_memory_db();
        store.add_alert("1.1.1.1", "first", "low", "SIGNATURE").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.add_alert("2.2.2.2", "second", "low", "SIGNATURE").unwrap();
        let alerts = store.list_alerts(10, None).unwrap();
        assert_eq!(alerts[0].src_ip, "2.2.2.2");
        assert_eq!(alerts[1].src_ip, "1.1.1.1");
    }
}
