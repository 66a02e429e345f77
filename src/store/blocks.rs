use rusqlite::params;

use super::{new_id, now_rfc3339, Store};
use crate::error::Result;
use crate::model::BlockAction;

impl Store {
    pub fn add_block(&self, ip: &str, action: &str, reason: &str, expires_at: Option<&str>) -> Result<String> {
        let block = BlockAction {
            id: new_id(),
            ts: now_rfc3339(),
            ip: ip.to_string(),
            action: action.to_string(),
            reason: reason.to_string(),
            expires_at: expires_at.map(|s| s.to_string()),
        };
        self.insert_block(&block)?;
        Ok(block.id)
    }

    pub fn insert_block(&self, block: &BlockAction) -> Result<()> {
        self.with_transaction(|tx| {
            tx.prepare_cached(
                "INSERT INTO blocks (id, ts, ip, action, reason, expires_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?
            .execute(params![block.id, block.ts, block.ip, block.action, block.reason, block.expires_at])?;
            Ok(())
        })
    }

    /// Deletes every row for `ip` with the given `action`, used to make
    /// `maybe_block` idempotent: stale `unblock`/`block` rows are cleared
    /// before the fresh `block` row is inserted.
    pub fn delete_action_by_ip(&self, ip: &str, action: &str) -> Result<usize> {
        self.with_transaction(|tx| {
            let n = tx.execute("DELETE FROM blocks WHERE ip = ?1 AND action = ?2", params![ip, action])?;
            Ok(n)
        })
    }

    pub fn list_blocks(&self, limit: usize) -> Result<Vec<BlockAction>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, ts, ip, action, reason, expires_at FROM blocks ORDER BY ts DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], map_block_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// The most recent row for `ip` regardless of action, used by startup
    /// firewall sync and by `expire_bans`.
    fn latest_block_for_ip(&self, ip: &str) -> Result<Option<BlockAction>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, ts, ip, action, reason, expires_at FROM blocks WHERE ip = ?1 ORDER BY ts DESC, id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![ip], map_block_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn distinct_blocked_ips(&self) -> Result<Vec<String>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT DISTINCT ip FROM blocks")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// The set of IPs whose most recent block row is still `action=block`,
    /// in the shape the startup firewall sync needs to reapply rules.
    pub fn active_blocks(&self) -> Result<Vec<BlockAction>> {
        let mut out = Vec::new();
        for ip in self.distinct_blocked_ips()? {
            if let Some(latest) = self.latest_block_for_ip(&ip)? {
                if latest.action == "block" {
                    out.push(latest);
                }
            }
        }
        Ok(out)
    }

    /// For every IP whose latest action is `block` and whose `expires_at`
    /// has passed `now_iso`, inserts an `unblock` row with
    /// `reason = "auto-expired"`. Returns how many IPs were expired.
    pub fn expire_bans(&self, now_iso: &str) -> Result<usize> {
        let mut expired = 0;
        for ip in self.distinct_blocked_ips()? {
            let Some(latest) = self.latest_block_for_ip(&ip)? else { continue };
            if latest.action != "block" {
                continue;
            }
            let Some(expires_at) = latest.expires_at.as_deref() else { continue };
            if timestamps_le(expires_at, now_iso) {
                self.add_block(&ip, "unblock", "auto-expired", None)?;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

/// Compares two RFC-3339 timestamps as instants rather than as raw strings,
/// since the source occasionally mixes the `Z` and `+00:00` UTC suffixes and
/// those don't compare correctly byte-for-byte (`'Z' > '+'`). Falls back to a
/// lexicographic comparison if either side fails to parse, rather than
/// panicking on a malformed value.
fn timestamps_le(a: &str, b: &str) -> bool {
    match (chrono::DateTime::parse_from_rfc3339(a), chrono::DateTime::parse_from_rfc3339(b)) {
        (Ok(parsed_a), Ok(parsed_b)) => parsed_a <= parsed_b,
        _ => a <= b,
    }
}

fn map_block_row(row: &rusqlite::Row) -> rusqlite::Result<BlockAction> {
    Ok(BlockAction {
        id: row.get(0)?,
        ts: row.get(1)?,
        ip: row.get(2)?,
        action: row.get(3)?,
        reason: row.get(4)?,
        expires_at: row.get(5)?,
    })
}
