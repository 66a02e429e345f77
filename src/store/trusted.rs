use rusqlite::params;

use super::Store;
use crate::error::Result;
use crate::model::TrustedEntry;

/// Minimal HTML entity escaping for the handful of characters that matter
/// when a note later gets rendered as-is in a list view. No crate in this
/// stack covers such a narrow need, so it's hand-rolled rather than pulled
/// in as a dependency.
fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

impl Store {
    /// Escapes `note` before storage so a later listing is safe to render
    /// without re-escaping.
    pub fn upsert_trusted_ip(&self, ip: &str, note: &str) -> Result<()> {
        let escaped = escape_html(note);
        self.with_transaction(|tx| {
            tx.prepare_cached("INSERT OR REPLACE INTO trusted (ip, note) VALUES (?1, ?2)")?
                .execute(params![ip, escaped])?;
            Ok(())
        })
    }

    pub fn is_trusted(&self, ip: &str) -> Result<bool> {
        let conn = self.reader.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM trusted WHERE ip = ?1", params![ip], |row| row.get(0))?;
        Ok(count > 0)
    }

    pub fn list_trusted(&self) -> Result<Vec<TrustedEntry>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT ip, note FROM trusted ORDER BY ip")?;
        let rows = stmt.query_map([], |row| {
            Ok(TrustedEntry { ip: row.get(0)?, note: row.get(1)? })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
