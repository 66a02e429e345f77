use rusqlite::{params, OptionalExtension};

use super::Store;
use crate::error::Result;
use crate::model::Device;

impl Store {
    fn existing_device(tx: &rusqlite::Transaction, ip: &str) -> Result<Option<Device>> {
        let row = tx
            .prepare_cached("SELECT ip, name, open_ports, risk FROM devices WHERE ip = ?1")?
            .query_row(params![ip], map_device_row)
            .optional()?;
        Ok(row)
    }

    /// Ignores a blank `ip`. When `name` is blank or absent, any prior
    /// non-blank name is kept rather than overwritten — a later scan that
    /// can't resolve a hostname must not erase one already on file.
    pub fn record_device(&self, ip: &str, name: Option<&str>) -> Result<()> {
        if ip.trim().is_empty() {
            return Ok(());
        }
        self.with_transaction(|tx| {
            let existing = Self::existing_device(tx, ip)?;
            let resolved_name = match name.map(str::trim).filter(|n| !n.is_empty()) {
                Some(n) => Some(n.to_string()),
                None => existing.as_ref().and_then(|d| d.name.clone()),
            };
            let open_ports = existing.as_ref().map(|d| d.open_ports.clone()).unwrap_or_default();
            let risk = existing.as_ref().map(|d| d.risk.clone()).unwrap_or_else(|| "unknown".to_string());

            tx.prepare_cached(
                "INSERT OR REPLACE INTO devices (ip, name, open_ports, risk) VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![ip, resolved_name, open_ports, risk])?;
            Ok(())
        })
    }

    pub fn set_device_scan(&self, ip: &str, open_ports: &str, risk: &str) -> Result<()> {
        self.with_transaction(|tx| {
            let existing = Self::existing_device(tx, ip)?;
            let name = existing.as_ref().and_then(|d| d.name.clone());
            tx.prepare_cached(
                "INSERT OR REPLACE INTO devices (ip, name, open_ports, risk) VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![ip, name, open_ports, risk])?;
            Ok(())
        })
    }

    pub fn list_devices(&self) -> Result<Vec<Device>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT ip, name, open_ports, risk FROM devices ORDER BY ip")?;
        let rows = stmt.query_map([], map_device_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn map_device_row(row: &rusqlite::Row) -> rusqlite::Result<Device> {
    Ok(Device {
        ip: row.get(0)?,
        name: row.get(1)?,
        open_ports: row.get(2)?,
        risk: row.get(3)?,
    })
}
