use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::types::Report;

/// SQLite-backed scan history. Reports are stored as serialized JSON next to
/// the columns the history view filters on.
///
/// rusqlite is a blocking API; async callers wrap these methods in
/// `tokio::task::spawn_blocking`.
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).with_context(|| {
            format!("failed to open history database: {}", path.as_ref().display())
        })?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS scans (
                id INTEGER PRIMARY KEY,
                target TEXT,
                score INTEGER,
                report TEXT
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Persist a report and reflect the assigned row id back into it.
    pub fn save(&self, report: &mut Report) -> Result<i64> {
        let json = serde_json::to_string(report)?;
        let conn = self.conn.lock().expect("history lock poisoned");
        conn.execute(
            "INSERT INTO scans (target, score, report) VALUES (?1, ?2, ?3)",
            params![report.target, report.score, json],
        )?;
        let id = conn.last_insert_rowid();
        report.id = Some(id);
        Ok(id)
    }

    /// Most recent reports first, capped at `limit`. Rows whose JSON no
    /// longer parses are skipped.
    pub fn list(&self, limit: usize) -> Result<Vec<Report>> {
        let conn = self.conn.lock().expect("history lock poisoned");
        let mut stmt =
            conn.prepare("SELECT id, report FROM scans ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let json: String = row.get(1)?;
            Ok((id, json))
        })?;

        let mut reports = Vec::new();
        for row in rows {
            let (id, json) = row?;
            match serde_json::from_str::<Report>(&json) {
                Ok(mut report) => {
                    report.id = Some(id);
                    reports.push(report);
                }
                Err(e) => {
                    tracing::warn!(id, error = %e, "skipping unreadable history row");
                }
            }
        }
        Ok(reports)
    }

    /// Returns false when no row had the given id.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().expect("history lock poisoned");
        let count = conn.execute("DELETE FROM scans WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    pub fn purge(&self) -> Result<()> {
        let conn = self.conn.lock().expect("history lock poisoned");
        conn.execute("DELETE FROM scans", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RiskSummary;

    fn sample_report(target: &str, score: i64) -> Report {
        Report {
            id: None,
            target: target.to_string(),
            score,
            timestamp: "2024-01-01 00:00:00".to_string(),
            defects: vec![],
            port_statuses: vec![],
            summary: RiskSummary::default(),
        }
    }

    #[test]
    fn save_assigns_and_backfills_id() {
        let store = HistoryStore::open_in_memory().unwrap();
        let mut report = sample_report("10.0.0.1", 90);
        let id = store.save(&mut report).unwrap();
        assert_eq!(report.id, Some(id));

        let mut second = sample_report("10.0.0.2", 75);
        let id2 = store.save(&mut second).unwrap();
        assert!(id2 > id);
    }

    #[test]
    fn list_is_newest_first() {
        let store = HistoryStore::open_in_memory().unwrap();
        store.save(&mut sample_report("a", 100)).unwrap();
        store.save(&mut sample_report("b", 50)).unwrap();

        let reports = store.list(50).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].target, "b");
        assert_eq!(reports[1].target, "a");
    }

    #[test]
    fn delete_and_purge() {
        let store = HistoryStore::open_in_memory().unwrap();
        let mut report = sample_report("a", 100);
        let id = store.save(&mut report).unwrap();

        assert!(store.delete(id).unwrap());
        assert!(!store.delete(id).unwrap());

        store.save(&mut sample_report("b", 10)).unwrap();
        store.save(&mut sample_report("c", 20)).unwrap();
        store.purge().unwrap();
        assert!(store.list(50).unwrap().is_empty());
    }
}
