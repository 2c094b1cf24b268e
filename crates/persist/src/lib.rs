//! kubedeck persistence: SQLite store for composite workload records.
//! Keep code tiny and predictable.

#![forbid(unsafe_code)]

use anyhow::{anyhow, Context, Result};
use chrono::{TimeZone, Utc};
use deck_core::{CompositeStage, CompositeWorkloadRecord, ExposureType};
use deck_select::SelectionQuery;
use metrics::{counter, histogram};
use rusqlite::OptionalExtension;
use tracing::debug;

/// Storage for composite workload records. Single calls are atomic; nothing spans calls.
pub trait Store: Send + Sync {
    /// Insert and return the generated id. `rec.id` is ignored.
    fn insert(&self, rec: &CompositeWorkloadRecord) -> Result<i64>;
    fn get(&self, id: i64) -> Result<Option<CompositeWorkloadRecord>>;
    /// Records whose name contains `query.name()`, newest id first, windowed by the query page.
    /// The count is the number of matching records, independent of the window.
    fn list(&self, query: &SelectionQuery) -> Result<(Vec<CompositeWorkloadRecord>, usize)>;
    fn delete(&self, id: i64) -> Result<()>;
    fn set_stage(&self, id: i64, stage: CompositeStage) -> Result<()>;
}

/// SQLite-backed store. Simple, synchronous; each call is one short statement.
pub struct SqliteStore {
    db: std::sync::Mutex<rusqlite::Connection>,
}

const COLUMNS: &str = "id, name, namespace, replicas, workload, service, route, exposure, stage, created_ms";

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        Self::init(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = rusqlite::Connection::open_in_memory().context("opening in-memory sqlite db")?;
        Self::init(db)
    }

    fn init(db: rusqlite::Connection) -> Result<Self> {
        let started = std::time::Instant::now();
        db.pragma_update(None, "journal_mode", &"WAL").ok();
        db.pragma_update(None, "synchronous", &"NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS composite_workload (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                name       TEXT NOT NULL,
                namespace  TEXT NOT NULL,
                replicas   INTEGER NOT NULL,
                workload   TEXT NOT NULL,
                service    TEXT NOT NULL,
                route      TEXT NOT NULL,
                exposure   TEXT NOT NULL,
                stage      TEXT NOT NULL,
                created_ms INTEGER NOT NULL
            )",
            [],
        ).context("creating composite_workload table")?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_composite_workload_name ON composite_workload(name)",
            [],
        ).ok();
        let me = Self { db: std::sync::Mutex::new(db) };
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(me)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.db.lock().map_err(|_| anyhow!("sqlite connection mutex poisoned"))
    }
}

fn conversion_err(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<CompositeWorkloadRecord> {
    let exposure: String = row.get(7)?;
    let stage: String = row.get(8)?;
    let created_ms: i64 = row.get(9)?;
    Ok(CompositeWorkloadRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        namespace: row.get(2)?,
        replica_count: row.get(3)?,
        workload_resource_name: row.get(4)?,
        service_resource_name: row.get(5)?,
        route_resource_name: row.get(6)?,
        exposure_type: exposure.parse::<ExposureType>().map_err(|e| conversion_err(7, e))?,
        stage: stage.parse::<CompositeStage>().map_err(|e| conversion_err(8, e))?,
        created_at: Utc.timestamp_millis_opt(created_ms).single().unwrap_or_default(),
    })
}

impl Store for SqliteStore {
    fn insert(&self, rec: &CompositeWorkloadRecord) -> Result<i64> {
        let started = std::time::Instant::now();
        let db = self.conn()?;
        db.execute(
            "INSERT INTO composite_workload(name, namespace, replicas, workload, service, route, exposure, stage, created_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            (
                &rec.name,
                &rec.namespace,
                rec.replica_count,
                &rec.workload_resource_name,
                &rec.service_resource_name,
                &rec.route_resource_name,
                rec.exposure_type.as_str(),
                rec.stage.as_str(),
                rec.created_at.timestamp_millis(),
            ),
        ).with_context(|| format!("inserting composite workload {}/{}", rec.namespace, rec.name))?;
        let id = db.last_insert_rowid();
        histogram!("persist_insert_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_insert_total", 1u64);
        Ok(id)
    }

    fn get(&self, id: i64) -> Result<Option<CompositeWorkloadRecord>> {
        let started = std::time::Instant::now();
        let db = self.conn()?;
        let rec = db
            .query_row(&format!("SELECT {} FROM composite_workload WHERE id = ?1", COLUMNS), [id], row_to_record)
            .optional()
            .with_context(|| format!("reading composite workload {}", id))?;
        histogram!("persist_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(rec)
    }

    fn list(&self, query: &SelectionQuery) -> Result<(Vec<CompositeWorkloadRecord>, usize)> {
        let started = std::time::Instant::now();
        let (offset, _) = query.window();
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let limit = i64::try_from(query.page_size()).unwrap_or(i64::MAX);
        let db = self.conn()?;
        // instr keeps the match case-sensitive, unlike LIKE
        let total: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM composite_workload WHERE ?1 = '' OR instr(name, ?1) > 0",
                [query.name()],
                |row| row.get(0),
            )
            .context("counting composite workloads")?;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM composite_workload WHERE ?1 = '' OR instr(name, ?1) > 0 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
            COLUMNS
        ))?;
        let rows = stmt.query_map((query.name(), limit, offset), row_to_record)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.context("decoding composite workload row")?);
        }
        histogram!("persist_list_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok((out, total as usize))
    }

    fn delete(&self, id: i64) -> Result<()> {
        let started = std::time::Instant::now();
        let db = self.conn()?;
        let n = db
            .execute("DELETE FROM composite_workload WHERE id = ?1", [id])
            .with_context(|| format!("deleting composite workload {}", id))?;
        if n == 0 {
            debug!(id, "delete: no such composite workload row");
        }
        histogram!("persist_delete_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_delete_total", 1u64);
        Ok(())
    }

    fn set_stage(&self, id: i64, stage: CompositeStage) -> Result<()> {
        let db = self.conn()?;
        db.execute("UPDATE composite_workload SET stage = ?1 WHERE id = ?2", (stage.as_str(), id))
            .with_context(|| format!("updating stage of composite workload {}", id))?;
        Ok(())
    }
}

/// `$HOME/.kubedeck/kubedeck.db`, or `kubedeck.db` in the working directory without a home.
pub fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".kubedeck");
        let _ = std::fs::create_dir_all(&p);
        p.push("kubedeck.db");
        return p.to_string_lossy().to_string();
    }
    "kubedeck.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> String {
        let dir = std::env::temp_dir();
        let f = format!("kubedeck-test-{}.db", std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos());
        dir.join(f).to_string_lossy().to_string()
    }

    #[test]
    fn insert_get_delete_on_file() {
        let path = temp_db();
        let s = SqliteStore::open(&path).unwrap();
        let rec = CompositeWorkloadRecord::new("web", "prod", 2, ExposureType::RouteExposed);
        let id = s.insert(&rec).unwrap();
        assert!(id > 0);

        let got = s.get(id).unwrap().expect("row present");
        assert_eq!(got.id, id);
        assert_eq!(got.name, "web");
        assert_eq!(got.route_resource_name, "web-ing");
        assert_eq!(got.exposure_type, ExposureType::RouteExposed);
        assert_eq!(got.created_at.timestamp_millis(), rec.created_at.timestamp_millis());

        s.delete(id).unwrap();
        assert!(s.get(id).unwrap().is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn stage_updates_persist() {
        let s = SqliteStore::open_in_memory().unwrap();
        let id = s.insert(&CompositeWorkloadRecord::new("a", "ns", 1, ExposureType::ClusterLocal)).unwrap();
        s.set_stage(id, CompositeStage::ServiceCreated).unwrap();
        assert_eq!(s.get(id).unwrap().unwrap().stage, CompositeStage::ServiceCreated);
    }

    #[test]
    fn delete_missing_id_is_ok() {
        let s = SqliteStore::open_in_memory().unwrap();
        s.delete(42).unwrap();
    }
}
