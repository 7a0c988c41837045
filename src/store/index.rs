use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::error::Result;
use crate::model::{Status, Task};

/// Derived SQLite index over the JSONL task store.
///
/// The JSONL file is the source of truth; the index only serves queue
/// queries (ready/list/stale) and is rebuilt whenever the store
/// fingerprint changes.
pub struct Index {
    conn: Connection,
}

impl Index {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        // Concurrent agents share this file; wait out writers instead of
        // surfacing SQLITE_BUSY.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let idx = Self { conn };
        idx.create_tables()?;
        Ok(idx)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let idx = Self { conn };
        idx.create_tables()?;
        Ok(idx)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                project TEXT NOT NULL,
                title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                priority INTEGER NOT NULL DEFAULT 2,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                updated_by TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS blockers (
                task_id TEXT NOT NULL REFERENCES tasks(id),
                blocked_by_id TEXT NOT NULL,
                PRIMARY KEY (task_id, blocked_by_id)
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project);
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn rebuild(&self, tasks: &[Task]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch("DELETE FROM blockers; DELETE FROM tasks;")?;

        for task in tasks {
            tx.execute(
                "INSERT INTO tasks (id, project, title, status, priority, created_at, updated_at, updated_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    task.id.as_str(),
                    task.project,
                    task.title,
                    task.status.to_string(),
                    task.priority.rank() as i64,
                    task.created_at.to_rfc3339(),
                    task.updated_at.to_rfc3339(),
                    task.updated_by,
                ],
            )?;
        }
        for task in tasks {
            for dep in &task.blocked_by {
                tx.execute(
                    "INSERT OR IGNORE INTO blockers (task_id, blocked_by_id) VALUES (?1, ?2)",
                    params![task.id.as_str(), dep.as_str()],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn upsert(&self, task: &Task) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO tasks (id, project, title, status, priority, created_at, updated_at, updated_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                task.id.as_str(),
                task.project,
                task.title,
                task.status.to_string(),
                task.priority.rank() as i64,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
                task.updated_by,
            ],
        )?;
        tx.execute(
            "DELETE FROM blockers WHERE task_id = ?1",
            params![task.id.as_str()],
        )?;
        for dep in &task.blocked_by {
            tx.execute(
                "INSERT OR IGNORE INTO blockers (task_id, blocked_by_id) VALUES (?1, ?2)",
                params![task.id.as_str(), dep.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Ids of ready tasks: open, with every blocker closed.
    /// Ordered by priority rank then age. A blocker missing from the index
    /// counts as unfinished.
    pub fn ready(&self, project: Option<&str>) -> Result<Vec<String>> {
        let base = "SELECT t.id FROM tasks t
             WHERE t.status = 'open'
             AND NOT EXISTS (
                 SELECT 1 FROM blockers b
                 LEFT JOIN tasks dep ON b.blocked_by_id = dep.id
                 WHERE b.task_id = t.id
                 AND (dep.id IS NULL OR dep.status != 'closed')
             )";
        let (sql, has_param) = match project {
            Some(_) => (
                format!("{base} AND t.project = ?1 ORDER BY t.priority, t.created_at, t.id"),
                true,
            ),
            None => (
                format!("{base} ORDER BY t.priority, t.created_at, t.id"),
                false,
            ),
        };
        self.query_ids(&sql, has_param.then_some(project).flatten())
    }

    /// Ids matching an optional project/status filter, queue-ordered.
    pub fn list(&self, project: Option<&str>, status: Option<Status>) -> Result<Vec<String>> {
        let mut sql = String::from("SELECT t.id FROM tasks t WHERE 1=1");
        let mut args: Vec<String> = Vec::new();
        if let Some(p) = project {
            args.push(p.to_string());
            sql.push_str(&format!(" AND t.project = ?{}", args.len()));
        }
        if let Some(s) = status {
            args.push(s.to_string());
            sql.push_str(&format!(" AND t.status = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY t.priority, t.created_at, t.id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
            row.get::<_, String>(0)
        })?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    /// Ids of in_progress tasks untouched since `cutoff`.
    pub fn stale(&self, project: Option<&str>, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let cutoff = cutoff.to_rfc3339();
        let mut stmt;
        let mut ids = Vec::new();
        match project {
            Some(p) => {
                stmt = self.conn.prepare(
                    "SELECT t.id FROM tasks t
                     WHERE t.status = 'in_progress' AND t.updated_at <= ?1 AND t.project = ?2
                     ORDER BY t.updated_at, t.id",
                )?;
                let rows = stmt.query_map(params![cutoff, p], |row| row.get::<_, String>(0))?;
                for id in rows {
                    ids.push(id?);
                }
            }
            None => {
                stmt = self.conn.prepare(
                    "SELECT t.id FROM tasks t
                     WHERE t.status = 'in_progress' AND t.updated_at <= ?1
                     ORDER BY t.updated_at, t.id",
                )?;
                let rows = stmt.query_map(params![cutoff], |row| row.get::<_, String>(0))?;
                for id in rows {
                    ids.push(id?);
                }
            }
        };
        Ok(ids)
    }

    fn query_ids(&self, sql: &str, param: Option<&str>) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut ids = Vec::new();
        match param {
            Some(p) => {
                let rows = stmt.query_map(params![p], |row| row.get::<_, String>(0))?;
                for id in rows {
                    ids.push(id?);
                }
            }
            None => {
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                for id in rows {
                    ids.push(id?);
                }
            }
        };
        Ok(ids)
    }

    pub fn get_fingerprint(&self) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = 'fingerprint'")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn set_fingerprint(&self, fp: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('fingerprint', ?1)",
            params![fp],
        )?;
        Ok(())
    }
}
