use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{
    domain_of, normalize_url, now_timestamp, Job, JobStatus, JobUpdate, LogEntry, NewOutcome,
    ResourceOutcome,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS jobs (
        id               TEXT PRIMARY KEY,
        source_url       TEXT NOT NULL,
        domain           TEXT NOT NULL,
        status           TEXT NOT NULL
                         CHECK(status IN ('pending','processing','completed','failed')),
        total_files      INTEGER NOT NULL DEFAULT 0,
        successful_files INTEGER NOT NULL DEFAULT 0,
        failed_files     INTEGER NOT NULL DEFAULT 0,
        total_size_bytes INTEGER NOT NULL DEFAULT 0,
        created_at       TEXT NOT NULL,
        completed_at     TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs(created_at);

    CREATE TABLE IF NOT EXISTS job_logs (
        id        INTEGER PRIMARY KEY,
        job_id    TEXT NOT NULL REFERENCES jobs(id),
        timestamp TEXT NOT NULL,
        kind      TEXT NOT NULL CHECK(kind IN ('info','success','error','progress')),
        message   TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_logs_job ON job_logs(job_id);

    CREATE TABLE IF NOT EXISTS resource_outcomes (
        id             INTEGER PRIMARY KEY,
        job_id         TEXT NOT NULL REFERENCES jobs(id),
        original_url   TEXT NOT NULL,
        local_filename TEXT NOT NULL,
        size_bytes     INTEGER,
        status         TEXT NOT NULL CHECK(status IN ('success','failed','timeout')),
        error_message  TEXT,
        created_at     TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_outcomes_job ON resource_outcomes(job_id);
";

const JOB_COLUMNS: &str = "id, source_url, domain, status, total_files, successful_files,
     failed_files, total_size_bytes, created_at, completed_at";

/// Job, log and outcome persistence over a single SQLite connection.
///
/// The connection sits behind a mutex so concurrent jobs can share one
/// store; every call runs to completion before the next begins.
pub struct JobStore {
    conn: Mutex<Connection>,
}

impl JobStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(JobStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("job store lock poisoned"))
    }

    /// Insert a pending job for `source_url` (normalized to carry a scheme).
    pub fn create_job(&self, source_url: &str) -> Result<Job> {
        let source_url = normalize_url(source_url);
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            domain: domain_of(&source_url),
            source_url,
            status: JobStatus::Pending,
            total_files: 0,
            successful_files: 0,
            failed_files: 0,
            total_size_bytes: 0,
            logs: Vec::new(),
            created_at: now_timestamp(),
            completed_at: None,
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO jobs (id, source_url, domain, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![job.id, job.source_url, job.domain, job.status, job.created_at],
        )?;
        Ok(job)
    }

    pub fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.lock()?;
        load_job(&conn, id)
    }

    /// Merge `update` into the job. Returns `None` if no such job exists.
    pub fn update_job(&self, id: &str, update: &JobUpdate) -> Result<Option<Job>> {
        let mut sets = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(status) = update.status {
            sets.push(format!("status = ?{}", values.len() + 1));
            values.push(Box::new(status));
        }
        let counters = [
            ("total_files", update.total_files),
            ("successful_files", update.successful_files),
            ("failed_files", update.failed_files),
            ("total_size_bytes", update.total_size_bytes),
        ];
        for (column, value) in counters {
            if let Some(v) = value {
                sets.push(format!("{} = ?{}", column, values.len() + 1));
                values.push(Box::new(v));
            }
        }
        if let Some(ts) = &update.completed_at {
            sets.push(format!("completed_at = ?{}", values.len() + 1));
            values.push(Box::new(ts.clone()));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if !sets.is_empty() {
            let sql = format!(
                "UPDATE jobs SET {} WHERE id = ?{}",
                sets.join(", "),
                values.len() + 1
            );
            values.push(Box::new(id.to_string()));
            let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
            tx.execute(&sql, refs.as_slice())?;
        }
        let job = load_job(&tx, id)?;
        tx.commit()?;
        Ok(job)
    }

    /// Append one entry to the job's log. Returns `false` if the job is unknown.
    pub fn append_log(&self, id: &str, entry: &LogEntry) -> Result<bool> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM jobs WHERE id = ?1)",
            params![id],
            |r| r.get(0),
        )?;
        if !exists {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO job_logs (job_id, timestamp, kind, message) VALUES (?1, ?2, ?3, ?4)",
            params![id, entry.timestamp, entry.kind, entry.message],
        )?;
        Ok(true)
    }

    pub fn create_outcome(&self, outcome: &NewOutcome) -> Result<ResourceOutcome> {
        let created_at = now_timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO resource_outcomes
             (job_id, original_url, local_filename, size_bytes, status, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                outcome.job_id,
                outcome.original_url,
                outcome.local_filename,
                outcome.size_bytes,
                outcome.status,
                outcome.error_message,
                created_at,
            ],
        )
        .with_context(|| format!("Failed to record outcome for {}", outcome.original_url))?;

        Ok(ResourceOutcome {
            id: conn.last_insert_rowid(),
            job_id: outcome.job_id.clone(),
            original_url: outcome.original_url.clone(),
            local_filename: outcome.local_filename.clone(),
            size_bytes: outcome.size_bytes,
            status: outcome.status,
            error_message: outcome.error_message.clone(),
            created_at,
        })
    }

    pub fn list_outcomes_by_job(&self, id: &str) -> Result<Vec<ResourceOutcome>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, job_id, original_url, local_filename, size_bytes, status,
                    error_message, created_at
             FROM resource_outcomes WHERE job_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok(ResourceOutcome {
                    id: row.get(0)?,
                    job_id: row.get(1)?,
                    original_url: row.get(2)?,
                    local_filename: row.get(3)?,
                    size_bytes: row.get(4)?,
                    status: row.get(5)?,
                    error_message: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Most recently created jobs first.
    pub fn list_recent_jobs(&self, limit: usize) -> Result<Vec<Job>> {
        let conn = self.lock()?;
        let ids: Vec<String> = conn
            .prepare("SELECT id FROM jobs ORDER BY created_at DESC, rowid DESC LIMIT ?1")?
            .query_map(params![limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = load_job(&conn, &id)? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }
}

fn job_from_row(row: &Row) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        source_url: row.get(1)?,
        domain: row.get(2)?,
        status: row.get(3)?,
        total_files: row.get(4)?,
        successful_files: row.get(5)?,
        failed_files: row.get(6)?,
        total_size_bytes: row.get(7)?,
        logs: Vec::new(),
        created_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

fn load_job(conn: &Connection, id: &str) -> Result<Option<Job>> {
    let job = conn
        .query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
            params![id],
            job_from_row,
        )
        .optional()?;
    let Some(mut job) = job else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT timestamp, kind, message FROM job_logs WHERE job_id = ?1 ORDER BY id",
    )?;
    job.logs = stmt
        .query_map(params![id], |row| {
            Ok(LogEntry {
                timestamp: row.get(0)?,
                kind: row.get(1)?,
                message: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(job))
}
