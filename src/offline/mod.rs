//! Durable offline queue and the terminal delivery step.
//!
//! Accepted heartbeats that cannot be delivered are persisted here and
//! drained, oldest first, on later invocations. Records are deleted only
//! after the collector confirms them, so a crash mid-send can duplicate
//! a delivery but never lose one.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{debug, info, warn};
use rusqlite::{params, Connection};

use crate::api::{SendError, Sender};
use crate::heartbeat::Heartbeat;

mod migrations;

use migrations::run_migrations;

/// Maximum backlog records drained per invocation. Larger backlogs drain
/// across invocations; retry cadence is driven by how often the tool runs.
pub const DRAIN_LIMIT: usize = 100;

/// One persisted heartbeat plus its arrival-order key.
#[derive(Debug, Clone)]
pub struct QueuedHeartbeat {
    pub id: i64,
    pub heartbeat: Heartbeat,
}

/// SQLite-backed queue. SQLite's own locking (WAL + busy timeout)
/// serializes concurrent invocations touching the same file.
pub struct Queue {
    conn: Connection,
}

impl Queue {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create queue directory {}", parent.display())
            })?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("failed to open queue database {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .context("failed to enable WAL mode")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .context("failed to set busy timeout")?;

        run_migrations(&mut conn).context("failed to run queue migrations")?;

        debug!("offline queue opened at {}", path.display());
        Ok(Self { conn })
    }

    /// Appends heartbeats in order, in one transaction.
    pub fn push(&mut self, heartbeats: &[Heartbeat]) -> Result<()> {
        if heartbeats.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO heartbeats (body, queued_at) VALUES (?1, ?2)")?;
            for hb in heartbeats {
                let body = serde_json::to_string(hb)
                    .with_context(|| format!("failed to serialize heartbeat {}", hb.id()))?;
                stmt.execute(params![body, Utc::now().to_rfc3339()])?;
            }
        }
        tx.commit().context("failed to commit queued heartbeats")?;
        Ok(())
    }

    /// Returns up to `limit` oldest records without deleting them;
    /// deletion happens via `remove` once the collector confirms
    /// acceptance. Records whose payload no longer deserializes are
    /// dropped here with a warning so they cannot wedge the queue.
    pub fn oldest(&mut self, limit: usize) -> Result<Vec<QueuedHeartbeat>> {
        let mut records = Vec::new();
        let mut corrupt = Vec::new();

        {
            let mut stmt = self
                .conn
                .prepare("SELECT id, body FROM heartbeats ORDER BY id ASC LIMIT ?1")?;
            let mut rows = stmt.query(params![limit as i64])?;
            while let Some(row) = rows.next()? {
                let id: i64 = row.get(0)?;
                let body: String = row.get(1)?;
                match serde_json::from_str(&body) {
                    Ok(heartbeat) => records.push(QueuedHeartbeat { id, heartbeat }),
                    Err(err) => {
                        warn!("dropping corrupt queue record {id}: {err}");
                        corrupt.push(id);
                    }
                }
            }
        }

        if !corrupt.is_empty() {
            self.remove(&corrupt)?;
        }

        Ok(records)
    }

    /// Confirms delivery: deletes the given records.
    pub fn remove(&mut self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM heartbeats WHERE id = ?1")?;
            for id in ids {
                stmt.execute(params![id])?;
            }
        }
        tx.commit().context("failed to remove delivered heartbeats")?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM heartbeats", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Default on-disk location of the queue, shared by all invocations.
pub fn default_queue_path() -> Result<PathBuf> {
    let base = dirs::data_dir().ok_or_else(|| anyhow!("no platform data directory"))?;
    Ok(base.join("kadence").join("queue.sqlite3"))
}

/// Counts reported back to the caller after the terminal stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub sent: usize,
    pub queued: usize,
    pub rejected: usize,
}

/// Terminal pipeline step: drains the backlog ahead of the fresh batch,
/// makes exactly one send attempt, and settles the queue accordingly.
pub struct Dispatcher {
    queue: Queue,
    sender: Box<dyn Sender>,
}

impl Dispatcher {
    pub fn new(queue: Queue, sender: Box<dyn Sender>) -> Self {
        Self { queue, sender }
    }

    pub fn deliver(&mut self, fresh: Vec<Heartbeat>) -> Result<Delivery> {
        let backlog = self.queue.oldest(DRAIN_LIMIT)?;
        let backlog_len = backlog.len();

        let mut combined: Vec<Heartbeat> = Vec::with_capacity(backlog_len + fresh.len());
        combined.extend(backlog.iter().map(|record| record.heartbeat.clone()));
        combined.extend(fresh.iter().cloned());

        if combined.is_empty() {
            return Ok(Delivery::default());
        }

        match self.sender.send(&combined) {
            Ok(result) if result.rejected.is_empty() => {
                let ids: Vec<i64> = backlog.iter().map(|record| record.id).collect();
                self.queue.remove(&ids)?;
                info!(
                    "sent {} heartbeat(s) ({} drained from backlog)",
                    combined.len(),
                    backlog_len
                );
                Ok(Delivery {
                    sent: combined.len(),
                    queued: 0,
                    rejected: 0,
                })
            }
            Ok(result) => {
                let rejected: HashSet<usize> = result
                    .rejected
                    .iter()
                    .map(|rejection| rejection.index)
                    .filter(|&index| index < combined.len())
                    .collect();

                for rejection in &result.rejected {
                    if let Some(hb) = combined.get(rejection.index) {
                        warn!(
                            "collector rejected heartbeat {}: {}",
                            hb.id(),
                            rejection.reason
                        );
                    }
                }

                // Accepted backlog records are confirmed; rejected ones
                // stay put for one more attempt next invocation.
                let accepted_ids: Vec<i64> = backlog
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| !rejected.contains(index))
                    .map(|(_, record)| record.id)
                    .collect();
                self.queue.remove(&accepted_ids)?;

                // Rejected fresh heartbeats join the backlog.
                let requeue: Vec<Heartbeat> = fresh
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| rejected.contains(&(index + backlog_len)))
                    .map(|(_, hb)| hb.clone())
                    .collect();
                self.queue.push(&requeue)?;

                Ok(Delivery {
                    sent: combined.len() - rejected.len(),
                    queued: rejected.len(),
                    rejected: rejected.len(),
                })
            }
            Err(SendError::Transport(err)) => {
                warn!(
                    "collector unreachable, keeping {} heartbeat(s) queued: {err:#}",
                    combined.len()
                );
                self.queue.push(&fresh)?;
                Ok(Delivery {
                    sent: 0,
                    queued: combined.len(),
                    rejected: 0,
                })
            }
            Err(SendError::Api(err)) => {
                // Data stays durable, but retrying without operator
                // action will not succeed, so surface the failure.
                self.queue.push(&fresh)?;
                Err(err.context("send failed; heartbeats kept in the offline queue"))
            }
        }
    }
}
