//! libSQL storage layer (local file).
//!
//! The [`Storage`] struct wraps a libSQL database holding discovered
//! postings, the append-only attempt log the quota is counted from, and one
//! record per run. It is the default [`Persistence`] implementation.

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use jobpilot_shared::{ApplicationAttempt, JobPilotError, JobPosting, Persistence, Result, RunId};
use libsql::{Connection, Database, params};
use sha2::{Digest, Sha256};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// What an upsert did to the stored posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingChange {
    Inserted,
    Unchanged,
    /// The requirement text differs from what was stored.
    RequirementsChanged,
}

/// One stored run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub summary_json: Option<String>,
}

/// An indeterminate attempt waiting for a human to check the site.
#[derive(Debug, Clone)]
pub struct ReviewItem {
    pub attempt_id: String,
    pub posting_id: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub attempted_at: DateTime<Utc>,
    pub detail: Option<String>,
}

/// SHA-256 hex digest of a posting's requirement text.
pub fn requirements_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| JobPilotError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| JobPilotError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| JobPilotError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for reporting commands.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| JobPilotError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| JobPilotError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        JobPilotError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    pub async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(JobPilotError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Postings
    // -----------------------------------------------------------------------

    /// Insert a posting or refresh the stored copy, keyed by its id.
    ///
    /// `discovered_at` keeps the first sighting; everything else is
    /// overwritten.
    pub async fn save_posting(&self, posting: &JobPosting) -> Result<PostingChange> {
        self.check_writable()?;
        let hash = requirements_hash(&posting.requirements);
        let previous = self.posting_hash(posting.id.as_str()).await?;

        self.conn
            .execute(
                "INSERT INTO postings (id, url, title, company, location, easy_apply,
                                       requirements, requirements_hash, discovered_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                   url = excluded.url,
                   title = excluded.title,
                   company = excluded.company,
                   location = excluded.location,
                   easy_apply = excluded.easy_apply,
                   requirements = excluded.requirements,
                   requirements_hash = excluded.requirements_hash,
                   updated_at = excluded.updated_at",
                params![
                    posting.id.as_str(),
                    posting.url.as_str(),
                    posting.title.as_str(),
                    posting.company.as_str(),
                    posting.location.as_deref(),
                    i64::from(posting.easy_apply),
                    posting.requirements.as_str(),
                    hash.as_str(),
                    posting.discovered_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| JobPilotError::Storage(e.to_string()))?;

        let change = match previous {
            None => PostingChange::Inserted,
            Some(old) if old == hash => PostingChange::Unchanged,
            Some(_) => PostingChange::RequirementsChanged,
        };
        if change == PostingChange::RequirementsChanged {
            tracing::debug!(posting = %posting.id, "requirements changed since last sighting");
        }
        Ok(change)
    }

    async fn posting_hash(&self, id: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT requirements_hash FROM postings WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| JobPilotError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<String>(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(JobPilotError::Storage(e.to_string())),
        }
    }

    /// Number of stored postings.
    pub async fn posting_count(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM postings", params![]).await
    }

    // -----------------------------------------------------------------------
    // Attempts
    // -----------------------------------------------------------------------

    /// Append one attempt to the log.
    pub async fn insert_attempt(&self, attempt: &ApplicationAttempt) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO attempts (id, posting_id, run_id, attempted_at, day, outcome,
                                       failure, detail, needs_review, match_score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    attempt.id.to_string(),
                    attempt.posting_id.as_str(),
                    attempt.run_id.to_string(),
                    attempt.attempted_at.to_rfc3339(),
                    attempt.day.to_string(),
                    attempt.outcome.as_str(),
                    attempt.failure.map(|f| f.as_str()),
                    attempt.detail.as_deref(),
                    i64::from(attempt.needs_review),
                    attempt.match_score,
                ],
            )
            .await
            .map_err(|e| JobPilotError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Succeeded attempts on a local day.
    pub async fn succeeded_on(&self, day: NaiveDate) -> Result<u32> {
        let n = self
            .count(
                "SELECT COUNT(*) FROM attempts WHERE day = ?1 AND outcome = 'succeeded'",
                params![day.to_string()],
            )
            .await?;
        u32::try_from(n).map_err(|e| JobPilotError::Storage(e.to_string()))
    }

    /// Indeterminate attempts not yet resolved, oldest first.
    pub async fn pending_reviews(&self) -> Result<Vec<ReviewItem>> {
        let mut rows = self
            .conn
            .query(
                "SELECT a.id, a.posting_id, p.title, p.company, a.attempted_at, a.detail
                 FROM attempts a LEFT JOIN postings p ON p.id = a.posting_id
                 WHERE a.needs_review = 1 AND a.reviewed_at IS NULL
                 ORDER BY a.attempted_at",
                params![],
            )
            .await
            .map_err(|e| JobPilotError::Storage(e.to_string()))?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            items.push(ReviewItem {
                attempt_id: text(&row, 0)?,
                posting_id: text(&row, 1)?,
                title: row.get::<String>(2).ok(),
                company: row.get::<String>(3).ok(),
                attempted_at: timestamp(&text(&row, 4)?)?,
                detail: row.get::<String>(5).ok(),
            });
        }
        Ok(items)
    }

    /// Mark a review item as handled. Returns `false` for an unknown id.
    pub async fn resolve_review(&self, attempt_id: &str) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "UPDATE attempts SET reviewed_at = ?2
                 WHERE id = ?1 AND needs_review = 1 AND reviewed_at IS NULL",
                params![attempt_id, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| JobPilotError::Storage(e.to_string()))?;
        Ok(changed > 0)
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    pub async fn insert_run(
        &self,
        run_id: RunId,
        started_at: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO runs (id, started_at, dry_run) VALUES (?1, ?2, ?3)",
                params![
                    run_id.to_string(),
                    started_at.to_rfc3339(),
                    i64::from(dry_run)
                ],
            )
            .await
            .map_err(|e| JobPilotError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Close a run record with its serialized summary.
    pub async fn finish_run(
        &self,
        run_id: RunId,
        finished_at: DateTime<Utc>,
        summary_json: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "UPDATE runs SET finished_at = ?2, summary_json = ?3 WHERE id = ?1",
                params![run_id.to_string(), finished_at.to_rfc3339(), summary_json],
            )
            .await
            .map_err(|e| JobPilotError::Storage(e.to_string()))?;
        if changed == 0 {
            return Err(JobPilotError::Storage(format!("unknown run {run_id}")));
        }
        Ok(())
    }

    /// Most recent runs first.
    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, started_at, finished_at, dry_run, summary_json
                 FROM runs ORDER BY started_at DESC LIMIT ?1",
                params![i64::from(limit)],
            )
            .await
            .map_err(|e| JobPilotError::Storage(e.to_string()))?;

        let mut runs = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let finished_at = match row.get::<String>(2).ok() {
                Some(s) => Some(timestamp(&s)?),
                None => None,
            };
            runs.push(RunRecord {
                id: text(&row, 0)?,
                started_at: timestamp(&text(&row, 1)?)?,
                finished_at,
                dry_run: row.get::<i64>(3).unwrap_or(0) != 0,
                summary_json: row.get::<String>(4).ok(),
            });
        }
        Ok(runs)
    }

    async fn count(&self, sql: &str, args: impl libsql::params::IntoParams) -> Result<u64> {
        let mut rows = self
            .conn
            .query(sql, args)
            .await
            .map_err(|e| JobPilotError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let n = row
                    .get::<i64>(0)
                    .map_err(|e| JobPilotError::Storage(e.to_string()))?;
                Ok(n.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(JobPilotError::Storage(e.to_string())),
        }
    }
}

#[async_trait]
impl Persistence for Storage {
    async fn upsert_posting(&self, posting: &JobPosting) -> Result<()> {
        self.save_posting(posting).await.map(|_| ())
    }

    async fn record_attempt(&self, attempt: &ApplicationAttempt) -> Result<()> {
        self.insert_attempt(attempt).await
    }

    async fn today_count(&self, date: NaiveDate) -> Result<u32> {
        self.succeeded_on(date).await
    }
}

fn text(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| JobPilotError::Storage(e.to_string()))
}

fn timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| JobPilotError::Storage(format!("invalid date: {e}")))
}
