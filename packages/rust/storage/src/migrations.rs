//! SQL migration definitions for the JobPilot database.
//!
//! Migrations are applied in order on database open.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: postings, attempts, runs",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Discovered postings, keyed by canonical URL
CREATE TABLE IF NOT EXISTS postings (
    id                TEXT PRIMARY KEY,
    url               TEXT NOT NULL,
    title             TEXT NOT NULL,
    company           TEXT NOT NULL,
    location          TEXT,
    easy_apply        INTEGER NOT NULL,
    requirements      TEXT NOT NULL,
    requirements_hash TEXT NOT NULL,
    discovered_at     TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

-- One row per application attempt (append-only)
CREATE TABLE IF NOT EXISTS attempts (
    id           TEXT PRIMARY KEY,
    posting_id   TEXT NOT NULL,
    run_id       TEXT NOT NULL,
    attempted_at TEXT NOT NULL,
    day          TEXT NOT NULL,
    outcome      TEXT NOT NULL,
    failure      TEXT,
    detail       TEXT,
    needs_review INTEGER NOT NULL DEFAULT 0,
    match_score  REAL
);

CREATE INDEX IF NOT EXISTS idx_attempts_day ON attempts(day, outcome);

CREATE TABLE IF NOT EXISTS runs (
    id           TEXT PRIMARY KEY,
    started_at   TEXT NOT NULL,
    finished_at  TEXT,
    dry_run      INTEGER NOT NULL DEFAULT 0,
    summary_json TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Track manual review resolution",
            sql: r#"
ALTER TABLE attempts ADD COLUMN reviewed_at TEXT;
CREATE INDEX IF NOT EXISTS idx_attempts_review ON attempts(needs_review, reviewed_at);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
