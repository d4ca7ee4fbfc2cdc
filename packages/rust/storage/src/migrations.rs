//! SQL migration definitions for the Lineup database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: runs, product_specs, match_failures, score_cache",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Reconciliation run history
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

-- Terminal product specifications, one per processed price entry
CREATE TABLE IF NOT EXISTS product_specs (
    id               TEXT PRIMARY KEY,
    run_id           TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    model_code       TEXT NOT NULL,
    confidence       REAL NOT NULL,
    confidence_level TEXT NOT NULL,
    requires_review  INTEGER NOT NULL,
    spec_json        TEXT NOT NULL,
    UNIQUE(run_id, model_code)
);

CREATE INDEX IF NOT EXISTS idx_product_specs_run ON product_specs(run_id);
CREATE INDEX IF NOT EXISTS idx_product_specs_review
    ON product_specs(run_id, requires_review, confidence);

-- Unmatched entries kept for triage
CREATE TABLE IF NOT EXISTS match_failures (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id          TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    model_code      TEXT NOT NULL,
    best_confidence REAL NOT NULL,
    failure_json    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_match_failures_run ON match_failures(run_id);

-- Tier-3 similarity score cache
CREATE TABLE IF NOT EXISTS score_cache (
    id         TEXT PRIMARY KEY,
    scorer_id  TEXT NOT NULL,
    pair_hash  TEXT NOT NULL,
    similarity REAL NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(scorer_id, pair_hash)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
