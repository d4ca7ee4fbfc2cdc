//! libSQL storage layer for reconciliation runs.
//!
//! The [`Storage`] struct wraps a libSQL database for run history, terminal
//! product specifications, match-failure triage records, and the tier-3
//! similarity score cache.
//!
//! **Access rules:**
//! - CLI: read-write (sole writer) via [`Storage::open`]
//! - Reporting/inspection tools: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use uuid::Uuid;

use lineup_shared::{LineupError, MatchFailure, ProductSpecification, Result};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LineupError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LineupError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LineupError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LineupError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LineupError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

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
                        LineupError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
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

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LineupError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run operations
    // -----------------------------------------------------------------------

    /// Insert a new run record.
    pub async fn insert_run(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, started_at) VALUES (?1, ?2)",
                params![id, now.as_str()],
            )
            .await
            .map_err(|e| LineupError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Mark a run finished and attach its stats.
    pub async fn finish_run(&self, id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, id],
            )
            .await
            .map_err(|e| LineupError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List all runs, newest first.
    /// Returns `Vec<(id, started_at, finished_at, stats_json)>`.
    pub async fn list_runs(
        &self,
    ) -> Result<Vec<(String, String, Option<String>, Option<String>)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, started_at, finished_at, stats_json FROM runs ORDER BY started_at DESC",
                params![],
            )
            .await
            .map_err(|e| LineupError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push((
                row.get::<String>(0)
                    .map_err(|e| LineupError::Storage(e.to_string()))?,
                row.get::<String>(1)
                    .map_err(|e| LineupError::Storage(e.to_string()))?,
                row.get::<String>(2).ok(),
                row.get::<String>(3).ok(),
            ));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Product specification operations
    // -----------------------------------------------------------------------

    /// Insert a terminal product specification (upserts by run + code).
    pub async fn insert_product_spec(
        &self,
        run_id: &str,
        spec: &ProductSpecification,
    ) -> Result<()> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let spec_json = serde_json::to_string(spec)
            .map_err(|e| LineupError::Storage(format!("spec serialization failed: {e}")))?;
        self.conn
            .execute(
                "INSERT INTO product_specs
                     (id, run_id, model_code, confidence, confidence_level, requires_review, spec_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(run_id, model_code) DO UPDATE SET
                   confidence = excluded.confidence,
                   confidence_level = excluded.confidence_level,
                   requires_review = excluded.requires_review,
                   spec_json = excluded.spec_json",
                params![
                    id.as_str(),
                    run_id,
                    spec.model_code.as_str(),
                    spec.confidence_score,
                    spec.confidence_level.as_str(),
                    spec.requires_human_review as i64,
                    spec_json.as_str(),
                ],
            )
            .await
            .map_err(|e| LineupError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List all specifications for a run, by model code.
    pub async fn list_specs_by_run(&self, run_id: &str) -> Result<Vec<ProductSpecification>> {
        let mut rows = self
            .conn
            .query(
                "SELECT spec_json FROM product_specs WHERE run_id = ?1 ORDER BY model_code",
                params![run_id],
            )
            .await
            .map_err(|e| LineupError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let json: String = row
                .get(0)
                .map_err(|e| LineupError::Storage(e.to_string()))?;
            let spec: ProductSpecification = serde_json::from_str(&json)
                .map_err(|e| LineupError::Storage(format!("corrupt spec_json: {e}")))?;
            results.push(spec);
        }
        Ok(results)
    }

    /// List a run's review queue: flagged specs, lowest confidence first.
    pub async fn list_review_queue(&self, run_id: &str) -> Result<Vec<ProductSpecification>> {
        let mut rows = self
            .conn
            .query(
                "SELECT spec_json FROM product_specs
                 WHERE run_id = ?1 AND requires_review = 1
                 ORDER BY confidence ASC, model_code",
                params![run_id],
            )
            .await
            .map_err(|e| LineupError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let json: String = row
                .get(0)
                .map_err(|e| LineupError::Storage(e.to_string()))?;
            let spec: ProductSpecification = serde_json::from_str(&json)
                .map_err(|e| LineupError::Storage(format!("corrupt spec_json: {e}")))?;
            results.push(spec);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Match failure operations
    // -----------------------------------------------------------------------

    /// Insert a match-failure triage record.
    pub async fn insert_match_failure(&self, run_id: &str, failure: &MatchFailure) -> Result<()> {
        self.check_writable()?;
        let failure_json = serde_json::to_string(failure)
            .map_err(|e| LineupError::Storage(format!("failure serialization failed: {e}")))?;
        self.conn
            .execute(
                "INSERT INTO match_failures (run_id, model_code, best_confidence, failure_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    run_id,
                    failure.model_code.as_str(),
                    failure.best_confidence,
                    failure_json.as_str(),
                ],
            )
            .await
            .map_err(|e| LineupError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List a run's failures, lowest confidence first.
    pub async fn list_failures_by_run(&self, run_id: &str) -> Result<Vec<MatchFailure>> {
        let mut rows = self
            .conn
            .query(
                "SELECT failure_json FROM match_failures
                 WHERE run_id = ?1
                 ORDER BY best_confidence ASC, model_code",
                params![run_id],
            )
            .await
            .map_err(|e| LineupError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let json: String = row
                .get(0)
                .map_err(|e| LineupError::Storage(e.to_string()))?;
            let failure: MatchFailure = serde_json::from_str(&json)
                .map_err(|e| LineupError::Storage(format!("corrupt failure_json: {e}")))?;
            results.push(failure);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Score cache operations
    // -----------------------------------------------------------------------

    /// Get a cached similarity score.
    pub async fn get_cached_score(
        &self,
        scorer_id: &str,
        pair_hash: &str,
    ) -> Result<Option<f64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT similarity FROM score_cache
                 WHERE scorer_id = ?1 AND pair_hash = ?2",
                params![scorer_id, pair_hash],
            )
            .await
            .map_err(|e| LineupError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let similarity: f64 = row
                    .get(0)
                    .map_err(|e| LineupError::Storage(e.to_string()))?;
                Ok(Some(similarity))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(LineupError::Storage(e.to_string())),
        }
    }

    /// Store a similarity score in the cache (upserts).
    pub async fn set_cached_score(
        &self,
        scorer_id: &str,
        pair_hash: &str,
        similarity: f64,
    ) -> Result<()> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO score_cache (id, scorer_id, pair_hash, similarity, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(scorer_id, pair_hash) DO UPDATE SET
                   similarity = excluded.similarity,
                   created_at = excluded.created_at",
                params![id.as_str(), scorer_id, pair_hash, similarity, now.as_str()],
            )
            .await
            .map_err(|e| LineupError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Invalidate all cached scores for one scorer backend.
    pub async fn invalidate_score_cache(&self, scorer_id: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM score_cache WHERE scorer_id = ?1",
                params![scorer_id],
            )
            .await
            .map_err(|e| LineupError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineup_shared::{ConfidenceLevel, MatchMethod};
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("lineup_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn spec(code: &str, confidence: f64, review: bool) -> ProductSpecification {
        ProductSpecification {
            model_code: code.into(),
            processing_id: Uuid::now_v7(),
            brand: "SKI-DOO".into(),
            model_year: 2025,
            price: 14_990.0,
            currency: "EUR".into(),
            base_model_id: Some("summit-x".into()),
            base_model_name: Some("SUMMIT X".into()),
            specifications: Default::default(),
            customizations: Default::default(),
            spring_options: vec![],
            confidence_score: confidence,
            confidence_level: ConfidenceLevel::from_score(confidence),
            completed_stages: vec![],
            validation_notes: vec![],
            requires_human_review: review,
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("lineup_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let storage = test_storage().await;
        let run_id = Uuid::now_v7().to_string();

        storage.insert_run(&run_id).await.expect("insert run");
        storage
            .finish_run(&run_id, r#"{"price_entries": 10}"#)
            .await
            .expect("finish run");

        let runs = storage.list_runs().await.expect("list runs");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].0, run_id);
        assert!(runs[0].2.is_some());
        assert!(runs[0].3.as_deref().unwrap().contains("price_entries"));
    }

    #[tokio::test]
    async fn spec_upsert_and_query() {
        let storage = test_storage().await;
        let run_id = Uuid::now_v7().to_string();
        storage.insert_run(&run_id).await.unwrap();

        storage
            .insert_product_spec(&run_id, &spec("TLTA", 0.95, false))
            .await
            .expect("insert spec");

        // Upsert with a revised confidence
        storage
            .insert_product_spec(&run_id, &spec("TLTA", 0.85, true))
            .await
            .expect("upsert spec");

        let specs = storage.list_specs_by_run(&run_id).await.expect("list");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].confidence_score, 0.85);
        assert!(specs[0].requires_human_review);
    }

    #[tokio::test]
    async fn review_queue_orders_worst_first() {
        let storage = test_storage().await;
        let run_id = Uuid::now_v7().to_string();
        storage.insert_run(&run_id).await.unwrap();

        for (code, confidence, review) in [
            ("AAAA", 0.95, false),
            ("BBBB", 0.55, true),
            ("CCCC", 0.30, true),
        ] {
            storage
                .insert_product_spec(&run_id, &spec(code, confidence, review))
                .await
                .unwrap();
        }

        let queue = storage.list_review_queue(&run_id).await.expect("queue");
        let codes: Vec<&str> = queue.iter().map(|s| s.model_code.as_str()).collect();
        assert_eq!(codes, vec!["CCCC", "BBBB"]);
    }

    #[tokio::test]
    async fn failure_records_roundtrip() {
        let storage = test_storage().await;
        let run_id = Uuid::now_v7().to_string();
        storage.insert_run(&run_id).await.unwrap();

        let failure = MatchFailure {
            model_code: "EXPA".into(),
            best_confidence: 0.31,
            attempted_method: MatchMethod::None,
            reasons: vec!["no tier cleared its matching threshold".into()],
        };
        storage
            .insert_match_failure(&run_id, &failure)
            .await
            .expect("insert failure");

        let failures = storage
            .list_failures_by_run(&run_id)
            .await
            .expect("list failures");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].model_code, "EXPA");
        assert_eq!(failures[0].attempted_method, MatchMethod::None);
    }

    #[tokio::test]
    async fn score_cache_roundtrip() {
        let storage = test_storage().await;

        // Miss
        let cached = storage
            .get_cached_score("lexical", "hash1")
            .await
            .expect("get cache miss");
        assert!(cached.is_none());

        // Set
        storage
            .set_cached_score("lexical", "hash1", 0.73)
            .await
            .expect("set cache");

        // Hit
        let cached = storage
            .get_cached_score("lexical", "hash1")
            .await
            .expect("get cache hit");
        assert_eq!(cached, Some(0.73));

        // Invalidate
        storage
            .invalidate_score_cache("lexical")
            .await
            .expect("invalidate");
        let cached = storage
            .get_cached_score("lexical", "hash1")
            .await
            .expect("get after invalidate");
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("lineup_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_run("run1").await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        let result = ro.insert_run("run2").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
