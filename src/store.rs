//! SQLite article store.
//!
//! One table, `articles`, keyed by the canonical article URL. Writes from a
//! pipeline run go through [`Store::upsert`], which applies
//! [`merge`](crate::models::merge) to URLs already present so that re-running
//! the pipeline never duplicates rows or erases fetched data.
//!
//! # Schema evolution
//!
//! The table is created with its oldest shape and every later column is listed
//! in [`SCHEMA_VERSIONS`]. Opening the store adds whichever of those columns
//! are missing and stamps `PRAGMA user_version`, so databases written by older
//! releases keep working. Adding an optional field means appending a version.

use crate::error::{PipelineError, Result};
use crate::models::{Article, ArticleRecord, Enrichment, PendingArticle, merge};
use crate::utils::is_addressable_url;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT UNIQUE,
        title TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    )
"#;

/// Nullable columns added after the table's first shape. `created_at` is
/// listed for tables predating it; SQLite cannot add it with its default.
pub struct SchemaVersion {
    pub version: i64,
    pub columns: &'static [(&'static str, &'static str)],
}

pub const SCHEMA_VERSIONS: &[SchemaVersion] = &[
    SchemaVersion {
        version: 1,
        columns: &[
            ("source", "TEXT"),
            ("relevance_score", "REAL"),
            ("category", "TEXT"),
            ("summary", "TEXT"),
            ("content", "TEXT"),
            ("created_at", "TEXT"),
        ],
    },
    SchemaVersion {
        version: 2,
        columns: &[("image_url", "TEXT"), ("image_alt", "TEXT")],
    },
];

/// Scores are only trusted when SQLite holds them as numbers. Older writers
/// may have left text such as `'high'` in the column.
const NUMERIC_SCORE: &str = "typeof(relevance_score) IN ('real', 'integer')";

const ARTICLE_COLUMNS: &str = "id, CAST(source AS TEXT) AS source, CAST(url AS TEXT) AS url, \
    CAST(title AS TEXT) AS title, \
    CASE WHEN typeof(relevance_score) IN ('real', 'integer') THEN CAST(relevance_score AS REAL) END AS relevance_score, \
    CAST(category AS TEXT) AS category, CAST(summary AS TEXT) AS summary, CAST(content AS TEXT) AS content, \
    CAST(image_url AS TEXT) AS image_url, CAST(image_alt AS TEXT) AS image_alt, created_at";

const ENRICHMENT_COLUMNS: &str = "CAST(category AS TEXT) AS category, CAST(content AS TEXT) AS content, \
    CAST(image_url AS TEXT) AS image_url, CAST(image_alt AS TEXT) AS image_alt";

/// Row counts from one [`Store::upsert`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `path` and bring its schema
    /// up to date. Failing here is the one fatal error of a run.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        let version = store.schema_version().await?;
        let articles = store.count().await?;
        info!(version, articles, "Article store ready");
        Ok(store)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    #[cfg(test)]
    async fn columns(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("PRAGMA table_info(articles)")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("name")).collect())
    }

    /// Create the table and add any missing columns. Safe to run repeatedly.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(CREATE_TABLE).execute(&mut *tx).await?;

        let rows = sqlx::query("PRAGMA table_info(articles)")
            .fetch_all(&mut *tx)
            .await?;
        let existing: HashSet<String> = rows.iter().map(|row| row.get::<String, _>("name")).collect();

        let mut latest = 0;
        for schema in SCHEMA_VERSIONS {
            for (name, sql_type) in schema.columns {
                if existing.contains(*name) {
                    continue;
                }
                sqlx::query(&format!("ALTER TABLE articles ADD COLUMN {name} {sql_type}"))
                    .execute(&mut *tx)
                    .await?;
                info!(column = name, version = schema.version, "Added missing column");
            }
            latest = latest.max(schema.version);
        }
        sqlx::query(&format!("PRAGMA user_version = {latest}"))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        debug!(version = latest, "Schema up to date");
        Ok(())
    }

    pub async fn schema_version(&self) -> Result<i64> {
        let row = sqlx::query("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    /// Merge `records` into the table in a single transaction.
    ///
    /// New URLs are inserted; known URLs are reconciled with
    /// [`merge`](crate::models::merge). Records without a URL or title are
    /// skipped. Any database error rolls back the whole batch.
    #[instrument(level = "info", skip_all, fields(count = records.len()))]
    pub async fn upsert(&self, records: &[ArticleRecord]) -> Result<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();
        let mut tx = self.pool.begin().await?;

        for record in records {
            if let Err(e) = validate(record) {
                warn!(title = %record.title, url = %record.url, error = %e, "Skipping record");
                outcome.skipped += 1;
                continue;
            }

            let existing = sqlx::query_as::<_, Enrichment>(&format!(
                "SELECT {ENRICHMENT_COLUMNS} FROM articles WHERE url = ?"
            ))
            .bind(&record.url)
            .fetch_optional(&mut *tx)
            .await?;

            match existing {
                Some(existing) => {
                    let merged = merge(&existing, record);
                    sqlx::query(
                        r#"
                        UPDATE articles SET
                            source = ?, title = ?, relevance_score = ?,
                            category = ?, content = ?, image_url = ?, image_alt = ?
                        WHERE url = ?
                        "#,
                    )
                    .bind(&merged.source)
                    .bind(&merged.title)
                    .bind(merged.relevance_score)
                    .bind(&merged.category)
                    .bind(&merged.content)
                    .bind(&merged.image_url)
                    .bind(&merged.image_alt)
                    .bind(&merged.url)
                    .execute(&mut *tx)
                    .await?;
                    outcome.updated += 1;
                }
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO articles
                            (source, url, title, relevance_score, category, content, image_url, image_alt, created_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
                        "#,
                    )
                    .bind(&record.source)
                    .bind(&record.url)
                    .bind(&record.title)
                    .bind(record.relevance_score)
                    .bind(&record.category)
                    .bind(&record.content)
                    .bind(&record.image_url)
                    .bind(&record.image_alt)
                    .execute(&mut *tx)
                    .await?;
                    outcome.inserted += 1;
                }
            }
        }

        tx.commit().await?;
        info!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            skipped = outcome.skipped,
            "Upserted articles"
        );
        Ok(outcome)
    }

    /// Relevant articles with no summary and an addressable URL, oldest first.
    #[instrument(level = "info", skip(self))]
    pub async fn select_pending_summary(&self, min_relevance: f64) -> Result<Vec<PendingArticle>> {
        let pending = sqlx::query_as::<_, PendingArticle>(&format!(
            r#"
            SELECT COALESCE(CAST(title AS TEXT), '') AS title, url,
                   CAST(relevance_score AS REAL) AS relevance_score,
                   CAST(content AS TEXT) AS content
            FROM articles
            WHERE {NUMERIC_SCORE}
              AND relevance_score >= ?
              AND summary IS NULL
              AND typeof(url) = 'text'
              AND TRIM(url) <> ''
              AND (url LIKE 'http://%' OR url LIKE 'https://%')
            ORDER BY id
            "#
        ))
        .bind(min_relevance)
        .fetch_all(&self.pool)
        .await?;

        let pending: Vec<_> = pending
            .into_iter()
            .filter(|a| is_addressable_url(&a.url))
            .collect();
        info!(count = pending.len(), "Articles pending summary");
        Ok(pending)
    }

    /// Set the full text of the article at `url`. Returns whether a row matched.
    #[instrument(level = "debug", skip(self, content))]
    pub async fn update_content(&self, url: &str, content: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE articles SET content = ? WHERE url = ?")
            .bind(content)
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the summary of the article at `url`. Returns whether a row matched.
    #[instrument(level = "debug", skip(self, summary))]
    pub async fn update_summary(&self, url: &str, summary: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE articles SET summary = ? WHERE url = ?")
            .bind(summary)
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether the row for `url` already holds fetched content.
    pub async fn has_content(&self, url: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM articles WHERE url = ? AND content IS NOT NULL) AS found",
        )
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("found")? != 0)
    }

    pub async fn get_by_url(&self, url: &str) -> Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(article)
    }

    /// Newest articles at or above `min_relevance`, paginated.
    pub async fn recent(&self, min_relevance: f64, limit: i64, offset: i64) -> Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(&format!(
            r#"
            SELECT {ARTICLE_COLUMNS} FROM articles
            WHERE {NUMERIC_SCORE} AND relevance_score >= ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(min_relevance)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")?)
    }
}

fn validate(record: &ArticleRecord) -> Result<()> {
    if record.url.trim().is_empty() {
        return Err(PipelineError::InvalidRecord("missing url".into()));
    }
    if record.title.trim().is_empty() {
        return Err(PipelineError::InvalidRecord("missing title".into()));
    }
    Ok(())
}
