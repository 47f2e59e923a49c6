use crate::models::{Link, LinkUpdate, LinkVisit, NewLink, NewVisit, Owner};
use crate::storage::{LinkStore, StoreError, StoreResult, UsageCounter};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;

const LINK_COLUMNS: &str = "id, alias, domain, url, password_hash, disabled, archived, owner_id, \
     folder_id, disable_after_clicks, disable_after_date, title, description, image, created_at";

pub struct SqliteStore {
    pool: Arc<SqlitePool>,
}

impl SqliteStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        // Foreign keys are off by default in SQLite; cascade deletion of
        // visits and tag bindings depends on them.
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

fn map_insert_error(e: sqlx::Error) -> StoreError {
    if e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
    {
        StoreError::AliasTaken
    } else {
        StoreError::Other(e.into())
    }
}

#[async_trait]
impl LinkStore for SqliteStore {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                alias TEXT NOT NULL,
                domain TEXT NOT NULL,
                url TEXT NOT NULL,
                password_hash TEXT,
                disabled INTEGER NOT NULL DEFAULT 0,
                archived INTEGER NOT NULL DEFAULT 0,
                owner_id TEXT NOT NULL,
                folder_id INTEGER,
                disable_after_clicks INTEGER,
                disable_after_date INTEGER,
                title TEXT,
                description TEXT,
                image TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        // (domain, lower(alias)) is globally unique
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_links_domain_alias
             ON links(domain, LOWER(alias))",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_owner ON links(owner_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS link_visits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                link_id INTEGER NOT NULL REFERENCES links(id) ON DELETE CASCADE,
                device TEXT,
                os TEXT,
                browser TEXT,
                model TEXT,
                country TEXT,
                city TEXT,
                continent TEXT,
                referer TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_link_visits_link ON link_visits(link_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS unique_link_visits (
                link_id INTEGER NOT NULL REFERENCES links(id) ON DELETE CASCADE,
                ip_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (link_id, ip_hash)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS link_tags (
                link_id INTEGER NOT NULL REFERENCES links(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (link_id, tag_id)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                plan TEXT NOT NULL DEFAULT 'free'
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS usage_counters (
                owner_id TEXT PRIMARY KEY,
                period TEXT NOT NULL,
                events INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn create_link(&self, new: &NewLink) -> StoreResult<Link> {
        let created_at = Self::now();

        let result = sqlx::query(
            r#"
            INSERT INTO links (alias, domain, url, password_hash, owner_id, folder_id,
                               disable_after_clicks, disable_after_date,
                               title, description, image, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.alias)
        .bind(&new.domain)
        .bind(&new.url)
        .bind(&new.password_hash)
        .bind(&new.owner_id)
        .bind(new.folder_id)
        .bind(new.disable_after_clicks)
        .bind(new.disable_after_date)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.image)
        .bind(created_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(map_insert_error)?;

        let link = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE id = ?"
        ))
        .bind(result.last_insert_rowid())
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| StoreError::Other(e.into()))?;

        Ok(link)
    }

    async fn find_by_alias(&self, domain: &str, alias: &str) -> Result<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE domain = ? AND LOWER(alias) = LOWER(?)"
        ))
        .bind(domain)
        .bind(alias)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn update_link(&self, id: i64, changes: &LinkUpdate) -> StoreResult<Option<Link>> {
        let Some(current) = self
            .find_by_id(id)
            .await
            .map_err(StoreError::Other)?
        else {
            return Ok(None);
        };

        let next = changes.apply(&current);

        sqlx::query(
            r#"
            UPDATE links
            SET alias = ?, domain = ?, url = ?, password_hash = ?, disabled = ?, archived = ?,
                folder_id = ?, disable_after_clicks = ?, disable_after_date = ?,
                title = ?, description = ?, image = ?
            WHERE id = ?
            "#,
        )
        .bind(&next.alias)
        .bind(&next.domain)
        .bind(&next.url)
        .bind(&next.password_hash)
        .bind(next.disabled)
        .bind(next.archived)
        .bind(next.folder_id)
        .bind(next.disable_after_clicks)
        .bind(next.disable_after_date)
        .bind(&next.title)
        .bind(&next.description)
        .bind(&next.image)
        .bind(id)
        .execute(self.pool.as_ref())
        .await
        .map_err(map_insert_error)?;

        Ok(Some(next))
    }

    async fn delete_link(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM links WHERE id = ?")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_visit(&self, visit: &NewVisit) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO link_visits (link_id, device, os, browser, model,
                                     country, city, continent, referer, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(visit.link_id)
        .bind(&visit.device)
        .bind(&visit.os)
        .bind(&visit.browser)
        .bind(&visit.model)
        .bind(&visit.country)
        .bind(&visit.city)
        .bind(&visit.continent)
        .bind(&visit.referer)
        .bind(Self::now())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn record_unique_visit(&self, link_id: i64, ip_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO unique_link_visits (link_id, ip_hash, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(link_id, ip_hash) DO NOTHING
            "#,
        )
        .bind(link_id)
        .bind(ip_hash)
        .bind(Self::now())
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn visit_count(&self, link_id: i64) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM link_visits WHERE link_id = ?")
                .bind(link_id)
                .fetch_one(self.pool.as_ref())
                .await?;

        Ok(count.0)
    }

    async fn recent_visits(&self, link_id: i64, limit: i64) -> Result<Vec<LinkVisit>> {
        let visits = sqlx::query_as::<_, LinkVisit>(
            r#"
            SELECT id, link_id, device, os, browser, model,
                   country, city, continent, referer, created_at
            FROM link_visits
            WHERE link_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(link_id)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(visits)
    }

    async fn unique_visit_count(&self, link_id: i64) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM unique_link_visits WHERE link_id = ?")
                .bind(link_id)
                .fetch_one(self.pool.as_ref())
                .await?;

        Ok(count.0)
    }

    async fn referer_counts(&self, link_id: i64) -> Result<Vec<(Option<String>, i64)>> {
        let rows: Vec<(Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT referer, COUNT(*) AS visits
            FROM link_visits
            WHERE link_id = ?
            GROUP BY referer
            ORDER BY visits DESC
            "#,
        )
        .bind(link_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }

    async fn reset_statistics(&self, link_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM link_visits WHERE link_id = ?")
            .bind(link_id)
            .execute(self.pool.as_ref())
            .await?;
        sqlx::query("DELETE FROM unique_link_visits WHERE link_id = ?")
            .bind(link_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn owner(&self, owner_id: &str) -> Result<Option<Owner>> {
        let owner =
            sqlx::query_as::<_, Owner>("SELECT id, name, email, plan FROM users WHERE id = ?")
                .bind(owner_id)
                .fetch_optional(self.pool.as_ref())
                .await?;

        Ok(owner)
    }

    async fn upsert_owner(&self, owner: &Owner) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, plan)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name,
                                          email = excluded.email,
                                          plan = excluded.plan
            "#,
        )
        .bind(&owner.id)
        .bind(&owner.name)
        .bind(&owner.email)
        .bind(&owner.plan)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn links_created_since(&self, owner_id: &str, since: i64) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM links WHERE owner_id = ? AND created_at >= ?",
        )
        .bind(owner_id)
        .bind(since)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count.0)
    }

    async fn usage_counter(&self, owner_id: &str) -> Result<Option<UsageCounter>> {
        let row: Option<(String, String, i64)> = sqlx::query_as(
            "SELECT owner_id, period, events FROM usage_counters WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(|(owner_id, period, events)| UsageCounter {
            owner_id,
            period,
            events,
        }))
    }

    async fn set_usage_counter(&self, owner_id: &str, period: &str, events: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO usage_counters (owner_id, period, events)
            VALUES (?, ?, ?)
            ON CONFLICT(owner_id) DO UPDATE SET period = excluded.period,
                                                events = excluded.events
            "#,
        )
        .bind(owner_id)
        .bind(period)
        .bind(events)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}
