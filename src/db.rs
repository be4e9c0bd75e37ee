pub mod portal;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::db::portal::PortalQuery;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS portal (
    guid       TEXT PRIMARY KEY,
    mxid       TEXT UNIQUE,
    name       TEXT NOT NULL DEFAULT '',
    avatar     TEXT NOT NULL DEFAULT '',
    avatar_url TEXT,
    encrypted  BOOLEAN NOT NULL DEFAULT false
)";

/// Handle on the bridge's store. Opens the pool, makes sure the schema
/// exists, and hands out query gateways.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> sqlx::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(url)
            .await?;
        Self::init(pool).await
    }

    pub async fn from_env() -> anyhow::Result<Self> {
        let url = dotenv::var("DATABASE_URL")?;
        Ok(Self::connect(&url).await?)
    }

    /// In-memory store, mostly for tests. Pinned to a single connection:
    /// every connection to `sqlite::memory:` gets its own blank database.
    pub async fn in_memory() -> sqlx::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> sqlx::Result<Self> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn portal(&self) -> PortalQuery {
        PortalQuery::new(self.pool.clone())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
