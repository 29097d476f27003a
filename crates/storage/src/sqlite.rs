use crate::{connect, migrate, FileRecord, LedgerEntries, LedgerError, LedgerStore};
use sqlx::{Row, SqlitePool};

/// Keyed ledger table with one row per path and point upserts.
#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and applies the ledger schema.
    pub async fn open(database_url: &str) -> Result<Self, LedgerError> {
        let pool = connect(database_url).await?;
        migrate(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait::async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn load(&self) -> Result<LedgerEntries, LedgerError> {
        let rows = sqlx::query("SELECT path, mtime, hash FROM ledger ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let path: String = row.get(0);
            entries.push((
                path,
                FileRecord {
                    mtime: row.get(1),
                    hash: row.get(2),
                },
            ));
        }
        Ok(entries)
    }

    async fn persist(
        &self,
        path: &str,
        record: &FileRecord,
        _snapshot: &[(String, FileRecord)],
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO ledger (path, mtime, hash, updated_at)
            VALUES (?1, ?2, ?3, strftime('%s','now'))
            ON CONFLICT(path) DO UPDATE SET
                mtime = excluded.mtime,
                hash = excluded.hash,
                updated_at = strftime('%s','now')
            "#,
        )
        .bind(path)
        .bind(record.mtime)
        .bind(&record.hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
