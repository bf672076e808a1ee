use crate::model::{AssetId, AssetSummary, HistoricalSeries, PricePoint, Sample, StoreError};
use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::warn;

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database file and ensures the schema exists.
    pub fn new(db_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        Self::migrate(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self { conn })
    }

    fn migrate(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS price_points (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                price REAL NOT NULL,
                fetched_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_price_points_asset_ts
                ON price_points (asset, timestamp_ms);
            ",
        )?;
        Ok(())
    }

    /// Writes every sample as its own row, outside any transaction.
    /// If row `k` fails, rows `0..k` stay written and the error is returned.
    pub fn append(&self, asset: &AssetId, samples: &[Sample]) -> Result<usize, StoreError> {
        let fetched_at = Utc::now();
        for (written, sample) in samples.iter().enumerate() {
            if let Err(e) = self.conn.execute(
                "INSERT INTO price_points (asset, timestamp_ms, price, fetched_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![asset.as_str(), sample.timestamp_ms, sample.price, fetched_at],
            ) {
                warn!(
                    "❌ Write failed for {} after {}/{} points: {}",
                    asset,
                    written,
                    samples.len(),
                    e
                );
                return Err(e.into());
            }
        }
        Ok(samples.len())
    }

    /// Full accumulated history for `asset`, oldest first; ties keep insertion order.
    pub fn query(&self, asset: &AssetId) -> Result<HistoricalSeries, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp_ms, price FROM price_points
             WHERE asset = ?1
             ORDER BY timestamp_ms ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![asset.as_str()], |row| {
            Ok(PricePoint {
                asset: asset.clone(),
                timestamp_ms: row.get(0)?,
                price: row.get(1)?,
            })
        })?;

        let points = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(HistoricalSeries::new(asset.clone(), points))
    }

    /// One summary row per stored asset, alphabetically.
    pub fn list_assets(&self) -> Result<Vec<AssetSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT asset, COUNT(*), MIN(timestamp_ms), MAX(timestamp_ms)
             FROM price_points GROUP BY asset ORDER BY asset ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            let asset: String = row.get(0)?;
            let samples: i64 = row.get(1)?;
            let first: i64 = row.get(2)?;
            let last: i64 = row.get(3)?;
            Ok((asset, samples, first, last))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (asset, samples, first, last) = row?;
            let asset = AssetId::parse(&asset)
                .ok_or_else(|| StoreError::InvalidRow(format!("blank asset name: {:?}", asset)))?;
            summaries.push(AssetSummary {
                asset,
                samples: samples as usize,
                first_timestamp_ms: first,
                last_timestamp_ms: last,
            });
        }

        Ok(summaries)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

/// Makes the next insert (and every later one) fail once `existing` rows are stored.
#[cfg(test)]
pub(crate) fn fail_inserts_after(existing: usize) -> String {
    format!(
        "CREATE TRIGGER fail_insert BEFORE INSERT ON price_points
         WHEN (SELECT COUNT(*) FROM price_points) >= {}
         BEGIN SELECT RAISE(ABORT, 'simulated write failure'); END;",
        existing
    )
}
