use std::sync::Arc;

use scylla::{Session, SessionBuilder};
use tokio::time::{Duration, sleep};

use crate::domain::types::{BlockRecord, BlockTime, HeightRange, gaps_in_sorted_heights};
use crate::error::{Error, Result};
use crate::store::traits::BlockStore;

const BLOCKS_GROUP: &str = "blocks";

type BlockRow = (i64, Option<i64>, bool, Vec<u8>, String);

/// Block table in Scylla/Cassandra. A single partition clustered by height
/// keeps height-range clustering queries valid CQL; the window sizes this
/// engine works with stay far below partition limits.
#[derive(Clone)]
pub struct ScyllaBlockStore {
    session: Arc<Session>,
    table: String,
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl ScyllaBlockStore {
    pub async fn new(nodes: &[String], keyspace: &str) -> Result<Self> {
        let mut builder = SessionBuilder::new();
        for node in nodes {
            builder = builder.known_node(node);
        }
        let session = builder
            .build()
            .await
            .map_err(|e| Error::Store(format!("scylla connect: {e}")))?;

        session
            .query_unpaged(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {keyspace} \
                     WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': 1}}"
                ),
                &[],
            )
            .await
            .map_err(|e| Error::Store(format!("create keyspace: {e}")))?;

        session
            .use_keyspace(keyspace, false)
            .await
            .map_err(|e| Error::Store(format!("use keyspace: {e}")))?;

        let table = "block_records".to_string();
        session
            .query_unpaged(
                format!(
                    "CREATE TABLE IF NOT EXISTS {table} (\
                     grp text, \
                     height bigint, \
                     ts bigint, \
                     tx_block boolean, \
                     producer_hash blob, \
                     producer_address text, \
                     PRIMARY KEY ((grp), height)\
                    )"
                ),
                &[],
            )
            .await
            .map_err(|e| Error::Store(format!("create table block_records: {e}")))?;

        Ok(Self {
            session: Arc::new(session),
            table,
            max_retries: 4,
            base_delay_ms: 25,
            max_delay_ms: 1000,
        })
    }

    pub fn with_retry_policy(
        mut self,
        max_retries: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
    ) -> Self {
        self.max_retries = max_retries;
        self.base_delay_ms = base_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    async fn with_retry<T, F, Fut>(&self, _op: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: core::future::Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt >= self.max_retries || !is_retryable_backend_error(&e) {
                        return Err(e);
                    }
                    let backoff =
                        compute_backoff_ms(attempt, self.base_delay_ms, self.max_delay_ms);
                    sleep(Duration::from_millis(backoff)).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    async fn select_rows(&self, op: &str, cql: String) -> Result<Vec<BlockRow>> {
        let res = self
            .with_retry(op, || async {
                self.session
                    .query_unpaged(cql.clone(), (BLOCKS_GROUP,))
                    .await
                    .map_err(|e| Error::Store(format!("scylla {op}: {e}")))
            })
            .await?;

        let rows_result = res
            .into_rows_result()
            .map_err(|e| Error::Store(format!("scylla {op} rows: {e}")))?;
        let iter = rows_result
            .rows::<BlockRow>()
            .map_err(|e| Error::Store(format!("scylla {op} typed rows: {e}")))?;

        let mut out = Vec::new();
        for row in iter {
            out.push(row.map_err(|e| Error::Store(format!("decode row: {e}")))?);
        }
        Ok(out)
    }
}

fn record_from_row(row: BlockRow) -> Result<BlockRecord> {
    let (height, ts, tx_block, hash, address) = row;
    let producer_puzzle_hash: [u8; 32] = hash
        .try_into()
        .map_err(|_| Error::Store("producer hash is not 32 bytes".to_string()))?;
    Ok(BlockRecord {
        height: height as u64,
        time: match ts {
            Some(t) => BlockTime::Resolved(t),
            None => BlockTime::Pending,
        },
        is_transaction_block: tx_block,
        producer_puzzle_hash,
        producer_address: address,
    })
}

#[async_trait::async_trait]
impl BlockStore for ScyllaBlockStore {
    async fn upsert(&self, record: BlockRecord) -> Result<()> {
        self.with_retry("upsert", || async {
            self.session
                .query_unpaged(
                    format!(
                        "INSERT INTO {} (grp, height, ts, tx_block, producer_hash, producer_address) \
                         VALUES (?, ?, ?, ?, ?, ?)",
                        self.table
                    ),
                    (
                        BLOCKS_GROUP,
                        record.height as i64,
                        record.time.resolved(),
                        record.is_transaction_block,
                        record.producer_puzzle_hash.to_vec(),
                        record.producer_address.clone(),
                    ),
                )
                .await
                .map_err(|e| Error::Store(format!("scylla upsert: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn get(&self, height: u64) -> Result<Option<BlockRecord>> {
        let height_param = height as i64;
        let res = self
            .with_retry("get", || async {
                self.session
                    .query_unpaged(
                        format!(
                            "SELECT height, ts, tx_block, producer_hash, producer_address \
                             FROM {} WHERE grp = ? AND height = ?",
                            self.table
                        ),
                        (BLOCKS_GROUP, height_param),
                    )
                    .await
                    .map_err(|e| Error::Store(format!("scylla get: {e}")))
            })
            .await?;

        let rows_result = res
            .into_rows_result()
            .map_err(|e| Error::Store(format!("scylla get rows: {e}")))?;
        let mut iter = rows_result
            .rows::<BlockRow>()
            .map_err(|e| Error::Store(format!("scylla get typed rows: {e}")))?;
        match iter.next() {
            Some(row) => {
                let row = row.map_err(|e| Error::Store(format!("decode row: {e}")))?;
                Ok(Some(record_from_row(row)?))
            }
            None => Ok(None),
        }
    }

    async fn min_height(&self) -> Result<Option<u64>> {
        let res = self
            .with_retry("min_height", || async {
                self.session
                    .query_unpaged(
                        format!("SELECT min(height) FROM {} WHERE grp = ?", self.table),
                        (BLOCKS_GROUP,),
                    )
                    .await
                    .map_err(|e| Error::Store(format!("scylla min: {e}")))
            })
            .await?;
        Ok(first_col_opt_i64(res).map(|v| v as u64))
    }

    async fn max_height(&self) -> Result<Option<u64>> {
        let res = self
            .with_retry("max_height", || async {
                self.session
                    .query_unpaged(
                        format!("SELECT max(height) FROM {} WHERE grp = ?", self.table),
                        (BLOCKS_GROUP,),
                    )
                    .await
                    .map_err(|e| Error::Store(format!("scylla max: {e}")))
            })
            .await?;
        Ok(first_col_opt_i64(res).map(|v| v as u64))
    }

    async fn range(&self, start_exclusive: u64, end_inclusive: u64) -> Result<Vec<BlockRecord>> {
        let (lo, hi) = (start_exclusive as i64, end_inclusive as i64);
        let res = self
            .with_retry("range", || async {
                self.session
                    .query_unpaged(
                        format!(
                            "SELECT height, ts, tx_block, producer_hash, producer_address \
                             FROM {} WHERE grp = ? AND height > ? AND height <= ?",
                            self.table
                        ),
                        (BLOCKS_GROUP, lo, hi),
                    )
                    .await
                    .map_err(|e| Error::Store(format!("scylla range: {e}")))
            })
            .await?;

        let rows_result = res
            .into_rows_result()
            .map_err(|e| Error::Store(format!("scylla range rows: {e}")))?;
        let iter = rows_result
            .rows::<BlockRow>()
            .map_err(|e| Error::Store(format!("scylla range typed rows: {e}")))?;

        let mut records = Vec::new();
        for row in iter {
            let row = row.map_err(|e| Error::Store(format!("decode row: {e}")))?;
            records.push(record_from_row(row)?);
        }
        records.sort_by_key(|r| r.height);
        Ok(records)
    }

    async fn count_range(&self, start_exclusive: u64, end_inclusive: u64) -> Result<u64> {
        let (lo, hi) = (start_exclusive as i64, end_inclusive as i64);
        let res = self
            .with_retry("count_range", || async {
                self.session
                    .query_unpaged(
                        format!(
                            "SELECT count(*) FROM {} WHERE grp = ? AND height > ? AND height <= ?",
                            self.table
                        ),
                        (BLOCKS_GROUP, lo, hi),
                    )
                    .await
                    .map_err(|e| Error::Store(format!("scylla count: {e}")))
            })
            .await?;
        Ok(first_col_opt_i64(res).unwrap_or(0) as u64)
    }

    async fn gap_ranges(&self) -> Result<Vec<HeightRange>> {
        let cql = format!("SELECT height, ts, tx_block, producer_hash, producer_address FROM {} WHERE grp = ?", self.table);
        let mut heights: Vec<u64> = self
            .select_rows("gap_ranges", cql)
            .await?
            .into_iter()
            .map(|row| row.0 as u64)
            .collect();
        heights.sort_unstable();
        Ok(gaps_in_sorted_heights(&heights))
    }

    async fn pending_time_heights(&self) -> Result<Vec<u64>> {
        let cql = format!("SELECT height, ts, tx_block, producer_hash, producer_address FROM {} WHERE grp = ?", self.table);
        let mut pending: Vec<u64> = self
            .select_rows("pending_time_heights", cql)
            .await?
            .into_iter()
            .filter(|row| row.1.is_none())
            .map(|row| row.0 as u64)
            .collect();
        pending.sort_unstable();
        Ok(pending)
    }

    async fn set_time(&self, height: u64, timestamp: i64) -> Result<()> {
        if self.get(height).await?.is_none() {
            return Err(Error::Store(format!("set_time: no record at height {height}")));
        }
        let height_param = height as i64;
        self.with_retry("set_time", || async {
            self.session
                .query_unpaged(
                    format!(
                        "UPDATE {} SET ts = ? WHERE grp = ? AND height = ?",
                        self.table
                    ),
                    (timestamp, BLOCKS_GROUP, height_param),
                )
                .await
                .map_err(|e| Error::Store(format!("scylla set_time: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.with_retry("clear", || async {
            self.session
                .query_unpaged(
                    format!("DELETE FROM {} WHERE grp = ?", self.table),
                    (BLOCKS_GROUP,),
                )
                .await
                .map_err(|e| Error::Store(format!("scylla clear: {e}")))?;
            Ok(())
        })
        .await
    }
}

fn first_col_opt_i64(res: scylla::QueryResult) -> Option<i64> {
    let rows_result = res.into_rows_result().ok()?;
    let mut it = rows_result.rows::<(Option<i64>,)>().ok()?;
    it.next().and_then(|r| r.ok()).and_then(|x| x.0)
}

fn compute_backoff_ms(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    let factor = 1u64 << core::cmp::min(attempt, 8);
    core::cmp::min(base_ms.saturating_mul(factor), max_ms)
}

fn is_retryable_backend_error(err: &Error) -> bool {
    let Error::Store(msg) = err else {
        return false;
    };
    let s = msg.to_ascii_lowercase();
    s.contains("timeout")
        || s.contains("temporar")
        || s.contains("connection")
        || s.contains("reset")
        || s.contains("refused")
        || s.contains("unavailable")
        || s.contains("overloaded")
}
