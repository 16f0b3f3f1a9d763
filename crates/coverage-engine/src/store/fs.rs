use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::types::{BlockRecord, BlockTime, HeightRange, gaps_in_sorted_heights};
use crate::error::{Error, Result};
use crate::store::traits::BlockStore;

/// One JSON file per height under `root/blocks`. Good enough for a single
/// exporter process; uniqueness comes from the height-derived file name.
#[derive(Debug, Clone)]
pub struct FsBlockStore {
    root: PathBuf,
}

impl FsBlockStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("blocks"))
            .map_err(|e| Error::Store(format!("create fs block dir: {e}")))?;
        Ok(Self { root })
    }

    fn height_path(&self, height: u64) -> PathBuf {
        self.root.join("blocks").join(format!("{height:012}.json"))
    }

    fn sorted_heights(&self) -> Result<Vec<u64>> {
        let dir = self.root.join("blocks");
        let mut heights = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| Error::Store(format!("fs read_dir: {e}")))? {
            let entry = entry.map_err(|e| Error::Store(format!("fs dir entry: {e}")))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            let height = stem
                .parse::<u64>()
                .map_err(|_| Error::Store(format!("unexpected file in store dir: {name}")))?;
            heights.push(height);
        }
        heights.sort_unstable();
        Ok(heights)
    }

    fn read_record(&self, height: u64) -> Result<Option<BlockRecord>> {
        let path = self.height_path(height);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| Error::Store(format!("fs block read: {e}")))?;
        let record = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Store(format!("fs block decode: {e}")))?;
        Ok(Some(record))
    }

    fn write_record(&self, record: &BlockRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| Error::Store(format!("fs block encode: {e}")))?;
        fs::write(self.height_path(record.height), bytes)
            .map_err(|e| Error::Store(format!("fs block write: {e}")))
    }
}

#[async_trait::async_trait]
impl BlockStore for FsBlockStore {
    async fn upsert(&self, record: BlockRecord) -> Result<()> {
        self.write_record(&record)
    }

    async fn get(&self, height: u64) -> Result<Option<BlockRecord>> {
        self.read_record(height)
    }

    async fn min_height(&self) -> Result<Option<u64>> {
        Ok(self.sorted_heights()?.first().copied())
    }

    async fn max_height(&self) -> Result<Option<u64>> {
        Ok(self.sorted_heights()?.last().copied())
    }

    async fn range(&self, start_exclusive: u64, end_inclusive: u64) -> Result<Vec<BlockRecord>> {
        let mut out = Vec::new();
        for height in self.sorted_heights()? {
            if height > start_exclusive && height <= end_inclusive {
                match self.read_record(height)? {
                    Some(r) => out.push(r),
                    None => return Err(Error::Store(format!("record vanished at height {height}"))),
                }
            }
        }
        Ok(out)
    }

    async fn count_range(&self, start_exclusive: u64, end_inclusive: u64) -> Result<u64> {
        Ok(self
            .sorted_heights()?
            .into_iter()
            .filter(|h| *h > start_exclusive && *h <= end_inclusive)
            .count() as u64)
    }

    async fn gap_ranges(&self) -> Result<Vec<HeightRange>> {
        Ok(gaps_in_sorted_heights(&self.sorted_heights()?))
    }

    async fn pending_time_heights(&self) -> Result<Vec<u64>> {
        let mut pending = Vec::new();
        for height in self.sorted_heights()? {
            if let Some(record) = self.read_record(height)?
                && record.time.is_pending()
            {
                pending.push(height);
            }
        }
        Ok(pending)
    }

    async fn set_time(&self, height: u64, timestamp: i64) -> Result<()> {
        match self.read_record(height)? {
            Some(mut record) => {
                record.time = BlockTime::Resolved(timestamp);
                self.write_record(&record)
            }
            None => Err(Error::Store(format!("set_time: no record at height {height}"))),
        }
    }

    async fn clear(&self) -> Result<()> {
        for height in self.sorted_heights()? {
            fs::remove_file(self.height_path(height))
                .map_err(|e| Error::Store(format!("fs block remove: {e}")))?;
        }
        Ok(())
    }
}
