//! RocksDB-backed persistent square storage
//!
//! Squares are keyed by the hex form of their root hash and stored
//! bincode-encoded. All RocksDB calls run on the blocking pool.

use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::share::{DataHash, ExtendedDataSquare, Root, ShareError};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Square not found: {0}")]
    NotFound(DataHash),

    #[error("Invalid square: {0}")]
    Invalid(#[from] ShareError),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rocksdb::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Persistent store of extended data squares
pub struct EdsStore {
    db: Arc<DB>,
}

impl EdsStore {
    /// Create a store in a fresh temporary directory (for testing)
    pub fn new() -> Self {
        let temp_dir =
            std::env::temp_dir().join(format!("sharecast-test-{}", rand::random::<u64>()));
        Self::new_with_path(&temp_dir).expect("Failed to create test EdsStore")
    }

    /// Open or create a store at `path`
    pub fn new_with_path<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        // Lookups are always by exact root hash
        opts.optimize_for_point_lookup(256);
        opts.set_enable_pipelined_write(true);

        // Shares are erasure coded and do not compress well
        opts.set_compression_type(rocksdb::DBCompressionType::None);

        opts.increase_parallelism(num_cpus::get() as i32);
        opts.set_max_background_jobs(4);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_target_file_size_base(128 * 1024 * 1024);

        let db = DB::open(&opts, path.as_ref())?;

        info!("Opened RocksDB square store at {:?}", path.as_ref());
        Ok(Self { db: Arc::new(db) })
    }

    /// Store a square under its computed root. Storing the same square twice is a no-op.
    pub async fn put(&self, eds: &ExtendedDataSquare) -> Result<Root, StorageError> {
        let root = eds.root();
        let key = root.hash().to_hex();
        let value = bincode::serialize(eds)?;
        let size = value.len();
        let db = Arc::clone(&self.db);

        let stored = tokio::task::spawn_blocking(move || {
            if db.get_pinned(&key)?.is_some() {
                debug!("Square already exists: {}", key);
                return Ok::<bool, StorageError>(false);
            }
            db.put(&key, &value)?;
            Ok(true)
        })
        .await
        .map_err(|e| StorageError::IoError(std::io::Error::other(e.to_string())))??;

        if stored {
            info!(
                "Stored square {}, width: {}, size: {} bytes",
                root.hash(),
                eds.width(),
                size
            );
        }
        Ok(root)
    }

    /// Load the square stored under `hash`
    pub async fn get(&self, hash: &DataHash) -> Result<ExtendedDataSquare, StorageError> {
        let db = Arc::clone(&self.db);
        let key = hash.to_hex();

        let data = tokio::task::spawn_blocking(move || db.get(&key))
            .await
            .map_err(|e| StorageError::IoError(std::io::Error::other(e.to_string())))??
            .ok_or(StorageError::NotFound(*hash))?;

        Ok(bincode::deserialize(&data)?)
    }

    pub async fn has(&self, hash: &DataHash) -> bool {
        let db = Arc::clone(&self.db);
        let key = hash.to_hex();

        tokio::task::spawn_blocking(move || {
            db.get_pinned(&key).map(|opt| opt.is_some()).unwrap_or(false)
        })
        .await
        .unwrap_or(false)
    }

    /// Remove a square, failing if it is not stored
    pub async fn remove(&self, hash: &DataHash) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);
        let key = hash.to_hex();
        let missing = *hash;

        tokio::task::spawn_blocking(move || {
            if db.get_pinned(&key)?.is_none() {
                return Err(StorageError::NotFound(missing));
            }
            db.delete(&key)?;
            Ok::<(), StorageError>(())
        })
        .await
        .map_err(|e| StorageError::IoError(std::io::Error::other(e.to_string())))??;

        info!("Removed square {}", hash);
        Ok(())
    }

    /// Hashes of every stored square
    pub async fn list_hashes(&self) -> Vec<DataHash> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || {
            db.iterator(rocksdb::IteratorMode::Start)
                .flatten()
                .filter_map(|(key, _)| std::str::from_utf8(&key).ok()?.parse().ok())
                .collect()
        })
        .await
        .unwrap_or_default()
    }

    pub async fn stats(&self) -> EdsStoreStats {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || {
            let mut square_count = 0;
            let mut total_size = 0;

            for (_, value) in db.iterator(rocksdb::IteratorMode::Start).flatten() {
                square_count += 1;
                total_size += value.len();
            }

            EdsStoreStats {
                square_count,
                total_size,
            }
        })
        .await
        .unwrap_or_default()
    }

    /// Remove every stored square
    pub async fn clear(&self) {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || {
            let mut batch = WriteBatch::default();
            for (key, _) in db.iterator(rocksdb::IteratorMode::Start).flatten() {
                batch.delete(&key);
            }
            let _ = db.write(batch);
        })
        .await
        .ok();

        info!("Cleared all squares from store");
    }
}

impl Default for EdsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EdsStoreStats {
    pub square_count: usize,
    pub total_size: usize,
}
