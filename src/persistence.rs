//! Block storage for Timechain
//!
//! Every backend keeps two indices:
//! - **by-hash**: the full block record keyed by its hash;
//! - **by-sequence**: only the hash of the block last saved at a sequence
//!   number (last write wins).
//!
//! plus two small records: the head pointer and the genesis configuration.
//! Nothing is cached; every load re-reads the backend and re-checks the
//! block's content hash.

use crate::blockchain::{check_integrity, Block, BlockHash, HASH_PREFIX};
use crate::config::StorageBackend;
use crate::error::{ChainError, Result};
use parking_lot::Mutex as PlMutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Where a saved block landed in each index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocations {
    #[serde(rename = "pathBySequence")]
    pub by_sequence: String,
    #[serde(rename = "pathByHash")]
    pub by_hash: String,
}

/// Durable description of the current chain tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadPointer {
    pub hash: BlockHash,
    pub timestamp: i64,
    pub sequence: u64,
    #[serde(flatten)]
    pub locations: StorageLocations,
}

impl HeadPointer {
    pub fn new(block: &Block, locations: StorageLocations) -> Self {
        Self {
            hash: block.hash.clone(),
            timestamp: block.header.timestamp,
            sequence: block.header.sequence,
            locations,
        }
    }
}

/// Genesis timestamp chosen at first start. Written once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    #[serde(rename = "genesisTime")]
    pub genesis_time: i64,
}

/// Abstraction for persistence backends.
///
/// `save_block` writes the by-hash record before the by-sequence entry.
/// Backends are not required to make the pair atomic; callers must tolerate a
/// sequence entry that is missing or points at a hash that cannot be loaded.
pub trait Persistence: Send + Sync {
    fn save_block(&self, block: &Block) -> Result<StorageLocations>;
    fn load_block_by_hash(&self, hash: &str) -> Result<Block>;
    fn load_block_by_sequence(&self, sequence: u64) -> Result<Block>;
    /// Locations `block` occupies (or would occupy) in this backend.
    fn locations(&self, block: &Block) -> StorageLocations;
    fn save_head(&self, head: &HeadPointer) -> Result<()>;
    fn load_head(&self) -> Result<Option<HeadPointer>>;
    fn save_genesis_config(&self, config: &GenesisConfig) -> Result<()>;
    fn load_genesis_config(&self) -> Result<Option<GenesisConfig>>;
}

/// Open the configured backend under `data_dir`.
pub fn open_backend(backend: StorageBackend, data_dir: &Path) -> Result<Arc<dyn Persistence>> {
    match backend {
        StorageBackend::File => Ok(Arc::new(FileStore::open(data_dir)?)),
        StorageBackend::Sqlite => {
            let path = data_dir.join("timechain.sqlite");
            Ok(Arc::new(Database::open(&path.to_string_lossy())?))
        }
    }
}

fn strip_prefix(hash: &str) -> &str {
    hash.strip_prefix(HASH_PREFIX).unwrap_or(hash)
}

/// Canonical `0x`-prefixed form of a lookup key. `GENESIS` and `0xGENESIS`
/// name the same record on every backend.
pub fn hash_key(hash: &str) -> BlockHash {
    format!("{}{}", HASH_PREFIX, strip_prefix(hash))
}

/// Integrity gate shared by every backend: the content hash must verify and
/// the record must be the one stored under `key`.
fn verified(block: Block, key: &str) -> Result<Block> {
    check_integrity(&block)?;
    if strip_prefix(&block.hash) != strip_prefix(key) {
        return Err(ChainError::IntegrityError {
            have: block.hash,
            want: key.to_string(),
        });
    }
    Ok(block)
}

// ============================================================================
// File backend
// ============================================================================

pub const BLOCKS_ROOT: &str = "storage/block";
pub const DIR_BY_SEQUENCE: &str = "by-sequence";
pub const DIR_BY_HASH: &str = "by-hash";
pub const HEAD_FILE: &str = "HEAD.json";
pub const CONFIG_FILE: &str = "CONFIG.json";

/// JSON files under `<data_dir>/storage/block`.
///
/// Each file is replaced atomically (temp file + rename), but a block's two
/// index files are written one after the other with no repair on restart.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let root = data_dir.as_ref().join(BLOCKS_ROOT);
        fs::create_dir_all(root.join(DIR_BY_HASH))?;
        fs::create_dir_all(root.join(DIR_BY_SEQUENCE))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_by_sequence(&self, sequence: u64) -> PathBuf {
        self.root.join(DIR_BY_SEQUENCE).join(format!("{}.json", sequence))
    }

    /// Hashes arrive from the network, so only plain alphanumeric keys map to
    /// a file name.
    pub fn path_by_hash(&self, hash: &str) -> Result<PathBuf> {
        let key = strip_prefix(hash);
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ChainError::BlockNotFound(hash.to_string()));
        }
        Ok(self.root.join(DIR_BY_HASH).join(format!("{}.json", key)))
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let data = serde_json::to_vec_pretty(value)?;
        let dir = path.parent().unwrap_or(&self.root);
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ChainError::IoError(e.error.to_string()))?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::from_slice(&raw).map_err(|e| {
            ChainError::SerializationError(format!("failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Some(value))
    }
}

impl Persistence for FileStore {
    fn save_block(&self, block: &Block) -> Result<StorageLocations> {
        let hash_path = self.path_by_hash(&block.hash)?;
        let sequence_path = self.path_by_sequence(block.header.sequence);

        self.write_json(&hash_path, block)?;
        self.write_json(&sequence_path, &block.hash)?;

        Ok(StorageLocations {
            by_sequence: sequence_path.display().to_string(),
            by_hash: hash_path.display().to_string(),
        })
    }

    fn load_block_by_hash(&self, hash: &str) -> Result<Block> {
        let path = self.path_by_hash(hash)?;
        let block: Block = Self::read_json(&path)?
            .ok_or_else(|| ChainError::BlockNotFound(hash.to_string()))?;
        verified(block, hash)
    }

    fn load_block_by_sequence(&self, sequence: u64) -> Result<Block> {
        let path = self.path_by_sequence(sequence);
        let hash: BlockHash = Self::read_json(&path)?
            .ok_or_else(|| ChainError::BlockNotFound(format!("sequence {}", sequence)))?;
        self.load_block_by_hash(&hash)
    }

    fn locations(&self, block: &Block) -> StorageLocations {
        let by_hash = self
            .path_by_hash(&block.hash)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        StorageLocations {
            by_sequence: self.path_by_sequence(block.header.sequence).display().to_string(),
            by_hash,
        }
    }

    fn save_head(&self, head: &HeadPointer) -> Result<()> {
        self.write_json(&self.root.join(HEAD_FILE), head)
    }

    fn load_head(&self) -> Result<Option<HeadPointer>> {
        Self::read_json(&self.root.join(HEAD_FILE))
    }

    fn save_genesis_config(&self, config: &GenesisConfig) -> Result<()> {
        self.write_json(&self.root.join(CONFIG_FILE), config)
    }

    fn load_genesis_config(&self) -> Result<Option<GenesisConfig>> {
        Self::read_json(&self.root.join(CONFIG_FILE))
    }
}

// ============================================================================
// SQLite backend
// ============================================================================

const META_HEAD: &str = "head";
const META_GENESIS: &str = "genesis_config";

/// SQLite-backed store. Both index rows of a block are written in one
/// transaction.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks_by_hash (
                hash TEXT PRIMARY KEY,
                record TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create blocks_by_hash table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks_by_sequence (
                sequence INTEGER PRIMARY KEY,
                hash TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::DatabaseError(format!("Failed to create blocks_by_sequence table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create metadata table: {}", e)))?;

        Ok(Database { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))
    }

    fn sequence_key(sequence: u64) -> Result<i64> {
        i64::try_from(sequence)
            .map_err(|_| ChainError::DatabaseError(format!("sequence {} out of range", sequence)))
    }

    fn put_metadata<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, json],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to save {}: {}", key, e)))?;
        Ok(())
    }

    fn get_metadata<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        raw.map(|json| serde_json::from_str(&json).map_err(ChainError::from))
            .transpose()
    }
}

impl Persistence for Database {
    fn save_block(&self, block: &Block) -> Result<StorageLocations> {
        let record = serde_json::to_string(block)?;
        let sequence = Self::sequence_key(block.header.sequence)?;

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;
        tx.execute(
            "INSERT OR REPLACE INTO blocks_by_hash (hash, record) VALUES (?1, ?2)",
            params![hash_key(&block.hash), record],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to save block: {}", e)))?;
        tx.execute(
            "INSERT OR REPLACE INTO blocks_by_sequence (sequence, hash) VALUES (?1, ?2)",
            params![sequence, block.hash],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to index block: {}", e)))?;
        tx.commit().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(self.locations(block))
    }

    fn load_block_by_hash(&self, hash: &str) -> Result<Block> {
        let record: Option<String> = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT record FROM blocks_by_hash WHERE hash = ?1",
                params![hash_key(hash)],
                |row| row.get(0),
            )
            .optional()?
        };
        let record = record.ok_or_else(|| ChainError::BlockNotFound(hash.to_string()))?;
        let block: Block = serde_json::from_str(&record)?;
        verified(block, hash)
    }

    fn load_block_by_sequence(&self, sequence: u64) -> Result<Block> {
        let key = Self::sequence_key(sequence)?;
        let hash: Option<String> = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT hash FROM blocks_by_sequence WHERE sequence = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?
        };
        let hash = hash.ok_or_else(|| ChainError::BlockNotFound(format!("sequence {}", sequence)))?;
        self.load_block_by_hash(&hash)
    }

    fn locations(&self, block: &Block) -> StorageLocations {
        StorageLocations {
            by_sequence: format!("sqlite:blocks_by_sequence/{}", block.header.sequence),
            by_hash: format!("sqlite:blocks_by_hash/{}", block.hash),
        }
    }

    fn save_head(&self, head: &HeadPointer) -> Result<()> {
        self.put_metadata(META_HEAD, head)
    }

    fn load_head(&self) -> Result<Option<HeadPointer>> {
        self.get_metadata(META_HEAD)
    }

    fn save_genesis_config(&self, config: &GenesisConfig) -> Result<()> {
        self.put_metadata(META_GENESIS, config)
    }

    fn load_genesis_config(&self) -> Result<Option<GenesisConfig>> {
        self.get_metadata(META_GENESIS)
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Debug, Default)]
struct MemoryInner {
    by_hash: HashMap<BlockHash, Block>,
    by_sequence: HashMap<u64, BlockHash>,
    head: Option<HeadPointer>,
    genesis: Option<GenesisConfig>,
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    inner: Arc<PlMutex<MemoryInner>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blocks held in the by-hash index.
    pub fn block_count(&self) -> usize {
        self.inner.lock().by_hash.len()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_block(&self, block: &Block) -> Result<StorageLocations> {
        let mut inner = self.inner.lock();
        inner.by_hash.insert(hash_key(&block.hash), block.clone());
        inner.by_sequence.insert(block.header.sequence, block.hash.clone());
        Ok(self.locations(block))
    }

    fn load_block_by_hash(&self, hash: &str) -> Result<Block> {
        let block = self
            .inner
            .lock()
            .by_hash
            .get(&hash_key(hash))
            .cloned()
            .ok_or_else(|| ChainError::BlockNotFound(hash.to_string()))?;
        verified(block, hash)
    }

    fn load_block_by_sequence(&self, sequence: u64) -> Result<Block> {
        let hash = self
            .inner
            .lock()
            .by_sequence
            .get(&sequence)
            .cloned()
            .ok_or_else(|| ChainError::BlockNotFound(format!("sequence {}", sequence)))?;
        self.load_block_by_hash(&hash)
    }

    fn locations(&self, block: &Block) -> StorageLocations {
        StorageLocations {
            by_sequence: format!("memory:by-sequence/{}", block.header.sequence),
            by_hash: format!("memory:by-hash/{}", block.hash),
        }
    }

    fn save_head(&self, head: &HeadPointer) -> Result<()> {
        self.inner.lock().head = Some(head.clone());
        Ok(())
    }

    fn load_head(&self) -> Result<Option<HeadPointer>> {
        Ok(self.inner.lock().head.clone())
    }

    fn save_genesis_config(&self, config: &GenesisConfig) -> Result<()> {
        self.inner.lock().genesis = Some(*config);
        Ok(())
    }

    fn load_genesis_config(&self) -> Result<Option<GenesisConfig>> {
        Ok(self.inner.lock().genesis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{Roots, GENESIS_HASH};
    use tempfile::TempDir;

    const GENESIS_TIME: i64 = 1_000;

    fn chain_of(timestamps: &[i64]) -> Vec<Block> {
        let mut blocks = vec![Block::genesis(GENESIS_TIME, "test", &Roots::default())];
        for ts in timestamps {
            let parent = blocks.last().cloned();
            let child = Block::child(parent.as_ref(), *ts, GENESIS_TIME, &Roots::default(), "test")
                .unwrap();
            blocks.push(child);
        }
        blocks
    }

    fn backends(dir: &TempDir) -> Vec<(&'static str, Box<dyn Persistence>)> {
        vec![
            ("file", Box::new(FileStore::open(dir.path()).unwrap()) as Box<dyn Persistence>),
            ("sqlite", Box::new(Database::open(":memory:").unwrap()) as Box<dyn Persistence>),
            ("memory", Box::new(InMemoryPersistence::new()) as Box<dyn Persistence>),
        ]
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        for (name, store) in backends(&dir) {
            for block in chain_of(&[1_001, 1_003, 1_007]) {
                store.save_block(&block).unwrap();
                let by_hash = store.load_block_by_hash(&block.hash).unwrap();
                let by_seq = store.load_block_by_sequence(block.header.sequence).unwrap();
                assert_eq!(by_hash, block, "backend {}", name);
                assert_eq!(by_seq, block, "backend {}", name);
            }
        }
    }

    #[test]
    fn test_missing_keys_are_not_found() {
        let dir = TempDir::new().unwrap();
        for (name, store) in backends(&dir) {
            let err = store.load_block_by_hash("0xdeadbeef").unwrap_err();
            assert!(err.is_not_found(), "backend {}", name);
            let err = store.load_block_by_sequence(99).unwrap_err();
            assert!(err.is_not_found(), "backend {}", name);
            assert!(store.load_head().unwrap().is_none());
            assert!(store.load_genesis_config().unwrap().is_none());
        }
    }

    #[test]
    fn test_hash_keys_match_with_or_without_prefix() {
        let dir = TempDir::new().unwrap();
        for (name, store) in backends(&dir) {
            let blocks = chain_of(&[1_004]);
            for block in &blocks {
                store.save_block(block).unwrap();
            }
            assert_eq!(store.load_block_by_hash("GENESIS").unwrap(), blocks[0], "backend {}", name);
            assert_eq!(store.load_block_by_hash(GENESIS_HASH).unwrap(), blocks[0], "backend {}", name);

            let bare = blocks[1].hash.trim_start_matches(HASH_PREFIX);
            assert_eq!(store.load_block_by_hash(bare).unwrap(), blocks[1], "backend {}", name);
        }
    }

    #[test]
    fn test_hash_key_normalises_prefix() {
        assert_eq!(hash_key("GENESIS"), GENESIS_HASH);
        assert_eq!(hash_key(GENESIS_HASH), GENESIS_HASH);
        assert_eq!(hash_key(""), "0x");
    }

    #[test]
    fn test_sequence_collision_last_write_wins() {
        let dir = TempDir::new().unwrap();
        for (name, store) in backends(&dir) {
            let blocks = chain_of(&[1_005]);
            let first = blocks[1].clone();
            let second =
                Block::child(Some(&blocks[0]), 1_005, GENESIS_TIME, &Roots::default(), "other")
                    .unwrap();
            assert_eq!(first.header.sequence, second.header.sequence);
            assert_ne!(first.hash, second.hash);

            store.save_block(&first).unwrap();
            store.save_block(&second).unwrap();

            assert_eq!(store.load_block_by_sequence(5).unwrap(), second, "backend {}", name);
            // The superseded block stays reachable by hash.
            assert_eq!(store.load_block_by_hash(&first.hash).unwrap(), first, "backend {}", name);
        }
    }

    #[test]
    fn test_head_and_genesis_records() {
        let dir = TempDir::new().unwrap();
        for (_, store) in backends(&dir) {
            let blocks = chain_of(&[1_002]);
            let locations = store.save_block(&blocks[1]).unwrap();
            let head = HeadPointer::new(&blocks[1], locations.clone());
            store.save_head(&head).unwrap();
            assert_eq!(store.load_head().unwrap(), Some(head));
            assert_eq!(store.locations(&blocks[1]), locations);

            let config = GenesisConfig { genesis_time: GENESIS_TIME };
            store.save_genesis_config(&config).unwrap();
            assert_eq!(store.load_genesis_config().unwrap(), Some(config));
        }
    }

    #[test]
    fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let blocks = chain_of(&[1_004]);
        let genesis_loc = store.save_block(&blocks[0]).unwrap();
        let loc = store.save_block(&blocks[1]).unwrap();

        assert!(genesis_loc.by_hash.ends_with("by-hash/GENESIS.json"));
        assert!(genesis_loc.by_sequence.ends_with("by-sequence/0.json"));
        assert!(loc.by_sequence.ends_with("by-sequence/4.json"));

        // The sequence index holds only the hash, as a JSON string.
        let raw = fs::read_to_string(&loc.by_sequence).unwrap();
        let indexed: String = serde_json::from_str(&raw).unwrap();
        assert_eq!(indexed, blocks[1].hash);

        let raw = fs::read_to_string(&genesis_loc.by_hash).unwrap();
        let record: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(record["hash"], GENESIS_HASH);
    }

    #[test]
    fn test_tampered_file_fails_integrity() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let block = chain_of(&[1_006]).pop().unwrap();
        let loc = store.save_block(&block).unwrap();

        let mut tampered = block.clone();
        tampered.header.extra_data = "forged".to_string();
        fs::write(&loc.by_hash, serde_json::to_vec(&tampered).unwrap()).unwrap();

        let err = store.load_block_by_hash(&block.hash).unwrap_err();
        assert!(matches!(err, ChainError::IntegrityError { .. }));
        let err = store.load_block_by_sequence(6).unwrap_err();
        assert!(matches!(err, ChainError::IntegrityError { .. }));
    }

    #[test]
    fn test_record_under_wrong_key_fails_integrity() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let blocks = chain_of(&[1_001, 1_002]);
        let loc = store.save_block(&blocks[1]).unwrap();
        fs::write(&loc.by_hash, serde_json::to_vec(&blocks[2]).unwrap()).unwrap();

        let err = store.load_block_by_hash(&blocks[1].hash).unwrap_err();
        assert!(matches!(err, ChainError::IntegrityError { .. }));
    }

    #[test]
    fn test_crash_window_between_index_writes() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let blocks = chain_of(&[1_003, 1_008]);

        // Crash after by-hash, before by-sequence: reachable only by hash.
        let loc = store.save_block(&blocks[1]).unwrap();
        fs::remove_file(&loc.by_sequence).unwrap();
        assert_eq!(store.load_block_by_hash(&blocks[1].hash).unwrap(), blocks[1]);
        assert!(store.load_block_by_sequence(3).unwrap_err().is_not_found());

        // Sequence entry pointing at a block that never became durable.
        let loc = store.save_block(&blocks[2]).unwrap();
        fs::remove_file(&loc.by_hash).unwrap();
        assert!(store.load_block_by_sequence(8).unwrap_err().is_not_found());
    }

    #[test]
    fn test_unsafe_hash_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for key in ["../../etc/passwd", "0x../HEAD", "", "0x", "0xab/cd"] {
            assert!(store.load_block_by_hash(key).unwrap_err().is_not_found(), "key {:?}", key);
        }
    }

    #[test]
    fn test_file_store_reopens_existing_data() {
        let dir = TempDir::new().unwrap();
        let blocks = chain_of(&[1_002]);
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.save_block(&blocks[1]).unwrap();
        }
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.load_block_by_sequence(2).unwrap(), blocks[1]);
    }
}
