//! Block headers, blocks and their construction.
//!
//! # Canonical header encoding
//!
//! A block hash is `0x` followed by the lowercase hex SHA-256 digest of the
//! header's canonical encoding. The encoding is part of the storage and wire
//! format and must never change; it is the concatenation of, in this order:
//!
//! | field              | encoding                                   |
//! |--------------------|--------------------------------------------|
//! | `parent_hash`      | u64 LE byte length, then UTF-8 bytes        |
//! | `timestamp`        | i64 LE                                     |
//! | `sequence`         | u64 LE                                     |
//! | `state_root`       | u64 LE byte length, then UTF-8 bytes        |
//! | `transactions_root`| u64 LE byte length, then UTF-8 bytes        |
//! | `receipts_root`    | u64 LE byte length, then UTF-8 bytes        |
//! | `events_root`      | u64 LE byte length, then UTF-8 bytes        |
//! | `extra_data`       | u64 LE byte length, then UTF-8 bytes        |
//!
//! The genesis block is the exception: it carries [`GENESIS_HASH`] instead of
//! its content hash, so every node with the same genesis timestamp agrees on
//! the genesis identity even when `extra_data` differs.

use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type BlockHash = String;

pub const HASH_PREFIX: &str = "0x";

/// Parent of genesis and the value of every unpopulated content root.
pub const ZERO_HASH: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

/// Identity of every genesis block, independent of its header contents.
pub const GENESIS_HASH: &str = "0xGENESIS";

/// Sequence number of a block produced at `timestamp`: seconds elapsed since
/// genesis, saturating at zero for clocks behind the genesis time.
pub fn sequence_for(timestamp: i64, genesis_time: i64) -> u64 {
    if timestamp > genesis_time {
        timestamp.abs_diff(genesis_time)
    } else {
        0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub parent_hash: BlockHash,
    pub timestamp: i64,
    #[serde(rename = "vtcunix")]
    pub sequence: u64,
    pub state_root: BlockHash,
    pub transactions_root: BlockHash,
    pub receipts_root: BlockHash,
    pub events_root: BlockHash,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub extra_data: String,
}

impl BlockHeader {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(512);
        put_str(&mut out, &self.parent_hash);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        put_str(&mut out, &self.state_root);
        put_str(&mut out, &self.transactions_root);
        put_str(&mut out, &self.receipts_root);
        put_str(&mut out, &self.events_root);
        put_str(&mut out, &self.extra_data);
        out
    }

    /// Content hash of this header.
    pub fn hash(&self) -> BlockHash {
        let digest = Sha256::digest(self.canonical_bytes());
        format!("{}{}", HASH_PREFIX, hex::encode(digest))
    }
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u64).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

/// Content roots placed in a new header. Nothing populates them yet, so the
/// default is the zero hash for all four; empty strings are normalised to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roots {
    pub state_root: BlockHash,
    pub transactions_root: BlockHash,
    pub receipts_root: BlockHash,
    pub events_root: BlockHash,
}

impl Default for Roots {
    fn default() -> Self {
        Self {
            state_root: ZERO_HASH.to_string(),
            transactions_root: ZERO_HASH.to_string(),
            receipts_root: ZERO_HASH.to_string(),
            events_root: ZERO_HASH.to_string(),
        }
    }
}

fn or_zero(root: &str) -> BlockHash {
    if root.is_empty() {
        ZERO_HASH.to_string()
    } else {
        root.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub hash: BlockHash,
}

impl Block {
    /// Build the genesis block. Its hash is always [`GENESIS_HASH`].
    pub fn genesis(genesis_time: i64, extra_data: &str, roots: &Roots) -> Self {
        let header = BlockHeader {
            parent_hash: ZERO_HASH.to_string(),
            timestamp: genesis_time,
            sequence: 0,
            state_root: or_zero(&roots.state_root),
            transactions_root: or_zero(&roots.transactions_root),
            receipts_root: or_zero(&roots.receipts_root),
            events_root: or_zero(&roots.events_root),
            extra_data: extra_data.to_string(),
        };
        Block { header, hash: GENESIS_HASH.to_string() }
    }

    /// Build a child of `parent` stamped at `timestamp`.
    pub fn child(
        parent: Option<&Block>,
        timestamp: i64,
        genesis_time: i64,
        roots: &Roots,
        extra_data: &str,
    ) -> Result<Self> {
        let parent =
            parent.ok_or_else(|| ChainError::InvalidParent("parent block is absent".to_string()))?;
        if timestamp < parent.header.timestamp {
            return Err(ChainError::NonMonotonicTimestamp {
                timestamp,
                parent: parent.header.timestamp,
            });
        }

        let header = BlockHeader {
            parent_hash: parent.hash.clone(),
            timestamp,
            sequence: sequence_for(timestamp, genesis_time),
            state_root: or_zero(&roots.state_root),
            transactions_root: or_zero(&roots.transactions_root),
            receipts_root: or_zero(&roots.receipts_root),
            events_root: or_zero(&roots.events_root),
            extra_data: extra_data.to_string(),
        };
        let hash = header.hash();
        Ok(Block { header, hash })
    }

    pub fn sequence(&self) -> u64 {
        self.header.sequence
    }

    pub fn is_genesis(&self) -> bool {
        self.hash == GENESIS_HASH
    }
}
