//! Wire messages exchanged between peers.
//!
//! Each message is one JSON object on its own line:
//!
//! ```text
//! {"type":"ANNOUNCE","hash":"0x…","sequence":12}
//! {"type":"GETBLOCK","wantHash":"0x…"}
//! {"type":"BLOCK","block":{"header":{…},"hash":"0x…"}}
//! ```
//!
//! `sequence` is also accepted as `vtcunix` and defaults to 0 when absent.

use crate::blockchain::{Block, BlockHash};
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "ANNOUNCE")]
    Announce,
    #[serde(rename = "GETBLOCK")]
    GetBlock,
    #[serde(rename = "BLOCK")]
    Block,
}

/// Flat record as it appears on the wire; every payload field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRecord {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<BlockHash>,
    #[serde(default, alias = "vtcunix", skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub want_hash: Option<BlockHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// "My head is `hash` at `sequence`."
    Announce { hash: BlockHash, sequence: u64 },
    /// "Send me the block `want_hash`."
    GetBlock { want_hash: BlockHash },
    Block(Box<Block>),
}

impl Message {
    pub fn announce(block: &Block) -> Self {
        Message::Announce {
            hash: block.hash.clone(),
            sequence: block.header.sequence,
        }
    }

    pub fn kind(&self) -> MessageType {
        match self {
            Message::Announce { .. } => MessageType::Announce,
            Message::GetBlock { .. } => MessageType::GetBlock,
            Message::Block(_) => MessageType::Block,
        }
    }

    /// Encode as a single line, without the terminating newline.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&WireRecord::from(self))?)
    }

    pub fn decode(line: &str) -> Result<Self> {
        Self::decode_bytes(line.as_bytes())
    }

    /// Decode one raw record. Bytes that are not UTF-8 are malformed, not a
    /// framing error.
    pub fn decode_bytes(record: &[u8]) -> Result<Self> {
        let record: WireRecord = serde_json::from_slice(record)
            .map_err(|e| ChainError::MalformedMessage(e.to_string()))?;
        Message::try_from(record)
    }
}

impl From<&Message> for WireRecord {
    fn from(msg: &Message) -> Self {
        let mut record = WireRecord {
            kind: msg.kind(),
            hash: None,
            sequence: None,
            want_hash: None,
            block: None,
        };
        match msg {
            Message::Announce { hash, sequence } => {
                record.hash = Some(hash.clone());
                record.sequence = Some(*sequence);
            }
            Message::GetBlock { want_hash } => record.want_hash = Some(want_hash.clone()),
            Message::Block(block) => record.block = Some(block.as_ref().clone()),
        }
        record
    }
}

impl TryFrom<WireRecord> for Message {
    type Error = ChainError;

    fn try_from(record: WireRecord) -> Result<Self> {
        match record.kind {
            MessageType::Announce => {
                let hash = record
                    .hash
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| ChainError::MalformedMessage("ANNOUNCE without hash".to_string()))?;
                Ok(Message::Announce {
                    hash,
                    sequence: record.sequence.unwrap_or(0),
                })
            }
            MessageType::GetBlock => {
                let want_hash = record.want_hash.filter(|h| !h.is_empty()).ok_or_else(|| {
                    ChainError::MalformedMessage("GETBLOCK without wantHash".to_string())
                })?;
                Ok(Message::GetBlock { want_hash })
            }
            MessageType::Block => {
                let block = record
                    .block
                    .ok_or_else(|| ChainError::MalformedMessage("BLOCK without block".to_string()))?;
                Ok(Message::Block(Box::new(block)))
            }
        }
    }
}
