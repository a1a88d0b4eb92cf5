// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blocks, their canonical hash encoding, and chain verification.
//!
//! ## Hash Input
//!
//! ```text
//! domain | app salt | sequence_id (u64 BE) | loan_id | description
//!        | previous_hash | bank_identifier | metadata? | created_at (µs, i64 BE)
//! ```
//!
//! Strings and byte fields are `u32 BE length ‖ bytes`. Metadata is a single
//! `0x00` when absent, or `0x01 ‖ ciphertext ‖ nonce` (both length-prefixed).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::crypto;

/// `previous_hash` of every genesis block.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

const HASH_DOMAIN: &[u8] = b"loan-ledger/block/v1";

/// Envelope-encrypted application payload carried by the genesis block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BlockMetadata {
    /// AES-256-GCM ciphertext with tag, base64.
    #[serde(with = "crate::serde_b64")]
    #[schema(value_type = String)]
    pub ciphertext: Vec<u8>,
    /// 96-bit nonce, base64.
    #[serde(with = "crate::serde_b64")]
    #[schema(value_type = String)]
    pub nonce: Vec<u8>,
}

/// An immutable, hash-linked record of one loan lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub sequence_id: u64,
    pub loan_id: String,
    pub transaction_description: String,
    pub previous_hash: String,
    pub current_hash: String,
    pub bank_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BlockMetadata>,
    pub created_at: DateTime<Utc>,
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.sequence_id == 0
    }
}

/// Current time truncated to microseconds, the precision the hash covers.
pub fn block_timestamp() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Computes block hashes under an application-wide salt.
#[derive(Debug, Clone)]
pub struct BlockHasher {
    salt: String,
}

impl BlockHasher {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Canonical, order-fixed encoding of every field except `current_hash`.
    pub fn encode(&self, block: &Block) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        put_bytes(&mut buf, HASH_DOMAIN);
        put_bytes(&mut buf, self.salt.as_bytes());
        buf.extend_from_slice(&block.sequence_id.to_be_bytes());
        put_bytes(&mut buf, block.loan_id.as_bytes());
        put_bytes(&mut buf, block.transaction_description.as_bytes());
        put_bytes(&mut buf, block.previous_hash.as_bytes());
        put_bytes(&mut buf, block.bank_identifier.as_bytes());
        match &block.metadata {
            Some(meta) => {
                buf.push(1);
                put_bytes(&mut buf, &meta.ciphertext);
                put_bytes(&mut buf, &meta.nonce);
            }
            None => buf.push(0),
        }
        buf.extend_from_slice(&block.created_at.timestamp_micros().to_be_bytes());
        buf
    }

    pub fn hash(&self, block: &Block) -> String {
        crypto::hash_hex(&self.encode(block))
    }

    /// Fill in `current_hash`.
    pub fn seal(&self, mut block: Block) -> Block {
        block.current_hash = self.hash(&block);
        block
    }

    pub fn is_intact(&self, block: &Block) -> bool {
        self.hash(block) == block.current_hash
    }
}

/// Result of walking a loan's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at_sequence_id: Option<u64>,
    pub length: usize,
}

/// Walk `blocks` in order and report the first index whose link, position,
/// or recomputed hash does not hold.
pub fn verify_blocks(hasher: &BlockHasher, loan_id: &str, blocks: &[Block]) -> ChainVerification {
    let broken = blocks.iter().enumerate().find_map(|(i, block)| {
        let position_ok = block.sequence_id == i as u64 && block.loan_id == loan_id;
        let link_ok = if i == 0 {
            block.previous_hash == GENESIS_PREVIOUS_HASH && block.metadata.is_some()
        } else {
            block.previous_hash == blocks[i - 1].current_hash && block.metadata.is_none()
        };
        if position_ok && link_ok && hasher.is_intact(block) {
            None
        } else {
            Some(i as u64)
        }
    });

    ChainVerification {
        valid: broken.is_none(),
        broken_at_sequence_id: broken,
        length: blocks.len(),
    }
}
