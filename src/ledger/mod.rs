// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Engine
//!
//! One append-only hash chain per loan. The engine owns hashing and
//! integrity checks; the [`LedgerStore`] owns atomicity.
//!
//! ## Append Protocol
//!
//! 1. [`Ledger::head`] reads the loan record and chain tail in one snapshot,
//!    refuses quarantined loans, and re-hashes the tail.
//! 2. The caller validates its state change against that snapshot.
//! 3. [`Ledger::append_block`] writes `tail.sequence_id + 1`. The store
//!    rejects the write with `ConcurrentModification` if the tail moved in
//!    the meantime, so at most one block exists per `(loan_id, sequence_id)`.
//!    It also re-checks quarantine inside that write, so a loan quarantined
//!    after step 1 still gets no new block.
//!
//! Block timestamps strictly increase along a chain, even if the wall clock
//! steps backwards between appends.

pub mod block;
pub mod error;

use std::sync::Arc;

use chrono::TimeDelta;
use tracing::{debug, error, info};

pub use block::{
    block_timestamp, verify_blocks, Block, BlockHasher, BlockMetadata, ChainVerification,
    GENESIS_PREVIOUS_HASH,
};
pub use error::{LedgerError, LedgerResult};

use crate::envelope::EnvelopeKeySet;
use crate::loan::{LoanRecord, Status};
use crate::storage::{LedgerStore, LoanHead, Quarantine};

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    hasher: BlockHasher,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, hasher: BlockHasher) -> Self {
        Self { store, hasher }
    }

    /// Write the genesis block together with the loan record and its key set.
    ///
    /// All three land in a single store transaction or not at all.
    pub fn append_genesis(
        &self,
        loan: &LoanRecord,
        key_set: &EnvelopeKeySet,
        metadata: BlockMetadata,
    ) -> LedgerResult<Block> {
        let genesis = self.hasher.seal(Block {
            sequence_id: 0,
            loan_id: loan.loan_id.clone(),
            transaction_description: Status::Initiated.transaction_description(),
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            current_hash: String::new(),
            bank_identifier: loan.bank_id.clone(),
            metadata: Some(metadata),
            created_at: loan.created_at,
        });

        self.store.insert_loan(loan, key_set, &genesis)?;
        info!(loan_id = %loan.loan_id, hash = %genesis.current_hash, "Genesis block appended");
        Ok(genesis)
    }

    /// Snapshot of a loan's record and chain tail, checked for integrity.
    pub fn head(&self, loan_id: &str) -> LedgerResult<LoanHead> {
        if let Some(q) = self.store.quarantine(loan_id)? {
            return Err(LedgerError::ChainCorrupted {
                loan_id: loan_id.to_string(),
                broken_at_sequence_id: q.broken_at_sequence_id,
            });
        }

        let head = self
            .store
            .head(loan_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("loan {loan_id}")))?;

        if !self.hasher.is_intact(&head.tail) {
            let broken_at = head.tail.sequence_id;
            self.quarantine(loan_id, broken_at, "tail block hash mismatch")?;
            return Err(LedgerError::ChainCorrupted {
                loan_id: loan_id.to_string(),
                broken_at_sequence_id: broken_at,
            });
        }

        Ok(head)
    }

    /// Append the block that follows `head.tail`, moving the loan to `new_status`.
    pub fn append_block(
        &self,
        head: &LoanHead,
        description: String,
        new_status: Status,
    ) -> LedgerResult<Block> {
        let tail = &head.tail;
        let block = self.hasher.seal(Block {
            sequence_id: tail.sequence_id + 1,
            loan_id: tail.loan_id.clone(),
            transaction_description: description,
            previous_hash: tail.current_hash.clone(),
            current_hash: String::new(),
            bank_identifier: tail.bank_identifier.clone(),
            metadata: None,
            created_at: block_timestamp().max(tail.created_at + TimeDelta::microseconds(1)),
        });

        self.store.append_block(&block, new_status)?;
        debug!(
            loan_id = %block.loan_id,
            sequence_id = block.sequence_id,
            status = %new_status,
            "Block appended"
        );
        Ok(block)
    }

    pub fn get_chain(&self, loan_id: &str) -> LedgerResult<Vec<Block>> {
        let blocks = self.store.chain(loan_id)?;
        if blocks.is_empty() {
            return Err(LedgerError::NotFound(format!("loan {loan_id}")));
        }
        Ok(blocks)
    }

    pub fn get_latest(&self, loan_id: &str) -> LedgerResult<Block> {
        self.store
            .head(loan_id)?
            .map(|head| head.tail)
            .ok_or_else(|| LedgerError::NotFound(format!("loan {loan_id}")))
    }

    pub fn get_block(&self, loan_id: &str, sequence_id: u64) -> LedgerResult<Block> {
        self.store
            .block(loan_id, sequence_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("block {loan_id}/{sequence_id}")))
    }

    /// The genesis block, re-hashed before it is handed out. A mismatch
    /// quarantines the loan.
    pub fn get_genesis(&self, loan_id: &str) -> LedgerResult<Block> {
        let genesis = self.get_block(loan_id, 0)?;
        if genesis.previous_hash != GENESIS_PREVIOUS_HASH || !self.hasher.is_intact(&genesis) {
            self.quarantine(loan_id, 0, "genesis block hash mismatch")?;
            return Err(LedgerError::ChainCorrupted {
                loan_id: loan_id.to_string(),
                broken_at_sequence_id: 0,
            });
        }
        Ok(genesis)
    }

    /// Every block of every loan, by creation time then loan then sequence.
    pub fn get_full_chain(&self) -> LedgerResult<Vec<Block>> {
        let mut blocks = self.store.all_blocks()?;
        blocks.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.loan_id.cmp(&b.loan_id))
                .then_with(|| a.sequence_id.cmp(&b.sequence_id))
        });
        Ok(blocks)
    }

    /// Walk the whole chain. A broken chain is quarantined and reported, never repaired.
    pub fn verify_chain(&self, loan_id: &str) -> LedgerResult<ChainVerification> {
        let blocks = self.get_chain(loan_id)?;
        let result = verify_blocks(&self.hasher, loan_id, &blocks);

        if let Some(broken_at) = result.broken_at_sequence_id {
            self.quarantine(loan_id, broken_at, "chain verification failed")?;
        }
        Ok(result)
    }

    /// Lift a quarantine. Only allowed once the chain verifies again.
    pub fn clear_quarantine(&self, loan_id: &str) -> LedgerResult<()> {
        let blocks = self.get_chain(loan_id)?;
        let result = verify_blocks(&self.hasher, loan_id, &blocks);
        if let Some(broken_at) = result.broken_at_sequence_id {
            return Err(LedgerError::ChainCorrupted {
                loan_id: loan_id.to_string(),
                broken_at_sequence_id: broken_at,
            });
        }
        self.store.clear_quarantine(loan_id)?;
        info!(loan_id = %loan_id, "Quarantine cleared");
        Ok(())
    }

    pub fn quarantine_of(&self, loan_id: &str) -> LedgerResult<Option<Quarantine>> {
        Ok(self.store.quarantine(loan_id)?)
    }

    fn quarantine(&self, loan_id: &str, broken_at: u64, reason: &str) -> LedgerResult<()> {
        error!(
            loan_id = %loan_id,
            broken_at_sequence_id = broken_at,
            reason,
            "Chain corrupted, loan quarantined"
        );
        self.store.set_quarantine(&Quarantine {
            loan_id: loan_id.to_string(),
            broken_at_sequence_id: broken_at,
            reason: reason.to_string(),
            detected_at: chrono::Utc::now(),
        })?;
        Ok(())
    }
}
