// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Storage
//!
//! Persistence behind the [`LedgerStore`] trait. Two implementations:
//!
//! | Store | Use |
//! |-------|-----|
//! | [`MemoryStore`] | Tests and `DATA_DIR`-less development runs |
//! | [`RedbStore`] | Embedded ACID database on disk |
//!
//! ## Guarantees
//!
//! - [`LedgerStore::insert_loan`] writes the loan record, its key set and the
//!   genesis block together or not at all.
//! - [`LedgerStore::append_block`] is a conditional write: it only succeeds
//!   when `block.sequence_id` is exactly one past the stored tail, and it
//!   updates the loan's status in the same write. Everything else is
//!   rejected with [`StoreError::ConcurrentModification`]. A quarantined
//!   loan is checked inside the same write and rejected with
//!   [`StoreError::Quarantined`].
//! - Blocks are never updated or deleted.

pub mod audit;
pub mod memory;
pub mod redb_store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use audit::{AuditEvent, AuditEventType};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::envelope::EnvelopeKeySet;
use crate::identity::Account;
use crate::ledger::Block;
use crate::loan::{ActorRole, LoanRecord, Status};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("concurrent modification of loan {loan_id}: expected next sequence {expected}, found {actual}")]
    ConcurrentModification {
        loan_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("loan {loan_id} is quarantined at sequence {broken_at_sequence_id}")]
    Quarantined {
        loan_id: String,
        broken_at_sequence_id: u64,
    },

    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Loan record and chain tail read in one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanHead {
    pub loan: LoanRecord,
    pub tail: Block,
}

/// A loan whose chain failed verification. Writes are refused while set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Quarantine {
    pub loan_id: String,
    pub broken_at_sequence_id: u64,
    pub reason: String,
    pub detected_at: DateTime<Utc>,
}

pub trait LedgerStore: Send + Sync {
    /// Create a loan with its key set and genesis block.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the loan id is taken.
    fn insert_loan(
        &self,
        loan: &LoanRecord,
        key_set: &EnvelopeKeySet,
        genesis: &Block,
    ) -> StoreResult<()>;

    /// Append `block` and set the loan's status, if `block` directly follows
    /// the tail and the loan is not quarantined.
    fn append_block(&self, block: &Block, status: Status) -> StoreResult<()>;

    fn loan(&self, loan_id: &str) -> StoreResult<Option<LoanRecord>>;

    fn head(&self, loan_id: &str) -> StoreResult<Option<LoanHead>>;

    /// All loans, oldest first.
    fn list_loans(&self) -> StoreResult<Vec<LoanRecord>>;

    /// A loan's blocks in sequence order. Empty if the loan does not exist.
    fn chain(&self, loan_id: &str) -> StoreResult<Vec<Block>>;

    fn block(&self, loan_id: &str, sequence_id: u64) -> StoreResult<Option<Block>>;

    /// Every block in the store, in no particular order.
    fn all_blocks(&self) -> StoreResult<Vec<Block>>;

    fn key_set(&self, loan_id: &str) -> StoreResult<Option<EnvelopeKeySet>>;

    fn set_quarantine(&self, quarantine: &Quarantine) -> StoreResult<()>;

    fn quarantine(&self, loan_id: &str) -> StoreResult<Option<Quarantine>>;

    fn clear_quarantine(&self, loan_id: &str) -> StoreResult<()>;

    /// Fails with [`StoreError::AlreadyExists`] if `(role, id)` is taken.
    fn insert_account(&self, account: &Account) -> StoreResult<()>;

    fn account(&self, role: ActorRole, id: &str) -> StoreResult<Option<Account>>;

    /// Accounts of one role, ordered by id.
    fn list_accounts(&self, role: ActorRole) -> StoreResult<Vec<Account>>;

    fn record_audit(&self, event: &AuditEvent) -> StoreResult<()>;

    /// Audit events recorded against `resource_id`, oldest first.
    fn audit_events(&self, resource_id: &str) -> StoreResult<Vec<AuditEvent>>;

    /// Cheap read used by the readiness probe.
    fn health_check(&self) -> StoreResult<()>;
}

/// Shared tail check for both stores.
fn check_next_sequence(loan_id: &str, tail: Option<&Block>, block: &Block) -> StoreResult<()> {
    let tail = tail.ok_or_else(|| StoreError::NotFound(format!("loan {loan_id}")))?;
    let next = tail.sequence_id + 1;
    if block.sequence_id != next || block.previous_hash != tail.current_hash {
        return Err(StoreError::ConcurrentModification {
            loan_id: loan_id.to_string(),
            expected: block.sequence_id,
            actual: next,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by the store test suites.

    use super::*;
    use crate::envelope::WrappedKey;
    use crate::ledger::{block_timestamp, BlockHasher, BlockMetadata, GENESIS_PREVIOUS_HASH};

    pub fn hasher() -> BlockHasher {
        BlockHasher::new("store-tests")
    }

    pub fn loan(loan_id: &str) -> LoanRecord {
        let now = block_timestamp();
        LoanRecord {
            loan_id: loan_id.to_string(),
            applicant_id: "alice".to_string(),
            bank_id: "BANK01".to_string(),
            status: Status::Initiated,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key_set(loan_id: &str) -> EnvelopeKeySet {
        let wrapped = WrappedKey {
            ciphertext: vec![7; 48],
            nonce: vec![1; 12],
            salt: vec![2; 16],
        };
        EnvelopeKeySet {
            loan_id: loan_id.to_string(),
            user_wrapped_key: wrapped.clone(),
            bank_wrapped_key: wrapped,
            kdf_iterations: 1_000,
            created_at: Utc::now(),
        }
    }

    pub fn genesis(loan: &LoanRecord) -> Block {
        hasher().seal(Block {
            sequence_id: 0,
            loan_id: loan.loan_id.clone(),
            transaction_description: Status::Initiated.transaction_description(),
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            current_hash: String::new(),
            bank_identifier: loan.bank_id.clone(),
            metadata: Some(BlockMetadata {
                ciphertext: vec![9; 20],
                nonce: vec![0; 12],
            }),
            created_at: loan.created_at,
        })
    }

    pub fn next(prev: &Block, status: Status) -> Block {
        hasher().seal(Block {
            sequence_id: prev.sequence_id + 1,
            loan_id: prev.loan_id.clone(),
            transaction_description: status.transaction_description(),
            previous_hash: prev.current_hash.clone(),
            current_hash: String::new(),
            bank_identifier: prev.bank_identifier.clone(),
            metadata: None,
            created_at: block_timestamp(),
        })
    }

    pub fn account(role: ActorRole, id: &str) -> Account {
        Account {
            role,
            id: id.to_string(),
            display_name: format!("{id} display"),
            password_salt: vec![3; 16],
            password_verifier: vec![4; 32],
            kdf_iterations: 1_000,
            created_at: Utc::now(),
        }
    }

    /// Behaviour every [`LedgerStore`] must share.
    pub fn exercise_store(store: &dyn LedgerStore) {
        let l1 = loan("L1");
        let g1 = genesis(&l1);
        store.insert_loan(&l1, &key_set("L1"), &g1).unwrap();

        // duplicate ids are rejected and leave the original intact
        let again = store.insert_loan(&l1, &key_set("L1"), &g1);
        assert!(matches!(again, Err(StoreError::AlreadyExists(_))));
        assert_eq!(store.chain("L1").unwrap().len(), 1);

        let b1 = next(&g1, Status::Accepted);
        store.append_block(&b1, Status::Accepted).unwrap();

        // a second writer holding the old tail loses
        let stale = next(&g1, Status::Closed);
        let result = store.append_block(&stale, Status::Closed);
        assert!(matches!(
            result,
            Err(StoreError::ConcurrentModification {
                expected: 1,
                actual: 2,
                ..
            })
        ));

        let head = store.head("L1").unwrap().unwrap();
        assert_eq!(head.tail, b1);
        assert_eq!(head.loan.status, Status::Accepted);
        assert_eq!(head.loan.updated_at, b1.created_at);

        assert_eq!(store.chain("L1").unwrap(), vec![g1.clone(), b1.clone()]);
        assert_eq!(store.block("L1", 1).unwrap(), Some(b1.clone()));
        assert_eq!(store.block("L1", 5).unwrap(), None);
        assert_eq!(store.key_set("L1").unwrap(), Some(key_set("L1")));
        assert!(store.chain("missing").unwrap().is_empty());
        assert!(store.head("missing").unwrap().is_none());

        let orphan = next(&genesis(&loan("missing")), Status::Accepted);
        assert!(matches!(
            store.append_block(&orphan, Status::Accepted),
            Err(StoreError::NotFound(_))
        ));

        // a loan whose id is a prefix of another does not see its blocks
        let l10 = loan("L10");
        store.insert_loan(&l10, &key_set("L10"), &genesis(&l10)).unwrap();
        assert_eq!(store.chain("L1").unwrap().len(), 2);
        assert_eq!(store.all_blocks().unwrap().len(), 3);
        assert_eq!(store.list_loans().unwrap().len(), 2);

        let q = Quarantine {
            loan_id: "L1".to_string(),
            broken_at_sequence_id: 1,
            reason: "test".to_string(),
            detected_at: Utc::now(),
        };
        store.set_quarantine(&q).unwrap();
        assert_eq!(store.quarantine("L1").unwrap(), Some(q));

        // the append re-checks quarantine under its own write
        let b2 = next(&b1, Status::Paid);
        assert!(matches!(
            store.append_block(&b2, Status::Paid),
            Err(StoreError::Quarantined {
                broken_at_sequence_id: 1,
                ..
            })
        ));
        assert_eq!(store.chain("L1").unwrap().len(), 2);
        assert_eq!(store.loan("L1").unwrap().unwrap().status, Status::Accepted);

        store.clear_quarantine("L1").unwrap();
        assert_eq!(store.quarantine("L1").unwrap(), None);
        store.append_block(&b2, Status::Paid).unwrap();
        assert_eq!(store.chain("L1").unwrap().len(), 3);

        store.insert_account(&account(ActorRole::Bank, "BANK02")).unwrap();
        store.insert_account(&account(ActorRole::Bank, "BANK01")).unwrap();
        store.insert_account(&account(ActorRole::User, "BANK01")).unwrap();
        assert!(matches!(
            store.insert_account(&account(ActorRole::Bank, "BANK01")),
            Err(StoreError::AlreadyExists(_))
        ));
        let banks: Vec<String> = store
            .list_accounts(ActorRole::Bank)
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(banks, vec!["BANK01", "BANK02"]);
        assert!(store.account(ActorRole::User, "BANK01").unwrap().is_some());
        assert!(store.account(ActorRole::User, "nobody").unwrap().is_none());

        let first = AuditEvent::new(AuditEventType::LoanInitiated).with_resource("loan", "L1");
        let second = AuditEvent::new(AuditEventType::StatusChanged).with_resource("loan", "L1");
        store.record_audit(&first).unwrap();
        store.record_audit(&second).unwrap();
        store
            .record_audit(&AuditEvent::new(AuditEventType::LoanInitiated).with_resource("loan", "L10"))
            .unwrap();
        let events = store.audit_events("L1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, first.event_id);

        store.health_check().unwrap();
    }
}
