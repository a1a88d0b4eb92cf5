// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `loans`: loan_id → serialized LoanRecord
//! - `blocks`: `loan_id/sequence_id` (zero-padded) → serialized Block
//! - `key_sets`: loan_id → serialized EnvelopeKeySet
//! - `quarantine`: loan_id → serialized Quarantine
//! - `accounts`: `role/id` → serialized Account
//! - `audit_events`: `resource_id/counter` (zero-padded) → serialized AuditEvent
//! - `meta`: name → u64 counter
//!
//! redb runs one write transaction at a time, so the tail check in
//! [`LedgerStore::append_block`] and the insert that follows it cannot interleave
//! with another append.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;

use super::{
    check_next_sequence, AuditEvent, LedgerStore, LoanHead, Quarantine, StoreError, StoreResult,
};
use crate::envelope::EnvelopeKeySet;
use crate::identity::Account;
use crate::ledger::Block;
use crate::loan::{ActorRole, LoanRecord, Status};

// =============================================================================
// Table Definitions
// =============================================================================

/// Every table except `meta` maps a string key to JSON bytes.
type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

const LOANS: JsonTable = TableDefinition::new("loans");

/// Key format: `loan_id/{sequence_id:020}` so a forward scan is sequence order.
const BLOCKS: JsonTable = TableDefinition::new("blocks");

const KEY_SETS: JsonTable = TableDefinition::new("key_sets");

const QUARANTINE: JsonTable = TableDefinition::new("quarantine");

/// Key format: `role/id`.
const ACCOUNTS: JsonTable = TableDefinition::new("accounts");

/// Key format: `resource_id/{counter:020}` for insertion-ordered scans per resource.
const AUDIT_EVENTS: JsonTable = TableDefinition::new("audit_events");

const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const AUDIT_COUNTER: &str = "audit_counter";

// =============================================================================
// Key Helpers
// =============================================================================

fn block_key(loan_id: &str, sequence_id: u64) -> String {
    format!("{loan_id}/{sequence_id:020}")
}

/// `[start, end)` bounds covering every key under `prefix/`.
///
/// Identifiers are restricted to `[A-Za-z0-9_-]`, and `'0'` sorts directly
/// after `'/'`, so `prefix0` is the first key past the range.
fn prefix_range(prefix: &str) -> (String, String) {
    (format!("{prefix}/"), format!("{prefix}0"))
}

fn account_key(role: ActorRole, id: &str) -> String {
    format!("{}/{id}", role.as_str())
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

// =============================================================================
// RedbStore
// =============================================================================

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(LOANS)?;
            let _ = write_txn.open_table(BLOCKS)?;
            let _ = write_txn.open_table(KEY_SETS)?;
            let _ = write_txn.open_table(QUARANTINE)?;
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(AUDIT_EVENTS)?;
            let _ = write_txn.open_table(META)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    fn get_json<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> StoreResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        match table.get(key)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn scan_prefix<T: DeserializeOwned>(&self, table: JsonTable, prefix: &str) -> StoreResult<Vec<T>> {
        let (start, end) = prefix_range(prefix);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;

        let mut out = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            let (_, value) = entry?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    fn scan_all<T: DeserializeOwned>(&self, table: JsonTable) -> StoreResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;

        let mut out = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }
}

impl LedgerStore for RedbStore {
    fn insert_loan(
        &self,
        loan: &LoanRecord,
        key_set: &EnvelopeKeySet,
        genesis: &Block,
    ) -> StoreResult<()> {
        let loan_id = loan.loan_id.as_str();
        let loan_json = serde_json::to_vec(loan)?;
        let key_set_json = serde_json::to_vec(key_set)?;
        let block_json = serde_json::to_vec(genesis)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut loans = write_txn.open_table(LOANS)?;
            if loans.get(loan_id)?.is_some() {
                return Err(StoreError::AlreadyExists(format!("loan {loan_id}")));
            }
            loans.insert(loan_id, loan_json.as_slice())?;

            let mut key_sets = write_txn.open_table(KEY_SETS)?;
            key_sets.insert(loan_id, key_set_json.as_slice())?;

            let mut blocks = write_txn.open_table(BLOCKS)?;
            let key = block_key(loan_id, genesis.sequence_id);
            blocks.insert(key.as_str(), block_json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn append_block(&self, block: &Block, status: Status) -> StoreResult<()> {
        let loan_id = block.loan_id.as_str();
        let block_json = serde_json::to_vec(block)?;

        let write_txn = self.db.begin_write()?;
        {
            let quarantine = write_txn.open_table(QUARANTINE)?;
            if let Some(existing) = quarantine.get(loan_id)? {
                let q: Quarantine = decode(existing.value())?;
                return Err(StoreError::Quarantined {
                    loan_id: q.loan_id,
                    broken_at_sequence_id: q.broken_at_sequence_id,
                });
            }

            let mut loans = write_txn.open_table(LOANS)?;
            let mut loan: LoanRecord = {
                let existing = loans
                    .get(loan_id)?
                    .ok_or_else(|| StoreError::NotFound(format!("loan {loan_id}")))?;
                decode(existing.value())?
            };

            let mut blocks = write_txn.open_table(BLOCKS)?;
            let tail: Option<Block> = {
                let (start, end) = prefix_range(loan_id);
                let mut range = blocks.range(start.as_str()..end.as_str())?;
                match range.next_back() {
                    Some(entry) => Some(decode(entry?.1.value())?),
                    None => None,
                }
            };
            check_next_sequence(loan_id, tail.as_ref(), block)?;

            let key = block_key(loan_id, block.sequence_id);
            blocks.insert(key.as_str(), block_json.as_slice())?;

            loan.status = status;
            loan.updated_at = block.created_at;
            let loan_json = serde_json::to_vec(&loan)?;
            loans.insert(loan_id, loan_json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn loan(&self, loan_id: &str) -> StoreResult<Option<LoanRecord>> {
        self.get_json(LOANS, loan_id)
    }

    fn head(&self, loan_id: &str) -> StoreResult<Option<LoanHead>> {
        let read_txn = self.db.begin_read()?;
        let loans = read_txn.open_table(LOANS)?;
        let blocks = read_txn.open_table(BLOCKS)?;

        let loan: LoanRecord = match loans.get(loan_id)? {
            Some(value) => decode(value.value())?,
            None => return Ok(None),
        };

        let (start, end) = prefix_range(loan_id);
        let mut range = blocks.range(start.as_str()..end.as_str())?;
        match range.next_back() {
            Some(entry) => {
                let tail: Block = decode(entry?.1.value())?;
                Ok(Some(LoanHead { loan, tail }))
            }
            None => Ok(None),
        }
    }

    fn list_loans(&self) -> StoreResult<Vec<LoanRecord>> {
        let mut loans: Vec<LoanRecord> = self.scan_all(LOANS)?;
        loans.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.loan_id.cmp(&b.loan_id))
        });
        Ok(loans)
    }

    fn chain(&self, loan_id: &str) -> StoreResult<Vec<Block>> {
        self.scan_prefix(BLOCKS, loan_id)
    }

    fn block(&self, loan_id: &str, sequence_id: u64) -> StoreResult<Option<Block>> {
        self.get_json(BLOCKS, &block_key(loan_id, sequence_id))
    }

    fn all_blocks(&self) -> StoreResult<Vec<Block>> {
        self.scan_all(BLOCKS)
    }

    fn key_set(&self, loan_id: &str) -> StoreResult<Option<EnvelopeKeySet>> {
        self.get_json(KEY_SETS, loan_id)
    }

    fn set_quarantine(&self, quarantine: &Quarantine) -> StoreResult<()> {
        let json = serde_json::to_vec(quarantine)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(QUARANTINE)?;
            table.insert(quarantine.loan_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn quarantine(&self, loan_id: &str) -> StoreResult<Option<Quarantine>> {
        self.get_json(QUARANTINE, loan_id)
    }

    fn clear_quarantine(&self, loan_id: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(QUARANTINE)?;
            table.remove(loan_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn insert_account(&self, account: &Account) -> StoreResult<()> {
        let key = account_key(account.role, &account.id);
        let json = serde_json::to_vec(account)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ACCOUNTS)?;
            if table.get(key.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!(
                    "{} {}",
                    account.role, account.id
                )));
            }
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn account(&self, role: ActorRole, id: &str) -> StoreResult<Option<Account>> {
        self.get_json(ACCOUNTS, &account_key(role, id))
    }

    fn list_accounts(&self, role: ActorRole) -> StoreResult<Vec<Account>> {
        self.scan_prefix(ACCOUNTS, role.as_str())
    }

    fn record_audit(&self, event: &AuditEvent) -> StoreResult<()> {
        let json = serde_json::to_vec(event)?;
        let resource = event.resource_id.as_deref().unwrap_or("-");

        let write_txn = self.db.begin_write()?;
        {
            let mut meta = write_txn.open_table(META)?;
            let counter = meta.get(AUDIT_COUNTER)?.map(|v| v.value()).unwrap_or(0) + 1;
            meta.insert(AUDIT_COUNTER, counter)?;

            let mut table = write_txn.open_table(AUDIT_EVENTS)?;
            let key = format!("{resource}/{counter:020}");
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn audit_events(&self, resource_id: &str) -> StoreResult<Vec<AuditEvent>> {
        self.scan_prefix(AUDIT_EVENTS, resource_id)
    }

    fn health_check(&self) -> StoreResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(LOANS)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
