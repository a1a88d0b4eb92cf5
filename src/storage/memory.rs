// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process [`LedgerStore`]. State is lost on restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    check_next_sequence, AuditEvent, LedgerStore, LoanHead, Quarantine, StoreError, StoreResult,
};
use crate::envelope::EnvelopeKeySet;
use crate::identity::Account;
use crate::ledger::Block;
use crate::loan::{ActorRole, LoanRecord, Status};

struct LoanEntry {
    record: LoanRecord,
    key_set: EnvelopeKeySet,
    blocks: Vec<Block>,
}

#[derive(Default)]
struct Inner {
    loans: HashMap<String, LoanEntry>,
    quarantines: HashMap<String, Quarantine>,
    accounts: BTreeMap<(ActorRole, String), Account>,
    audit: Vec<AuditEvent>,
}

/// A single lock guards all state, so every write is serialized and the
/// append check and the write happen under one guard.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }

    /// Rewrite a stored block in place without re-hashing it.
    #[cfg(test)]
    pub fn tamper_block(&self, loan_id: &str, sequence_id: u64, edit: impl FnOnce(&mut Block)) {
        let mut inner = self.inner.write().unwrap();
        let entry = inner.loans.get_mut(loan_id).unwrap();
        edit(&mut entry.blocks[sequence_id as usize]);
    }
}

impl LedgerStore for MemoryStore {
    fn insert_loan(
        &self,
        loan: &LoanRecord,
        key_set: &EnvelopeKeySet,
        genesis: &Block,
    ) -> StoreResult<()> {
        let mut inner = self.write()?;
        if inner.loans.contains_key(&loan.loan_id) {
            return Err(StoreError::AlreadyExists(format!("loan {}", loan.loan_id)));
        }
        inner.loans.insert(
            loan.loan_id.clone(),
            LoanEntry {
                record: loan.clone(),
                key_set: key_set.clone(),
                blocks: vec![genesis.clone()],
            },
        );
        Ok(())
    }

    fn append_block(&self, block: &Block, status: Status) -> StoreResult<()> {
        let mut inner = self.write()?;
        if let Some(q) = inner.quarantines.get(&block.loan_id) {
            return Err(StoreError::Quarantined {
                loan_id: q.loan_id.clone(),
                broken_at_sequence_id: q.broken_at_sequence_id,
            });
        }
        let entry = inner
            .loans
            .get_mut(&block.loan_id)
            .ok_or_else(|| StoreError::NotFound(format!("loan {}", block.loan_id)))?;

        check_next_sequence(&block.loan_id, entry.blocks.last(), block)?;

        entry.blocks.push(block.clone());
        entry.record.status = status;
        entry.record.updated_at = block.created_at;
        Ok(())
    }

    fn loan(&self, loan_id: &str) -> StoreResult<Option<LoanRecord>> {
        Ok(self.read()?.loans.get(loan_id).map(|e| e.record.clone()))
    }

    fn head(&self, loan_id: &str) -> StoreResult<Option<LoanHead>> {
        let inner = self.read()?;
        Ok(inner.loans.get(loan_id).and_then(|e| {
            e.blocks.last().map(|tail| LoanHead {
                loan: e.record.clone(),
                tail: tail.clone(),
            })
        }))
    }

    fn list_loans(&self) -> StoreResult<Vec<LoanRecord>> {
        let mut loans: Vec<LoanRecord> = self
            .read()?
            .loans
            .values()
            .map(|e| e.record.clone())
            .collect();
        loans.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.loan_id.cmp(&b.loan_id))
        });
        Ok(loans)
    }

    fn chain(&self, loan_id: &str) -> StoreResult<Vec<Block>> {
        Ok(self
            .read()?
            .loans
            .get(loan_id)
            .map(|e| e.blocks.clone())
            .unwrap_or_default())
    }

    fn block(&self, loan_id: &str, sequence_id: u64) -> StoreResult<Option<Block>> {
        Ok(self
            .read()?
            .loans
            .get(loan_id)
            .and_then(|e| e.blocks.get(sequence_id as usize).cloned()))
    }

    fn all_blocks(&self) -> StoreResult<Vec<Block>> {
        Ok(self
            .read()?
            .loans
            .values()
            .flat_map(|e| e.blocks.iter().cloned())
            .collect())
    }

    fn key_set(&self, loan_id: &str) -> StoreResult<Option<EnvelopeKeySet>> {
        Ok(self.read()?.loans.get(loan_id).map(|e| e.key_set.clone()))
    }

    fn set_quarantine(&self, quarantine: &Quarantine) -> StoreResult<()> {
        self.write()?
            .quarantines
            .insert(quarantine.loan_id.clone(), quarantine.clone());
        Ok(())
    }

    fn quarantine(&self, loan_id: &str) -> StoreResult<Option<Quarantine>> {
        Ok(self.read()?.quarantines.get(loan_id).cloned())
    }

    fn clear_quarantine(&self, loan_id: &str) -> StoreResult<()> {
        self.write()?.quarantines.remove(loan_id);
        Ok(())
    }

    fn insert_account(&self, account: &Account) -> StoreResult<()> {
        let mut inner = self.write()?;
        let key = (account.role, account.id.clone());
        if inner.accounts.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!(
                "{} {}",
                account.role, account.id
            )));
        }
        inner.accounts.insert(key, account.clone());
        Ok(())
    }

    fn account(&self, role: ActorRole, id: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .read()?
            .accounts
            .get(&(role, id.to_string()))
            .cloned())
    }

    fn list_accounts(&self, role: ActorRole) -> StoreResult<Vec<Account>> {
        Ok(self
            .read()?
            .accounts
            .values()
            .filter(|a| a.role == role)
            .cloned()
            .collect())
    }

    fn record_audit(&self, event: &AuditEvent) -> StoreResult<()> {
        self.write()?.audit.push(event.clone());
        Ok(())
    }

    fn audit_events(&self, resource_id: &str) -> StoreResult<Vec<AuditEvent>> {
        Ok(self
            .read()?
            .audit
            .iter()
            .filter(|e| e.resource_id.as_deref() == Some(resource_id))
            .cloned()
            .collect())
    }

    fn health_check(&self) -> StoreResult<()> {
        self.read().map(|_| ())
    }
}
