// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Loan Service
//!
//! The operations callers see: initiate, transition, close, read, verify
//! and decrypt. Every role-specific operation takes an authenticated
//! [`Actor`]; the service checks that the actor is a party to the loan
//! before anything else happens.
//!
//! All methods are synchronous and may run PBKDF2. Async callers should
//! invoke them from `spawn_blocking`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use zeroize::Zeroizing;

use crate::crypto::KdfParams;
use crate::envelope::{create_envelope, open_envelope, Envelope};
use crate::identity::IdentityRegistry;
use crate::ledger::{
    block_timestamp, Block, BlockHasher, ChainVerification, Ledger, LedgerError, LedgerResult,
};
use crate::loan::{
    check_close, check_transition, generate_loan_id, validate_identifier, Actor, ActorRole, LoanRecord, Status,
};
use crate::storage::{AuditEvent, AuditEventType, LedgerStore};

/// Input to [`LoanService::initiate_loan`]. The applicant is the calling actor.
pub struct InitiateLoan {
    /// Caller-chosen id, or `None` to generate one.
    pub loan_id: Option<String>,
    pub bank_id: String,
    /// Opaque application payload, encrypted before it touches storage.
    pub metadata: Vec<u8>,
    pub user_password: Zeroizing<String>,
    pub bank_password: Zeroizing<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanReceipt {
    pub loan_id: String,
    pub genesis_block_hash: String,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransitionReceipt {
    pub loan_id: String,
    pub new_status: Status,
    pub sequence_id: u64,
    pub block_hash: String,
}

/// One row of a bank's or applicant's loan list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanSummary {
    pub loan_id: String,
    pub applicant_id: String,
    pub bank_id: String,
    pub bank_name: Option<String>,
    pub latest_status: Status,
    pub latest_sequence_id: u64,
    pub latest_block_hash: String,
    pub initiated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct LoanService {
    store: Arc<dyn LedgerStore>,
    ledger: Ledger,
    identity: IdentityRegistry,
    kdf: KdfParams,
}

impl LoanService {
    pub fn new(store: Arc<dyn LedgerStore>, hash_salt: &str, kdf: KdfParams) -> Self {
        Self {
            ledger: Ledger::new(store.clone(), BlockHasher::new(hash_salt)),
            identity: IdentityRegistry::new(store.clone(), kdf),
            store,
            kdf,
        }
    }

    pub fn identity(&self) -> &IdentityRegistry {
        &self.identity
    }

    pub fn health_check(&self) -> LedgerResult<()> {
        Ok(self.store.health_check()?)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Encrypt the metadata for both parties and write the genesis block.
    ///
    /// Nothing is stored unless envelope creation succeeds.
    pub fn initiate_loan(&self, actor: &Actor, request: InitiateLoan) -> LedgerResult<LoanReceipt> {
        if actor.role != ActorRole::User {
            return Err(LedgerError::Forbidden(
                "only applicants can initiate loans".into(),
            ));
        }
        self.identity.require(ActorRole::User, &actor.id)?;
        self.identity.require(ActorRole::Bank, &request.bank_id)?;

        let loan_id = match request.loan_id {
            Some(id) => {
                validate_identifier("loan id", &id)?;
                id
            }
            None => generate_loan_id(),
        };
        if request.user_password.is_empty() || request.bank_password.is_empty() {
            return Err(LedgerError::InvalidInput(
                "user and bank passwords must not be empty".into(),
            ));
        }
        // Early exit before the expensive part; the store re-checks atomically.
        if self.store.loan(&loan_id)?.is_some() {
            return Err(LedgerError::AlreadyExists(format!("loan {loan_id}")));
        }

        let Envelope { metadata, key_set } = create_envelope(
            &loan_id,
            &request.metadata,
            &request.user_password,
            &request.bank_password,
            self.kdf,
        )?;

        let now = block_timestamp();
        let loan = LoanRecord {
            loan_id: loan_id.clone(),
            applicant_id: actor.id.clone(),
            bank_id: request.bank_id.clone(),
            status: Status::Initiated,
            created_at: now,
            updated_at: now,
        };
        let genesis = self.ledger.append_genesis(&loan, &key_set, metadata)?;

        self.audit(
            AuditEvent::new(AuditEventType::LoanInitiated)
                .with_actor(actor)
                .with_resource("loan", &loan_id)
                .with_details(serde_json::json!({ "bankId": request.bank_id })),
        );
        info!(
            loan_id = %loan_id,
            applicant_id = %actor.id,
            bank_id = %request.bank_id,
            "Loan initiated"
        );

        Ok(LoanReceipt {
            loan_id,
            genesis_block_hash: genesis.current_hash,
            status: Status::Initiated,
        })
    }

    /// Move a loan to `requested`. Only the loan's bank may do this.
    pub fn transition(
        &self,
        actor: &Actor,
        loan_id: &str,
        requested: Status,
    ) -> LedgerResult<TransitionReceipt> {
        self.apply_transition(actor, loan_id, requested, |current| {
            check_transition(loan_id, current, requested, actor.role)
        })
        .map_err(|e| self.record_failure(actor, loan_id, e))
    }

    /// Close a loan from any non-terminal state. Loan's bank only.
    pub fn close_loan(&self, actor: &Actor, loan_id: &str) -> LedgerResult<TransitionReceipt> {
        self.apply_transition(actor, loan_id, Status::Closed, |current| {
            check_close(loan_id, current, actor.role)
        })
        .map_err(|e| self.record_failure(actor, loan_id, e))
    }

    /// Append a status block once `check` accepts the loan's current status.
    fn apply_transition(
        &self,
        actor: &Actor,
        loan_id: &str,
        requested: Status,
        check: impl FnOnce(Status) -> LedgerResult<()>,
    ) -> LedgerResult<TransitionReceipt> {
        let head = self.ledger.head(loan_id)?;
        let current = head.loan.status;

        if current.is_terminal() {
            return Err(LedgerError::LoanClosed(loan_id.to_string()));
        }
        if actor.role == ActorRole::Bank && !head.loan.is_party(actor) {
            return Err(LedgerError::Forbidden(format!(
                "bank {} is not the bank of loan {loan_id}",
                actor.id
            )));
        }
        check(current)?;

        let block = self
            .ledger
            .append_block(&head, requested.transaction_description(), requested)?;

        let event_type = if requested == Status::Closed {
            AuditEventType::LoanClosed
        } else {
            AuditEventType::StatusChanged
        };
        self.audit(
            AuditEvent::new(event_type)
                .with_actor(actor)
                .with_resource("loan", loan_id)
                .with_details(serde_json::json!({
                    "from": current,
                    "to": requested,
                    "sequenceId": block.sequence_id,
                })),
        );
        info!(
            loan_id = %loan_id,
            from = %current,
            to = %requested,
            sequence_id = block.sequence_id,
            "Loan status changed"
        );

        Ok(TransitionReceipt {
            loan_id: loan_id.to_string(),
            new_status: requested,
            sequence_id: block.sequence_id,
            block_hash: block.current_hash,
        })
    }

    /// Lift a quarantine once the chain verifies again. Loan's bank only.
    pub fn clear_quarantine(&self, actor: &Actor, loan_id: &str) -> LedgerResult<()> {
        let result = self.require_loan(loan_id).and_then(|loan| {
            if actor.role != ActorRole::Bank || !loan.is_party(actor) {
                return Err(LedgerError::Forbidden(format!(
                    "only the bank of loan {loan_id} can clear its quarantine"
                )));
            }
            self.ledger.clear_quarantine(loan_id)
        });
        result.map_err(|e| self.record_failure(actor, loan_id, e))?;

        self.audit(
            AuditEvent::new(AuditEventType::QuarantineCleared)
                .with_actor(actor)
                .with_resource("loan", loan_id),
        );
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get_chain(&self, loan_id: &str) -> LedgerResult<Vec<Block>> {
        self.ledger.get_chain(loan_id)
    }

    pub fn get_latest(&self, loan_id: &str) -> LedgerResult<Block> {
        self.ledger.get_latest(loan_id)
    }

    pub fn get_block(&self, loan_id: &str, sequence_id: u64) -> LedgerResult<Block> {
        self.ledger.get_block(loan_id, sequence_id)
    }

    pub fn get_full_chain(&self) -> LedgerResult<Vec<Block>> {
        self.ledger.get_full_chain()
    }

    /// Verify a loan's chain. A broken chain is quarantined and audited.
    pub fn verify_chain(&self, loan_id: &str) -> LedgerResult<ChainVerification> {
        let result = self.ledger.verify_chain(loan_id)?;
        if let Some(broken_at) = result.broken_at_sequence_id {
            self.audit(
                AuditEvent::new(AuditEventType::ChainCorrupted)
                    .with_resource("loan", loan_id)
                    .with_details(serde_json::json!({ "brokenAtSequenceId": broken_at }))
                    .failed("chain verification failed"),
            );
        }
        Ok(result)
    }

    pub fn loans_for_bank(&self, bank_id: &str) -> LedgerResult<Vec<LoanSummary>> {
        let loans = self
            .store
            .list_loans()?
            .into_iter()
            .filter(|l| l.bank_id == bank_id)
            .collect();
        self.summarize(loans)
    }

    pub fn loans_for_applicant(&self, applicant_id: &str) -> LedgerResult<Vec<LoanSummary>> {
        let loans = self
            .store
            .list_loans()?
            .into_iter()
            .filter(|l| l.applicant_id == applicant_id)
            .collect();
        self.summarize(loans)
    }

    /// Loans where `actor` is the applicant or the bank.
    pub fn loans_for(&self, actor: &Actor) -> LedgerResult<Vec<LoanSummary>> {
        match actor.role {
            ActorRole::User => self.loans_for_applicant(&actor.id),
            ActorRole::Bank => self.loans_for_bank(&actor.id),
        }
    }

    fn summarize(&self, loans: Vec<LoanRecord>) -> LedgerResult<Vec<LoanSummary>> {
        loans
            .into_iter()
            .map(|loan| -> LedgerResult<LoanSummary> {
                let latest = self.ledger.get_latest(&loan.loan_id)?;
                let bank_name = self
                    .store
                    .account(ActorRole::Bank, &loan.bank_id)?
                    .map(|a| a.display_name);
                Ok(LoanSummary {
                    loan_id: loan.loan_id,
                    applicant_id: loan.applicant_id,
                    bank_id: loan.bank_id,
                    bank_name,
                    latest_status: loan.status,
                    latest_sequence_id: latest.sequence_id,
                    latest_block_hash: latest.current_hash,
                    initiated_at: loan.created_at,
                    updated_at: loan.updated_at,
                })
            })
            .collect()
    }

    /// Audit events for a loan. Parties only.
    pub fn audit_events(&self, actor: &Actor, loan_id: &str) -> LedgerResult<Vec<AuditEvent>> {
        let loan = self.require_loan(loan_id)?;
        if !loan.is_party(actor) {
            return Err(self.record_failure(
                actor,
                loan_id,
                LedgerError::Forbidden(format!("not a party to loan {loan_id}")),
            ));
        }
        Ok(self.store.audit_events(loan_id)?)
    }

    // =========================================================================
    // Decryption
    // =========================================================================

    /// Recover the loan's metadata as `actor`, using that role's envelope password.
    ///
    /// The plaintext is never logged or stored; it is zeroed when the caller drops it.
    pub fn decrypt_metadata(
        &self,
        actor: &Actor,
        loan_id: &str,
        password: &str,
    ) -> LedgerResult<Zeroizing<Vec<u8>>> {
        self.open_metadata(actor, loan_id, password)
            .map_err(|e| self.record_failure(actor, loan_id, e))
    }

    fn open_metadata(
        &self,
        actor: &Actor,
        loan_id: &str,
        password: &str,
    ) -> LedgerResult<Zeroizing<Vec<u8>>> {
        let loan = self.require_loan(loan_id)?;
        if !loan.is_party(actor) {
            return Err(LedgerError::Forbidden(format!("not a party to loan {loan_id}")));
        }

        let genesis = self.ledger.get_genesis(loan_id)?;
        let metadata = genesis.metadata.ok_or_else(|| LedgerError::ChainCorrupted {
            loan_id: loan_id.to_string(),
            broken_at_sequence_id: 0,
        })?;
        let key_set = self
            .store
            .key_set(loan_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("key set for loan {loan_id}")))?;

        match open_envelope(&metadata, &key_set, actor.role, password) {
            Ok(plaintext) => {
                self.audit(
                    AuditEvent::new(AuditEventType::MetadataDecrypted)
                        .with_actor(actor)
                        .with_resource("loan", loan_id),
                );
                info!(loan_id = %loan_id, role = %actor.role, "Metadata decrypted");
                Ok(plaintext)
            }
            Err(e) => {
                let e = LedgerError::from(e);
                warn!(loan_id = %loan_id, role = %actor.role, error = %e, "Metadata decryption failed");
                self.audit(
                    AuditEvent::new(AuditEventType::DecryptionFailed)
                        .with_actor(actor)
                        .with_resource("loan", loan_id)
                        .failed(e.to_string()),
                );
                Err(e)
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn require_loan(&self, loan_id: &str) -> LedgerResult<LoanRecord> {
        self.store
            .loan(loan_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("loan {loan_id}")))
    }

    /// Audit failures never fail the operation they describe.
    fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.store.record_audit(&event) {
            warn!(error = %e, event_type = ?event.event_type, "Failed to record audit event");
        }
    }

    /// Audit denied access and corruption, then hand the error back.
    fn record_failure(&self, actor: &Actor, loan_id: &str, err: LedgerError) -> LedgerError {
        let event_type = match &err {
            LedgerError::Forbidden(_) => AuditEventType::AccessDenied,
            LedgerError::ChainCorrupted { .. } => AuditEventType::ChainCorrupted,
            _ => return err,
        };
        self.audit(
            AuditEvent::new(event_type)
                .with_actor(actor)
                .with_resource("loan", loan_id)
                .failed(err.to_string()),
        );
        err
    }
}
