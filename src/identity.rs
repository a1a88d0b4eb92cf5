// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Registry
//!
//! Applicant and bank accounts with PBKDF2 login verifiers.
//!
//! Login passwords only authenticate a session. They never unwrap an
//! envelope: the passwords that protect loan metadata are supplied per
//! request and are independent of these.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::crypto::{self, KdfParams, KEY_LEN};
use crate::ledger::{LedgerError, LedgerResult};
use crate::loan::{validate_identifier, Actor, ActorRole};
use crate::storage::{AuditEvent, AuditEventType, LedgerStore};

/// A stored applicant or bank account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub role: ActorRole,
    pub id: String,
    /// Bank name for banks, the applicant id again for applicants.
    pub display_name: String,
    #[serde(with = "crate::serde_b64")]
    pub password_salt: Vec<u8>,
    #[serde(with = "crate::serde_b64")]
    pub password_verifier: Vec<u8>,
    pub kdf_iterations: u32,
    pub created_at: DateTime<Utc>,
}

/// Public view of a bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BankSummary {
    pub bank_id: String,
    pub bank_name: String,
}

pub struct IdentityRegistry {
    store: Arc<dyn LedgerStore>,
    kdf: KdfParams,
}

impl IdentityRegistry {
    pub fn new(store: Arc<dyn LedgerStore>, kdf: KdfParams) -> Self {
        Self { store, kdf }
    }

    pub fn register_applicant(&self, applicant_id: &str, password: &str) -> LedgerResult<Actor> {
        self.register(ActorRole::User, applicant_id, applicant_id, password)
    }

    pub fn register_bank(
        &self,
        bank_id: &str,
        bank_name: &str,
        password: &str,
    ) -> LedgerResult<Actor> {
        if bank_name.trim().is_empty() {
            return Err(LedgerError::InvalidInput("bank name must not be empty".into()));
        }
        self.register(ActorRole::Bank, bank_id, bank_name.trim(), password)
    }

    fn register(
        &self,
        role: ActorRole,
        id: &str,
        display_name: &str,
        password: &str,
    ) -> LedgerResult<Actor> {
        validate_identifier(&format!("{role} id"), id)?;
        if password.is_empty() {
            return Err(LedgerError::InvalidInput("password must not be empty".into()));
        }
        if self.store.account(role, id)?.is_some() {
            return Err(LedgerError::AlreadyExists(format!("{role} {id}")));
        }

        let salt = crypto::generate_salt()?;
        let verifier = crypto::derive_key(password, &salt, self.kdf);

        self.store.insert_account(&Account {
            role,
            id: id.to_string(),
            display_name: display_name.to_string(),
            password_salt: salt.to_vec(),
            password_verifier: verifier.to_vec(),
            kdf_iterations: self.kdf.iterations.get(),
            created_at: Utc::now(),
        })?;

        let actor = Actor {
            role,
            id: id.to_string(),
        };
        let event = AuditEvent::new(AuditEventType::AccountRegistered)
            .with_actor(&actor)
            .with_resource("account", format!("{role}:{id}"));
        if let Err(e) = self.store.record_audit(&event) {
            warn!(error = %e, "Failed to record audit event");
        }
        info!(role = %role, id = %id, "Account registered");
        Ok(actor)
    }

    /// Verify a login password.
    ///
    /// Unknown ids and wrong passwords are indistinguishable: both cost one
    /// key derivation and both fail with [`LedgerError::WrongCredentials`].
    pub fn authenticate(&self, role: ActorRole, id: &str, password: &str) -> LedgerResult<Actor> {
        match self.store.account(role, id)? {
            Some(account) => {
                let params = KdfParams::new(account.kdf_iterations);
                if crypto::verify_password(
                    password,
                    &account.password_salt,
                    &account.password_verifier,
                    params,
                ) {
                    Ok(Actor {
                        role,
                        id: account.id,
                    })
                } else {
                    Err(LedgerError::WrongCredentials)
                }
            }
            None => {
                let _ = crypto::verify_password(password, &[0u8; 16], &[0u8; KEY_LEN], self.kdf);
                Err(LedgerError::WrongCredentials)
            }
        }
    }

    /// The account for `(role, id)`, or [`LedgerError::NotFound`].
    pub fn require(&self, role: ActorRole, id: &str) -> LedgerResult<Account> {
        self.store
            .account(role, id)?
            .ok_or_else(|| LedgerError::NotFound(format!("{role} {id}")))
    }

    pub fn bank_name(&self, bank_id: &str) -> LedgerResult<String> {
        Ok(self.require(ActorRole::Bank, bank_id)?.display_name)
    }

    pub fn list_banks(&self) -> LedgerResult<Vec<BankSummary>> {
        Ok(self
            .store
            .list_accounts(ActorRole::Bank)?
            .into_iter()
            .map(|a| BankSummary {
                bank_id: a.id,
                bank_name: a.display_name,
            })
            .collect())
    }
}
