// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy for ledger, state machine and decryption operations.

use crate::crypto::CryptoError;
use crate::envelope::EnvelopeError;
use crate::loan::{ActorRole, Status};
use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Requested status is not reachable from the current state for this actor.
    #[error("invalid transition from {from} to {to} requested by {role}")]
    InvalidTransition {
        from: Status,
        to: Status,
        role: ActorRole,
    },

    /// The loan is closed and accepts no further writes.
    #[error("loan {0} is closed")]
    LoanClosed(String),

    /// Another append for the same loan won the race.
    #[error("concurrent modification of loan {loan_id}: expected next sequence {expected}, found {actual}")]
    ConcurrentModification {
        loan_id: String,
        expected: u64,
        actual: u64,
    },

    /// Data-key layer tag mismatch. Indicates corrupted storage, not a bad password.
    #[error("authentication failure")]
    AuthenticationFailure,

    /// The supplied password could not unwrap the data key.
    #[error("wrong credentials")]
    WrongCredentials,

    /// Broken hash link or recomputed hash mismatch.
    #[error("chain for loan {loan_id} is corrupted at sequence {broken_at_sequence_id}")]
    ChainCorrupted {
        loan_id: String,
        broken_at_sequence_id: u64,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Authenticated actor is not a party to this loan.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("storage error: {0}")]
    Storage(StoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConcurrentModification {
                loan_id,
                expected,
                actual,
            } => LedgerError::ConcurrentModification {
                loan_id,
                expected,
                actual,
            },
            StoreError::Quarantined {
                loan_id,
                broken_at_sequence_id,
            } => LedgerError::ChainCorrupted {
                loan_id,
                broken_at_sequence_id,
            },
            StoreError::AlreadyExists(what) => LedgerError::AlreadyExists(what),
            StoreError::NotFound(what) => LedgerError::NotFound(what),
            other => LedgerError::Storage(other),
        }
    }
}

impl From<EnvelopeError> for LedgerError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::WrongCredentials => LedgerError::WrongCredentials,
            EnvelopeError::AuthenticationFailure => LedgerError::AuthenticationFailure,
            EnvelopeError::Crypto(inner) => LedgerError::Crypto(inner),
        }
    }
}
