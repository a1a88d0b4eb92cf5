// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Loan State Machine
//!
//! ```text
//! initiated ──bank──▶ accepted ──bank──▶ paid ────bank──▶ completed
//!                        │                                   ▲
//!                        └────bank──▶ unpaid ───bank─────────┘
//!
//! any non-closed state ──bank (close)──▶ closed   (terminal)
//! ```
//!
//! The applicant never moves a loan between states; creating the loan is
//! the only write they perform.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ledger::{LedgerError, LedgerResult};

/// Transaction description of the genesis block.
pub const LOAN_INITIATED: &str = "LOAN_INITIATED";

/// Prefix of the transaction description of every status block.
pub const STATUS_PREFIX: &str = "STATUS:";

/// Loan lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Initiated,
    Accepted,
    Paid,
    Unpaid,
    Completed,
    Closed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Initiated => "initiated",
            Status::Accepted => "accepted",
            Status::Paid => "paid",
            Status::Unpaid => "unpaid",
            Status::Completed => "completed",
            Status::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Closed)
    }

    /// Text recorded in the block that moves a loan into this status.
    pub fn transaction_description(&self) -> String {
        match self {
            Status::Initiated => LOAN_INITIATED.to_string(),
            other => format!("{STATUS_PREFIX}{}", other.as_str()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "initiated" => Ok(Status::Initiated),
            "accepted" => Ok(Status::Accepted),
            "paid" => Ok(Status::Paid),
            "unpaid" => Ok(Status::Unpaid),
            "completed" => Ok(Status::Completed),
            "closed" => Ok(Status::Closed),
            other => Err(LedgerError::InvalidInput(format!("unknown status '{other}'"))),
        }
    }
}

/// Which party is acting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    /// The loan applicant.
    User,
    /// The approving bank.
    Bank,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::User => "user",
            ActorRole::Bank => "bank",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated party: role plus the identity it was authenticated as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub role: ActorRole,
    pub id: String,
}

impl Actor {
    pub fn applicant(id: impl Into<String>) -> Self {
        Self {
            role: ActorRole::User,
            id: id.into(),
        }
    }

    pub fn bank(id: impl Into<String>) -> Self {
        Self {
            role: ActorRole::Bank,
            id: id.into(),
        }
    }
}

/// A loan's mutable summary record. Blocks are the source of truth for
/// history; this record caches the current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanRecord {
    pub loan_id: String,
    pub applicant_id: String,
    pub bank_id: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoanRecord {
    /// Whether `actor` is the applicant or the bank on this loan.
    pub fn is_party(&self, actor: &Actor) -> bool {
        match actor.role {
            ActorRole::User => self.applicant_id == actor.id,
            ActorRole::Bank => self.bank_id == actor.id,
        }
    }
}

/// Legal `(from, to)` pairs for [`check_transition`]. All of them are
/// bank-initiated. `closed` is only reached through [`check_close`].
fn is_legal_edge(from: Status, to: Status) -> bool {
    use Status::*;
    matches!(
        (from, to),
        (Initiated, Accepted)
            | (Accepted, Paid)
            | (Accepted, Unpaid)
            | (Paid, Completed)
            | (Unpaid, Completed)
    )
}

/// Validate a status change requested by `role`.
///
/// A closed loan rejects everything with [`LedgerError::LoanClosed`] before
/// the actor or the edge is looked at. Requests for `closed` are invalid
/// here; closing is its own operation.
pub fn check_transition(
    loan_id: &str,
    current: Status,
    requested: Status,
    role: ActorRole,
) -> LedgerResult<()> {
    if current.is_terminal() {
        return Err(LedgerError::LoanClosed(loan_id.to_string()));
    }

    if role == ActorRole::Bank && is_legal_edge(current, requested) {
        Ok(())
    } else {
        Err(LedgerError::InvalidTransition {
            from: current,
            to: requested,
            role,
        })
    }
}

/// Validate an explicit close. The bank may close from any non-terminal state.
pub fn check_close(loan_id: &str, current: Status, role: ActorRole) -> LedgerResult<()> {
    if current.is_terminal() {
        return Err(LedgerError::LoanClosed(loan_id.to_string()));
    }
    if role != ActorRole::Bank {
        return Err(LedgerError::InvalidTransition {
            from: current,
            to: Status::Closed,
            role,
        });
    }
    Ok(())
}

/// Identifier rule shared by loans, applicants and banks.
pub fn validate_identifier(kind: &str, id: &str) -> LedgerResult<()> {
    let ok = !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(LedgerError::InvalidInput(format!(
            "{kind} must be 1-64 characters of [A-Za-z0-9_-]"
        )))
    }
}

/// A 16-hex-character loan id taken from a v4 UUID.
pub fn generate_loan_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}
