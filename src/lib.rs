// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Loan Ledger - Dual-Party Encrypted Loan Origination Ledger
//!
//! Every loan is an append-only hash chain of blocks. The application
//! payload travels in the genesis block, encrypted under a random data key
//! that is wrapped twice: once under a key derived from the applicant's
//! password and once under a key derived from the bank's password.
//!
//! ## Modules
//!
//! - `crypto` - PBKDF2, AES-256-GCM, SHA-256, secure random
//! - `envelope` - dual-party envelope encryption and unwrap
//! - `loan` - status state machine and actor roles
//! - `ledger` - blocks, canonical hashing, append and verify
//! - `storage` - `LedgerStore` trait with in-memory and redb backends, audit events
//! - `identity` - applicant and bank accounts
//! - `service` - `LoanService`, the operations callers use
//! - `auth` - HS256 session tokens and axum extractors
//! - `api` - HTTP API handlers (Axum)

pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod loan;
pub mod serde_b64;
pub mod service;
pub mod state;
pub mod storage;
