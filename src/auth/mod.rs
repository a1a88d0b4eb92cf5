// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Session tokens for applicants and banks.
//!
//! ## Auth Flow
//!
//! 1. A client registers or logs in through `/v1/auth/applicants[/login]`
//!    or `/v1/auth/banks[/login]`
//! 2. The identity registry verifies the login password
//! 3. The server returns an HS256 token with `sub`, `role`, `iss`, `iat`, `exp`
//! 4. The client sends `Authorization: Bearer <token>` on every `/v1` call
//! 5. The [`Auth`] extractor turns the token into an [`Actor`](crate::loan::Actor)
//!
//! ## Security
//!
//! - All non-health, non-login endpoints require authentication
//! - Tokens never carry envelope passwords; those travel per request
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;
pub mod session;

pub use claims::SessionClaims;
pub use error::AuthError;
pub use extractor::{ApplicantOnly, Auth};
pub use session::{SessionKeys, SessionToken};
