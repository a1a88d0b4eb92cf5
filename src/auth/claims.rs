// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session token claims.

use serde::{Deserialize, Serialize};

use crate::loan::{Actor, ActorRole};

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Applicant id or bank id.
    pub sub: String,
    /// Which registry `sub` belongs to.
    pub role: ActorRole,
    /// Issuer
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl SessionClaims {
    pub fn actor(&self) -> Actor {
        Actor {
            role: self.role,
            id: self.sub.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_map_to_actor() {
        let claims = SessionClaims {
            sub: "BANK01".into(),
            role: ActorRole::Bank,
            iss: "loan-ledger".into(),
            iat: 1_700_000_000,
            exp: 1_700_028_800,
        };
        assert_eq!(claims.actor(), Actor::bank("BANK01"));

        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["role"], "bank");
    }
}
