// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::SessionKeys;
use crate::service::LoanService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LoanService>,
    pub sessions: Arc<SessionKeys>,
}

impl AppState {
    pub fn new(service: LoanService, sessions: SessionKeys) -> Self {
        Self {
            service: Arc::new(service),
            sessions: Arc::new(sessions),
        }
    }

    /// In-memory state with cheap key derivation.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        use crate::crypto::KdfParams;
        use crate::storage::MemoryStore;

        let service = LoanService::new(
            Arc::new(MemoryStore::new()),
            "test-hash-salt",
            KdfParams::for_tests(),
        );
        Self::new(service, SessionKeys::new(b"test-session-secret", 3600))
    }
}
