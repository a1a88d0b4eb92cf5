// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit trail for loan lifecycle and decryption events.
//!
//! Events are written through [`LedgerStore::record_audit`](super::LedgerStore::record_audit)
//! next to the chain they describe. They never contain plaintext metadata or passwords.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::loan::Actor;

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Lifecycle events
    LoanInitiated,
    StatusChanged,
    LoanClosed,

    // Decryption events
    MetadataDecrypted,
    DecryptionFailed,

    // Integrity events
    ChainCorrupted,
    QuarantineCleared,

    // Access events
    AccessDenied,
    AccountRegistered,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// Role of the actor, `user` or `bank`.
    pub actor_role: Option<String>,
    /// Identity of the actor.
    pub actor_id: Option<String>,
    /// Resource affected (loan id, account id).
    pub resource_id: Option<String>,
    /// Resource type (loan, account).
    pub resource_type: Option<String>,
    /// Additional details as JSON.
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message if operation failed.
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            actor_role: None,
            actor_id: None,
            resource_id: None,
            resource_type: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_actor(mut self, actor: &Actor) -> Self {
        self.actor_role = Some(actor.role.as_str().to_string());
        self.actor_id = Some(actor.id.clone());
        self
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}
