// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Envelope Encryption
//!
//! One random data key per loan encrypts the metadata once. That data key is
//! then wrapped twice, under keys derived from the applicant's and the bank's
//! passwords with independent salts:
//!
//! ```text
//!            ┌────────── data key (random, never stored) ──────────┐
//!            │                                                      │
//!   wrap(PBKDF2(user_pw, user_salt))                  wrap(PBKDF2(bank_pw, bank_salt))
//!            │                                                      │
//!     user_wrapped_key                                       bank_wrapped_key
//!
//!   metadata ciphertext = AES-256-GCM(data key, plaintext, aad = loan_id)
//! ```
//!
//! Wrapped keys authenticate `loan_id|role` as associated data, so a wrapped
//! key copied into another loan or the other party's slot fails to open.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zeroize::Zeroizing;

use crate::crypto::{self, CryptoError, KdfParams, SecretKey, KEY_LEN};
use crate::ledger::BlockMetadata;
use crate::loan::ActorRole;

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The role's password did not unwrap the data key.
    #[error("wrong credentials")]
    WrongCredentials,

    /// The data key unwrapped but did not open the metadata.
    #[error("authentication failure")]
    AuthenticationFailure,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// A data key encrypted under one party's password-derived key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WrappedKey {
    #[serde(with = "crate::serde_b64")]
    #[schema(value_type = String)]
    pub ciphertext: Vec<u8>,
    #[serde(with = "crate::serde_b64")]
    #[schema(value_type = String)]
    pub nonce: Vec<u8>,
    /// KDF salt. Not secret.
    #[serde(with = "crate::serde_b64")]
    #[schema(value_type = String)]
    pub salt: Vec<u8>,
}

/// The two wrapped copies of a loan's data key. Written once, with genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeKeySet {
    pub loan_id: String,
    pub user_wrapped_key: WrappedKey,
    pub bank_wrapped_key: WrappedKey,
    /// PBKDF2 iterations used for both wraps, kept so a later change of the
    /// configured cost does not lock out existing loans.
    pub kdf_iterations: u32,
    pub created_at: DateTime<Utc>,
}

impl EnvelopeKeySet {
    pub fn wrapped_for(&self, role: ActorRole) -> &WrappedKey {
        match role {
            ActorRole::User => &self.user_wrapped_key,
            ActorRole::Bank => &self.bank_wrapped_key,
        }
    }
}

/// Output of [`create_envelope`]: what goes into the genesis block plus the key set.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub metadata: BlockMetadata,
    pub key_set: EnvelopeKeySet,
}

fn wrap_aad(loan_id: &str, role: ActorRole) -> Vec<u8> {
    format!("{loan_id}|{}", role.as_str()).into_bytes()
}

fn wrap_for(
    loan_id: &str,
    role: ActorRole,
    data_key: &SecretKey,
    password: &str,
    params: KdfParams,
) -> Result<WrappedKey, CryptoError> {
    let salt = crypto::generate_salt()?;
    let party_key = crypto::derive_key(password, &salt, params);
    let sealed = crypto::encrypt(party_key.as_ref(), data_key.as_ref(), &wrap_aad(loan_id, role))?;
    Ok(WrappedKey {
        ciphertext: sealed.ciphertext,
        nonce: sealed.nonce.to_vec(),
        salt: salt.to_vec(),
    })
}

/// Encrypt `plaintext` for `loan_id` so either password can later open it.
///
/// The data key and both derived keys are zeroed before this returns.
pub fn create_envelope(
    loan_id: &str,
    plaintext: &[u8],
    user_password: &str,
    bank_password: &str,
    params: KdfParams,
) -> Result<Envelope, EnvelopeError> {
    let data_key = crypto::generate_key()?;
    let sealed = crypto::encrypt(data_key.as_ref(), plaintext, loan_id.as_bytes())?;

    let user_wrapped_key = wrap_for(loan_id, ActorRole::User, &data_key, user_password, params)?;
    let bank_wrapped_key = wrap_for(loan_id, ActorRole::Bank, &data_key, bank_password, params)?;

    Ok(Envelope {
        metadata: BlockMetadata {
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce.to_vec(),
        },
        key_set: EnvelopeKeySet {
            loan_id: loan_id.to_string(),
            user_wrapped_key,
            bank_wrapped_key,
            kdf_iterations: params.iterations.get(),
            created_at: Utc::now(),
        },
    })
}

/// Recover the metadata plaintext as `role` using that role's password.
///
/// A failure to unwrap the data key is always [`EnvelopeError::WrongCredentials`],
/// whatever the underlying cause, so callers cannot tell which layer failed.
pub fn open_envelope(
    metadata: &BlockMetadata,
    key_set: &EnvelopeKeySet,
    role: ActorRole,
    password: &str,
) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
    let wrapped = key_set.wrapped_for(role);
    let params = KdfParams::new(key_set.kdf_iterations);
    let party_key = crypto::derive_key(password, &wrapped.salt, params);

    let unwrapped = crypto::decrypt(
        party_key.as_ref(),
        &wrapped.ciphertext,
        &wrapped.nonce,
        &wrap_aad(&key_set.loan_id, role),
    )
    .map_err(|_| EnvelopeError::WrongCredentials)?;

    if unwrapped.len() != KEY_LEN {
        return Err(EnvelopeError::WrongCredentials);
    }
    let mut data_key: SecretKey = Zeroizing::new([0u8; KEY_LEN]);
    data_key.copy_from_slice(&unwrapped);

    crypto::decrypt(
        data_key.as_ref(),
        &metadata.ciphertext,
        &metadata.nonce,
        key_set.loan_id.as_bytes(),
    )
    .map_err(|e| match e {
        CryptoError::AuthenticationFailure => EnvelopeError::AuthenticationFailure,
        other => EnvelopeError::Crypto(other),
    })
}
