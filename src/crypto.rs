// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Crypto Primitives
//!
//! Thin wrappers over `ring` and `sha2`:
//!
//! | Primitive | Algorithm |
//! |-----------|-----------|
//! | Key derivation | PBKDF2-HMAC-SHA256, 32-byte output |
//! | Authenticated encryption | AES-256-GCM, random 96-bit nonce, tag appended |
//! | Chain hash | SHA-256 |
//!
//! Every key that leaves this module is wrapped in [`Zeroizing`] so it is
//! scrubbed when the caller drops it.

use std::num::NonZeroU32;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroizing;

/// Symmetric key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Salt length for password-derived keys.
pub const SALT_LEN: usize = 16;

/// Default PBKDF2 iteration count.
pub const DEFAULT_KDF_ITERATIONS: u32 = 200_000;

/// A 256-bit symmetric key, zeroed on drop.
pub type SecretKey = Zeroizing<[u8; KEY_LEN]>;

/// SHA-256 digest.
pub type Digest32 = [u8; 32];

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Tag check failed: wrong key or tampered ciphertext.
    #[error("authentication failure")]
    AuthenticationFailure,

    #[error("invalid key material")]
    InvalidKey,

    #[error("invalid nonce length: expected {NONCE_LEN}, got {0}")]
    InvalidNonce(usize),

    #[error("random number generator failure")]
    Rng,
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Tunable cost for password-based key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub iterations: NonZeroU32,
}

impl KdfParams {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN),
        }
    }

    /// Cheap parameters so unit tests stay fast. Never use in production.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::new(1_000)
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::new(DEFAULT_KDF_ITERATIONS)
    }
}

/// Output of [`encrypt`]: ciphertext with the GCM tag appended, plus the nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

/// Fill a fixed-size array from the system CSPRNG.
pub fn random_bytes<const N: usize>() -> CryptoResult<[u8; N]> {
    let mut out = [0u8; N];
    SystemRandom::new()
        .fill(&mut out)
        .map_err(|_| CryptoError::Rng)?;
    Ok(out)
}

/// Generate a fresh random data key.
pub fn generate_key() -> CryptoResult<SecretKey> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    SystemRandom::new()
        .fill(key.as_mut())
        .map_err(|_| CryptoError::Rng)?;
    Ok(key)
}

/// Generate a random KDF salt.
pub fn generate_salt() -> CryptoResult<[u8; SALT_LEN]> {
    random_bytes::<SALT_LEN>()
}

/// Passwords are NFC-normalized so the same visible password always derives
/// the same key regardless of how the client composed it.
fn normalize_password(password: &str) -> Zeroizing<String> {
    Zeroizing::new(password.nfc().collect::<String>())
}

/// Derive a symmetric key from a password and salt.
///
/// Deterministic for a given `(password, salt, params)`.
pub fn derive_key(password: &str, salt: &[u8], params: KdfParams) -> SecretKey {
    let normalized = normalize_password(password);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        params.iterations,
        salt,
        normalized.as_bytes(),
        key.as_mut(),
    );
    key
}

/// Constant-time check of a password against a stored PBKDF2 verifier.
pub fn verify_password(password: &str, salt: &[u8], expected: &[u8], params: KdfParams) -> bool {
    let normalized = normalize_password(password);
    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        params.iterations,
        salt,
        normalized.as_bytes(),
        expected,
    )
    .is_ok()
}

fn aead_key(key: &[u8]) -> CryptoResult<LessSafeKey> {
    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| CryptoError::InvalidKey)?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` under `key`, authenticating `aad` alongside it.
///
/// A fresh random nonce is drawn for every call.
pub fn encrypt(key: &[u8], plaintext: &[u8], aad: &[u8]) -> CryptoResult<Sealed> {
    let sealing_key = aead_key(key)?;
    let nonce = random_bytes::<NONCE_LEN>()?;

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::InvalidKey)?;

    Ok(Sealed {
        ciphertext: in_out,
        nonce,
    })
}

/// Decrypt and authenticate. Any tag mismatch is an
/// [`CryptoError::AuthenticationFailure`]; no partial plaintext is returned.
pub fn decrypt(
    key: &[u8],
    ciphertext: &[u8],
    nonce: &[u8],
    aad: &[u8],
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let nonce: [u8; NONCE_LEN] = nonce
        .try_into()
        .map_err(|_| CryptoError::InvalidNonce(nonce.len()))?;
    let opening_key = aead_key(key)?;

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = opening_key
        .open_in_place(Nonce::assume_unique_for_key(nonce), Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::AuthenticationFailure)?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

/// SHA-256 of `bytes`.
pub fn hash(bytes: &[u8]) -> Digest32 {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(bytes));
    out
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn hash_hex(bytes: &[u8]) -> String {
    hex::encode(hash(bytes))
}
