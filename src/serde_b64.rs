// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Serde adapter that stores byte vectors as standard base64 strings.
//!
//! Use with `#[serde(with = "crate::serde_b64")]`.

use base64ct::{Base64, Encoding};
use serde::{de::Error, Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&Base64::encode_string(bytes))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    Base64::decode_vec(&encoded).map_err(|e| D::Error::custom(format!("invalid base64: {e}")))
}
