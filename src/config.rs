// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `ledger.redb`; unset selects the in-memory store | unset |
//! | `JWT_SECRET` | HS256 secret for session tokens | `dev-secret-change-me` |
//! | `SESSION_TTL_SECS` | Session token lifetime in seconds | `28800` |
//! | `APP_HASH_SALT` | Salt mixed into every block hash | `app-wide-hash-salt` |
//! | `KDF_ITERATIONS` | PBKDF2 iteration count | `200000` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;

use crate::crypto::{KdfParams, DEFAULT_KDF_ITERATIONS};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the ledger data directory.
///
/// When set, the redb database lives at `$DATA_DIR/ledger.redb`.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const SESSION_TTL_ENV: &str = "SESSION_TTL_SECS";
pub const APP_HASH_SALT_ENV: &str = "APP_HASH_SALT";
pub const KDF_ITERATIONS_ENV: &str = "KDF_ITERATIONS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Name of the redb file inside `DATA_DIR`.
pub const LEDGER_DB_FILE: &str = "ledger.redb";

pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 8 * 60 * 60;
pub const DEFAULT_APP_HASH_SALT: &str = "app-wide-hash-salt";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    pub jwt_secret: String,
    /// True when `JWT_SECRET` was not set and the development secret is in use.
    pub jwt_secret_defaulted: bool,
    pub session_ttl_secs: u64,
    pub app_hash_salt: String,
    pub kdf_iterations: u32,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unparseable numbers
    /// fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = non_empty(JWT_SECRET_ENV);
        let jwt_secret_defaulted = jwt_secret.is_none();

        Self {
            host: non_empty(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: non_empty(PORT_ENV)
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            data_dir: non_empty(DATA_DIR_ENV).map(PathBuf::from),
            jwt_secret: jwt_secret.unwrap_or_else(|| DEFAULT_JWT_SECRET.to_string()),
            jwt_secret_defaulted,
            session_ttl_secs: non_empty(SESSION_TTL_ENV)
                .and_then(|v| v.parse().ok())
                .filter(|ttl| *ttl > 0)
                .unwrap_or(DEFAULT_SESSION_TTL_SECS),
            app_hash_salt: non_empty(APP_HASH_SALT_ENV)
                .unwrap_or_else(|| DEFAULT_APP_HASH_SALT.to_string()),
            kdf_iterations: non_empty(KDF_ITERATIONS_ENV)
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_KDF_ITERATIONS),
            log_format: match non_empty(LOG_FORMAT_ENV).as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams::new(self.kdf_iterations)
    }

    pub fn ledger_db_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(LEDGER_DB_FILE))
    }
}
