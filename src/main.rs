// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use loan_ledger_server::{
    api::router,
    auth::SessionKeys,
    config::{Config, LogFormat},
    service::LoanService,
    state::AppState,
    storage::{LedgerStore, MemoryStore, RedbStore},
};

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(config.log_format);

    info!(
        bind = %config.bind_addr(),
        data_dir = ?config.data_dir,
        kdf_iterations = config.kdf_iterations,
        session_ttl_secs = config.session_ttl_secs,
        "Configuration loaded"
    );
    if config.jwt_secret_defaulted {
        warn!("JWT_SECRET is not set; using the development secret. Do not run this in production.");
    }

    let store = open_store(&config);
    let service = LoanService::new(store, &config.app_hash_salt, config.kdf_params());
    let sessions = SessionKeys::new(config.jwt_secret.as_bytes(), config.session_ttl_secs);
    let app = router(AppState::new(service, sessions));

    let listener = match tokio::net::TcpListener::bind(config.bind_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, bind = %config.bind_addr(), "Failed to bind listener");
            std::process::exit(1);
        }
    };
    info!(bind = %config.bind_addr(), "Loan ledger listening (docs at /docs)");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
    info!("Server stopped");
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

fn open_store(config: &Config) -> Arc<dyn LedgerStore> {
    let (Some(dir), Some(path)) = (config.data_dir.as_ref(), config.ledger_db_path()) else {
        warn!("DATA_DIR is not set; using the in-memory store. All data is lost on restart.");
        return Arc::new(MemoryStore::new());
    };

    if let Err(e) = std::fs::create_dir_all(dir) {
        error!(error = %e, data_dir = %dir.display(), "Failed to create data directory");
        std::process::exit(1);
    }
    match RedbStore::open(&path) {
        Ok(store) => {
            info!(path = %path.display(), "Opened redb ledger store");
            Arc::new(store)
        }
        Err(e) => {
            error!(error = %e, path = %path.display(), "Failed to open ledger store");
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutting down...");
}
