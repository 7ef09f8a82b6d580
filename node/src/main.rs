// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # pointlock Node
//!
//! Entry point for the `pointlock-node` binary. Parses CLI arguments,
//! initializes logging and metrics, wires an escrow engine to its store,
//! ledger and event sinks, and serves the HTTP/WS API.
//!
//! The binary supports four subcommands:
//!
//! - `serve`  : run the API and metrics servers
//! - `keygen` : generate a secret scalar and its commitment point
//! - `commit` : print the commitment point of a given scalar
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use pointlock_contracts::{
    BroadcastEventSink, EscrowEngine, EscrowStore, FanoutEventSink, MemoryEscrowStore,
    SledEscrowStore, TracingEventSink,
};
use pointlock_protocol::config::{EVENT_CHANNEL_CAPACITY, ID_HASH_FUNCTION, PROTOCOL_VERSION};
use pointlock_protocol::{Bn254Oracle, CurveOracle, InMemoryLedger, Scalar, SystemClock};

use cli::{Commands, PointlockCli, StoreBackend};
use logging::LogFormat;
use metrics::EscrowMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PointlockCli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Keygen => keygen(),
        Commands::Commit(args) => commit(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the API server and metrics endpoint over a freshly wired engine.
async fn serve(args: cli::ServeArgs) -> Result<()> {
    logging::init_logging(
        "pointlock_node=info,pointlock_contracts=info,pointlock_protocol=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        store = ?args.store,
        data_dir = %args.data_dir.display(),
        "starting pointlock-node"
    );

    // --- Escrow store ---
    let store: Arc<dyn EscrowStore> = match args.store {
        StoreBackend::Memory => Arc::new(MemoryEscrowStore::new()),
        StoreBackend::Sled => {
            let db_path = args.data_dir.join("db");
            std::fs::create_dir_all(&db_path).with_context(|| {
                format!("failed to create database directory: {}", db_path.display())
            })?;
            let store = SledEscrowStore::open(&db_path)
                .with_context(|| format!("failed to open database at {}", db_path.display()))?;
            tracing::info!(path = %db_path.display(), "escrow database opened");
            Arc::new(store)
        }
    };

    // --- Metrics ---
    let escrow_metrics =
        Arc::new(EscrowMetrics::new().context("failed to create prometheus registry")?);

    // --- Events: structured logs + WebSocket broadcast ---
    let broadcast_sink = BroadcastEventSink::new(EVENT_CHANNEL_CAPACITY);
    let events = FanoutEventSink::new()
        .with(Arc::new(TracingEventSink))
        .with(Arc::new(broadcast_sink.clone()));

    // --- Engine ---
    let ledger = Arc::new(InMemoryLedger::new());
    let engine = Arc::new(
        EscrowEngine::builder()
            .store(store)
            .curve(Arc::new(Bn254Oracle::new()))
            .ledger(ledger.clone())
            .clock(Arc::new(SystemClock))
            .events(Arc::new(events))
            .build(),
    );

    reconcile_ledger(&engine, &ledger)?;

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            PROTOCOL_VERSION,
        ),
        engine,
        ledger,
        event_tx: broadcast_sink.sender(),
        metrics: Arc::clone(&escrow_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!(addr = %api_addr, "API server listening");

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&escrow_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!(addr = %metrics_addr, "metrics server listening");

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "API server error");
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "metrics server error");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("pointlock-node stopped");
    Ok(())
}

/// Re-lock the value of every still-open escrow in the in-memory ledger.
///
/// The ledger does not persist, so after a restart on a sled store it
/// knows nothing about escrows opened in earlier runs.
fn reconcile_ledger(engine: &EscrowEngine, ledger: &InMemoryLedger) -> Result<()> {
    let open = engine
        .open_contracts()
        .context("failed to list open escrows")?;
    for view in &open {
        ledger
            .fund_escrow(&view.contract_id, view.amount)
            .with_context(|| format!("failed to fund escrow {}", view.contract_id))?;
    }
    if !open.is_empty() {
        tracing::info!(count = open.len(), "re-funded open escrows from store");
    }
    Ok(())
}

/// Generates a secret scalar and prints it with its commitment point.
fn keygen() -> Result<()> {
    let oracle = Bn254Oracle::new();
    let secret = Scalar::generate();
    let point = oracle
        .commitment(&secret)
        .context("failed to compute commitment")?;

    println!("secret       : {}", secret.to_hex());
    println!("commitment.x : {}", point.x_hex());
    println!("commitment.y : {}", point.y_hex());
    Ok(())
}

/// Prints the commitment point of a caller-supplied scalar.
fn commit(args: cli::CommitArgs) -> Result<()> {
    let secret = Scalar::from_hex(&args.secret).context("invalid secret scalar")?;
    let point = Bn254Oracle::new()
        .commitment(&secret)
        .context("failed to compute commitment")?;

    println!("commitment.x : {}", point.x_hex());
    println!("commitment.y : {}", point.y_hex());
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("pointlock-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol       {}", PROTOCOL_VERSION);
    println!("curve          {}", Bn254Oracle::new().name());
    println!("contract id    {}", ID_HASH_FUNCTION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
}
