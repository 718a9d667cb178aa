//! HTTP front end for the ledger engine.

pub mod handlers;
pub mod metrics;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use warp::{Filter, Rejection, Reply};

use crate::application::LedgerService;

use self::metrics::Metrics;

/// Route templates, used as metric labels.
pub const TRANSACTIONS_PATH: &str = "/clientes/{id}/transacoes";
pub const STATEMENT_PATH: &str = "/clientes/{id}/extrato";

/// Largest accepted request body, in bytes.
const MAX_BODY_BYTES: u64 = 1024 * 16;

/// What every handler shares.
pub struct ServerState {
    pub service: Arc<LedgerService>,
    pub metrics: Metrics,
    /// Offset applied to timestamps in replies
    pub utc_offset: FixedOffset,
}

impl ServerState {
    pub fn new(service: Arc<LedgerService>) -> Result<Self> {
        Ok(Self {
            service,
            metrics: Metrics::new()?,
            utc_offset: Utc.fix(),
        })
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }
}

/// All routes, with request logging.
///
/// - `POST /clientes/{id}/transacoes` applies one transaction
/// - `GET /clientes/{id}/extrato` returns the account statement
/// - `GET /metrics` exposes request counts and latencies
pub fn routes(
    state: Arc<ServerState>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let service_state = warp::any().map(move || state.clone());

    let transactions = warp::path!("clientes" / String / "transacoes")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(service_state.clone())
        .and_then(handlers::apply_transaction);

    let statement = warp::path!("clientes" / String / "extrato")
        .and(warp::get())
        .and(service_state.clone())
        .and_then(handlers::statement);

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and(service_state)
        .and_then(handlers::metrics);

    transactions
        .or(statement)
        .or(metrics)
        .with(warp::log("saldo::http"))
}

/// Serve until Ctrl-C, then close the storage connections.
pub async fn serve(state: ServerState, addr: SocketAddr) -> Result<()> {
    let state = Arc::new(state);
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for the shutdown signal: {}", err);
        }
        log::info!("Shutting down");
    };

    let (bound, server) = warp::serve(routes(state.clone()))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .with_context(|| format!("Failed to bind {}", addr))?;

    log::info!("Listening on {}", bound);
    server.await;

    state.service.close().await;
    Ok(())
}
