//! Handler functions

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::{Json, Response, WithStatus};
use warp::{Rejection, Reply};

use super::{ServerState, STATEMENT_PATH, TRANSACTIONS_PATH};
use crate::application::{LedgerError, LedgerService, TransactionRequest};
use crate::domain::{AccountId, Cents, Statement, Transaction};

/// Body of `POST /clientes/{id}/transacoes`
#[derive(Debug, Deserialize)]
pub struct TransactionBody {
    pub valor: Cents,
    pub tipo: String,
    #[serde(default)]
    pub descricao: Option<String>,
}

/// Reply to an accepted transaction
#[derive(Debug, Serialize, Deserialize)]
pub struct AppliedBody {
    pub limite: Cents,
    pub saldo: Cents,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceBody {
    pub total: Cents,
    pub data_extrato: String,
    pub limite: Cents,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntryBody {
    pub valor: Cents,
    pub tipo: String,
    pub descricao: String,
    pub realizada_em: String,
}

/// Reply to `GET /clientes/{id}/extrato`
#[derive(Debug, Serialize, Deserialize)]
pub struct StatementBody {
    pub saldo: BalanceBody,
    pub ultimas_transacoes: Vec<EntryBody>,
}

impl EntryBody {
    pub fn new(t: &Transaction, offset: FixedOffset) -> Self {
        Self {
            valor: t.amount,
            tipo: t.kind.as_str().to_string(),
            descricao: t.description.to_string(),
            realizada_em: timestamp(t.occurred_at, offset),
        }
    }
}

impl StatementBody {
    pub fn new(statement: &Statement, offset: FixedOffset) -> Self {
        Self {
            saldo: BalanceBody {
                total: statement.balance,
                data_extrato: timestamp(statement.as_of, offset),
                limite: statement.limit,
            },
            ultimas_transacoes: statement
                .transactions
                .iter()
                .map(|t| EntryBody::new(t, offset))
                .collect(),
        }
    }
}

/// RFC 3339 with microseconds; `Z` when the offset is zero.
fn timestamp(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset)
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// HTTP status for each ledger error.
pub fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InvalidInput(_) | LedgerError::InsufficientLimit { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LedgerError::TransientStorageFailure(_) | LedgerError::Provisioning(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

type Outcome = (Json, StatusCode);

fn empty(status: StatusCode) -> Outcome {
    (warp::reply::json(&serde_json::json!({})), status)
}

fn error_outcome(err: &LedgerError) -> Outcome {
    if err.is_rejection() {
        log::debug!("{}", err);
    } else {
        log::error!("{}", err);
    }
    empty(status_for(err))
}

/// Count the request and turn the outcome into a reply.
fn finish(
    state: &ServerState,
    method: &str,
    path: &str,
    started: Instant,
    (reply, status): Outcome,
) -> WithStatus<Json> {
    state.metrics.observe(method, path, status, started.elapsed());
    warp::reply::with_status(reply, status)
}

/// Account IDs that are not integers cannot be provisioned.
fn parse_account_id(raw: &str) -> Option<AccountId> {
    raw.parse().ok()
}

/// The `apply_transaction` handler
///
/// POST
pub async fn apply_transaction(
    id: String,
    body: Bytes,
    state: Arc<ServerState>,
) -> Result<WithStatus<Json>, Rejection> {
    let started = Instant::now();
    let outcome = apply_outcome(&id, &body, &state.service).await;
    Ok(finish(&state, "POST", TRANSACTIONS_PATH, started, outcome))
}

async fn apply_outcome(id: &str, body: &[u8], service: &LedgerService) -> Outcome {
    let Some(account_id) = parse_account_id(id).filter(|id| service.is_provisioned(*id)) else {
        return empty(StatusCode::NOT_FOUND);
    };

    let body: TransactionBody = match serde_json::from_slice(body) {
        Ok(body) => body,
        Err(err) => {
            log::debug!("Undecodable transaction for account {}: {}", account_id, err);
            return empty(StatusCode::UNPROCESSABLE_ENTITY);
        }
    };
    log::debug!("apply_transaction; account = {}, body = {:?}", account_id, body);

    let request = TransactionRequest::new(body.tipo, body.valor, body.descricao.unwrap_or_default());
    match service.apply(account_id, &request).await {
        Ok(applied) => (
            warp::reply::json(&AppliedBody {
                limite: applied.limit,
                saldo: applied.balance,
            }),
            StatusCode::OK,
        ),
        Err(err) => error_outcome(&err),
    }
}

/// The `statement` handler
///
/// GET
pub async fn statement(
    id: String,
    state: Arc<ServerState>,
) -> Result<WithStatus<Json>, Rejection> {
    let started = Instant::now();
    let outcome = match parse_account_id(&id) {
        None => empty(StatusCode::NOT_FOUND),
        Some(account_id) => match state.service.snapshot(account_id).await {
            Ok(statement) => (
                warp::reply::json(&StatementBody::new(&statement, state.utc_offset)),
                StatusCode::OK,
            ),
            Err(err) => error_outcome(&err),
        },
    };
    Ok(finish(&state, "GET", STATEMENT_PATH, started, outcome))
}

/// The `metrics` handler
///
/// GET
pub async fn metrics(state: Arc<ServerState>) -> Result<Response, Rejection> {
    match state.metrics.render() {
        Ok(text) => Ok(warp::reply::with_header(
            text,
            "content-type",
            state.metrics.content_type(),
        )
        .into_response()),
        Err(err) => {
            log::error!("{:#}", err);
            Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}
