//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the escrow engine over HTTP.
//! All endpoints share application state through axum's `State` extractor.
//! The caller identity is always an explicit field of the request body.
//!
//! ## Endpoints
//!
//! | Method | Path                      | Description                        |
//! |--------|---------------------------|------------------------------------|
//! | GET    | `/health`                 | Liveness probe                     |
//! | POST   | `/contracts`              | Open an escrow                     |
//! | GET    | `/contracts/:id`          | Escrow view (404 when unknown)     |
//! | POST   | `/contracts/:id/withdraw` | Claim with the committed scalar    |
//! | POST   | `/contracts/:id/refund`   | Return to sender after timelock    |
//! | GET    | `/balances/:identity`     | Ledger balance of an identity      |
//! | GET    | `/ws`                     | WebSocket stream of escrow events  |
//!
//! ## Error Bodies
//!
//! Every refused request answers `{"error": <message>, "code": <code>}`
//! where `code` is the stable identifier from `EscrowError::code`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use pointlock_contracts::{
    AuxPoints, ContractView, EscrowEngine, EscrowError, EscrowEvent, EscrowResult, EscrowStatus,
    OpenRequest,
};
use pointlock_protocol::config::ID_HASH_FUNCTION;
use pointlock_protocol::{ContractId, CurvePoint, Identity, InMemoryLedger, Payout, Scalar};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The escrow state machine.
    pub engine: Arc<EscrowEngine>,
    /// Ledger standing in for the external settlement system.
    pub ledger: Arc<InMemoryLedger>,
    /// Broadcast channel the engine's event sink publishes on.
    pub event_tx: broadcast::Sender<EscrowEvent>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/contracts", post(open_handler))
        .route("/contracts/:id", get(contract_handler))
        .route("/contracts/:id/withdraw", post(withdraw_handler))
        .route("/contracts/:id/refund", post(refund_handler))
        .route("/balances/:identity", get(balance_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// `POST /contracts` body.
#[derive(Debug, Deserialize, Serialize)]
pub struct OpenContractBody {
    /// Funding party, and the caller of this operation.
    pub sender: Identity,
    pub receiver: Identity,
    pub amount: u64,
    pub commitment: CurvePoint,
    pub c1: CurvePoint,
    pub c2: CurvePoint,
    /// Absolute expiry, Unix seconds.
    pub timelock: u64,
}

/// `POST /contracts/:id/withdraw` body.
#[derive(Debug, Deserialize, Serialize)]
pub struct WithdrawBody {
    /// Claimant; receives the second half.
    pub caller: Identity,
    /// The scalar `k` behind the commitment.
    pub secret: Scalar,
}

/// `POST /contracts/:id/refund` body.
#[derive(Debug, Deserialize, Serialize)]
pub struct RefundBody {
    pub caller: Identity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenedResponse {
    pub contract_id: ContractId,
}

/// Outcome of a withdraw or refund.
#[derive(Debug, Serialize, Deserialize)]
pub struct SettledResponse {
    pub contract_id: ContractId,
    pub status: EscrowStatus,
    pub payouts: Vec<Payout>,
    pub remainder: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub identity: Identity,
    pub balance: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An HTTP-facing error: status, stable code, human message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(code: &'static str, message: impl ToString) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.to_string(),
        }
    }

    fn internal(code: &'static str, message: impl ToString) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            message: message.to_string(),
        }
    }
}

impl From<EscrowError> for ApiError {
    fn from(err: EscrowError) -> Self {
        let status = match &err {
            EscrowError::InvalidAmount | EscrowError::InvalidTimelock { .. } => {
                StatusCode::BAD_REQUEST
            }
            EscrowError::ContractNotFound(_) => StatusCode::NOT_FOUND,
            EscrowError::SecretMismatch | EscrowError::NotSender { .. } => StatusCode::FORBIDDEN,
            EscrowError::DuplicateContract(_)
            | EscrowError::AlreadyFinalized(_)
            | EscrowError::TimelockExpired { .. }
            | EscrowError::TimelockNotYetPassed { .. } => StatusCode::CONFLICT,
            EscrowError::TransferFailed(_) => StatusCode::BAD_GATEWAY,
            EscrowError::RollbackFailed { .. }
            | EscrowError::Store(_)
            | EscrowError::Curve(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
            "code": self.code,
        });
        (self.status, Json(body)).into_response()
    }
}

fn parse_contract_id(raw: &str) -> Result<ContractId, ApiError> {
    ContractId::from_hex(raw).map_err(|e| ApiError::bad_request("invalid_contract_id", e))
}

/// Run one engine call off the async runtime, timing it and counting
/// rejections.
async fn run_engine<T, F>(
    state: &AppState,
    operation: &'static str,
    call: F,
) -> Result<T, ApiError>
where
    F: FnOnce(&EscrowEngine) -> EscrowResult<T> + Send + 'static,
    T: Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    let started = Instant::now();
    let joined = tokio::task::spawn_blocking(move || call(&engine)).await;
    state.metrics.observe_latency(operation, started);

    let result = joined.map_err(|e| ApiError::internal("engine_task_failed", e))?;
    result.map_err(|e| {
        state.metrics.record_rejection(operation, e.code());
        ApiError::from(e)
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "curve": state.engine.curve_name(),
        "contract_id_hash": ID_HASH_FUNCTION,
    }))
}

/// `POST /contracts`: open an escrow and lock its amount on the ledger.
async fn open_handler(
    State(state): State<AppState>,
    Json(body): Json<OpenContractBody>,
) -> Result<(StatusCode, Json<OpenedResponse>), ApiError> {
    let amount = body.amount;
    let sender = body.sender;
    let request = OpenRequest {
        receiver: body.receiver,
        amount,
        commitment: body.commitment,
        aux: AuxPoints::new(body.c1, body.c2),
        timelock: body.timelock,
    };

    let contract_id =
        run_engine(&state, "open", move |engine| engine.open(&sender, request)).await?;

    // The record is committed (and `opened` emitted) before the escrow
    // account is credited, since the ID is only known once `open` accepts
    // it. Funding a fresh ID cannot overflow. If it ever failed, the record
    // would stay unfunded and a retry would get `duplicate_contract`.
    if let Err(e) = state.ledger.fund_escrow(&contract_id, amount) {
        tracing::error!(contract = %contract_id, error = %e, "failed to fund escrow account");
        return Err(ApiError::internal("funding_failed", e));
    }
    state.metrics.contracts_opened_total.inc();

    Ok((StatusCode::CREATED, Json(OpenedResponse { contract_id })))
}

/// `GET /contracts/:id`: read-only view.
async fn contract_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContractView>, ApiError> {
    let id = parse_contract_id(&id)?;
    match run_engine(&state, "get_contract", move |engine| engine.get_contract(&id)).await? {
        Some(view) => Ok(Json(view)),
        None => Err(EscrowError::ContractNotFound(id).into()),
    }
}

/// `POST /contracts/:id/withdraw`: claim with the committed scalar.
async fn withdraw_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<WithdrawBody>,
) -> Result<Json<SettledResponse>, ApiError> {
    let id = parse_contract_id(&id)?;
    let plan = run_engine(&state, "withdraw", move |engine| {
        engine.withdraw(&body.caller, &id, &body.secret)
    })
    .await?;
    state.metrics.contracts_withdrawn_total.inc();

    Ok(Json(SettledResponse {
        contract_id: id,
        status: EscrowStatus::Withdrawn,
        payouts: plan.payouts,
        remainder: plan.remainder,
    }))
}

/// `POST /contracts/:id/refund`: return to sender after the timelock.
async fn refund_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RefundBody>,
) -> Result<Json<SettledResponse>, ApiError> {
    let id = parse_contract_id(&id)?;
    let plan = run_engine(&state, "refund", move |engine| engine.refund(&body.caller, &id)).await?;
    state.metrics.contracts_refunded_total.inc();

    Ok(Json(SettledResponse {
        contract_id: id,
        status: EscrowStatus::Refunded,
        payouts: plan.payouts,
        remainder: plan.remainder,
    }))
}

/// `GET /balances/:identity`: ledger balance. Unknown identities hold zero.
async fn balance_handler(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let identity =
        Identity::new(identity).map_err(|e| ApiError::bad_request("invalid_identity", e))?;
    let balance = state.ledger.balance(&identity);
    Ok(Json(BalanceResponse { identity, balance }))
}

/// `GET /ws`: WebSocket upgrade for live event streaming.
///
/// Clients receive JSON-encoded [`EscrowEvent`] messages for every opened,
/// withdrawn and refunded escrow. The connection is read-only from the
/// server's perspective; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to serialize ws event");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            // Client disconnected.
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "ws subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {
                        // Push-only channel.
                    }
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
