//! # Wallet REST API
//!
//! Builds the axum router that exposes the wallet server's HTTP
//! interface. All endpoints share application state through axum's
//! `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                              | Description                    |
//! |--------|-----------------------------------|--------------------------------|
//! | GET    | `/health`                         | Liveness probe                 |
//! | GET    | `/status`                         | Server status summary          |
//! | GET    | `/wallets/:user_id`               | Wallet (lazily created)        |
//! | GET    | `/wallets/:user_id/transactions`  | History, newest first          |
//! | POST   | `/wallets/:user_id/transactions`  | Record an off-chain transaction|
//! | GET    | `/wallets/:user_id/cards`         | The user's cards               |
//! | POST   | `/wallets/:user_id/cards`         | Issue a card                   |
//! | PATCH  | `/cards/:id`                      | Freeze/unfreeze, limits        |
//! | GET    | `/cards/:id/balance`              | On-chain balances              |
//! | POST   | `/cards/:id/send`                 | Signed on-chain transfer       |

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use arca_core::chain::{Address, ChainError};
use arca_core::custody::CardPublic;
use arca_core::ledger::{Asset, LedgerError, TransactionMeta, TransactionRecord, TxKind, WalletRecord};
use arca_core::service::{CardBalances, SendOutcome, ServiceError, WalletService};
use arca_core::storage::WalletDb;
use arca_core::transfer::TransferError;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc` or sled handles.
#[derive(Clone)]
pub struct AppState {
    /// The server's reported version string.
    pub version: String,
    /// The wallet service. Every domain operation goes through it.
    pub service: Arc<WalletService>,
    /// Storage handle, used for the status counts only.
    pub db: WalletDb,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured API port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/wallets/:user_id", get(wallet_handler))
        .route(
            "/wallets/:user_id/transactions",
            get(list_transactions_handler).post(record_transaction_handler),
        )
        .route(
            "/wallets/:user_id/cards",
            get(list_cards_handler).post(create_card_handler),
        )
        .route("/cards/:id", patch(patch_card_handler))
        .route("/cards/:id/balance", get(card_balance_handler))
        .route("/cards/:id/send", post(send_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Server software version.
    pub version: String,
    /// Number of wallets in the store.
    pub wallets: usize,
    /// Number of ledger transaction records.
    pub transactions: usize,
    /// Number of issued cards.
    pub cards: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Request body for `POST /wallets/:user_id/transactions`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordTransactionRequest {
    /// Transaction kind: `topup`, `payment`, `receive`, `request`, `send`.
    pub kind: TxKind,
    /// Balance the transaction posts against.
    pub asset: Asset,
    /// Positive decimal amount, quantized to the asset's scale.
    pub amount: Decimal,
    /// The other party, as the client names them.
    #[serde(default)]
    pub counterparty: Option<String>,
    /// Free-form note.
    #[serde(default)]
    pub note: Option<String>,
    /// Client-side category label.
    #[serde(default)]
    pub category: Option<String>,
}

/// Request body for `POST /wallets/:user_id/cards`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCardRequest {
    /// Name embossed on the card.
    pub card_holder: String,
}

/// Request body for `PATCH /cards/:id`.
///
/// Card routes are not nested under the wallet, so the body carries the
/// requesting user for the ownership check.
#[derive(Debug, Serialize, Deserialize)]
pub struct PatchCardRequest {
    /// The requesting user. Must own the card.
    pub user_id: String,
    /// Freeze (`true`) or unfreeze (`false`) when present.
    #[serde(default)]
    pub frozen: Option<bool>,
    /// New daily spending limit when present. Stored, not enforced.
    #[serde(default)]
    pub daily_limit: Option<Decimal>,
    /// New monthly spending limit when present. Stored, not enforced.
    #[serde(default)]
    pub monthly_limit: Option<Decimal>,
}

/// Query string for `GET /cards/:id/balance`.
#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    /// The requesting user. Must own the card.
    pub user_id: String,
}

/// Request body for `POST /cards/:id/send`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SendRequest {
    /// The requesting user. Must own the card.
    pub user_id: String,
    /// Which chain asset to send: `native` or `token`.
    pub asset: Asset,
    /// Base58 recipient address.
    pub to_address: String,
    /// Positive decimal amount in display units.
    pub amount: Decimal,
    /// Client idempotency key. Retries with the same key replay the
    /// stored outcome instead of sending twice.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Generic error body returned by all endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

/// Wraps [`ServiceError`] so handlers can use `?` and still produce the
/// right HTTP status.
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

/// Maps a service error to its HTTP status code.
///
/// Client mistakes (bad amounts, bad addresses, chain refusals) are 400.
/// Ownership and frozen-card refusals are 403. Chain outages are 502 —
/// the request may be retried. Reconciliation gaps and internal faults
/// are 500.
fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::CardNotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::NotOwner(_) | ServiceError::CardFrozen => StatusCode::FORBIDDEN,
        ServiceError::Transfer(TransferError::Frozen) => StatusCode::FORBIDDEN,
        ServiceError::Transfer(
            TransferError::InvalidAddress(_)
            | TransferError::InvalidAmount(_)
            | TransferError::InsufficientOnChainFunds
            | TransferError::Rejected(_),
        ) => StatusCode::BAD_REQUEST,
        ServiceError::Transfer(TransferError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
        ServiceError::Transfer(TransferError::KeyUnavailable) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ServiceError::Chain(ChainError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
        ServiceError::Chain(_) => StatusCode::BAD_REQUEST,
        ServiceError::Ledger(LedgerError::InvalidAmount(_) | LedgerError::InsufficientFunds { .. }) => {
            StatusCode::BAD_REQUEST
        }
        ServiceError::Ledger(LedgerError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        ServiceError::ReconciliationGap { .. }
        | ServiceError::Vault(_)
        | ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the server is alive.
///
/// This is the liveness probe for orchestrators (k8s, systemd, etc.).
/// It intentionally does not touch storage or the chain — that belongs
/// in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns a server status summary with store counts.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resp = StatusResponse {
        version: state.version.clone(),
        wallets: state.db.wallet_count(),
        transactions: state.db.transaction_count(),
        cards: state.db.card_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp)
}

/// `GET /wallets/:user_id` — the user's wallet, created at zero balances
/// on first sight.
async fn wallet_handler(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<WalletRecord>, ApiError> {
    Ok(Json(state.service.wallet(&user_id)?))
}

/// `GET /wallets/:user_id/transactions` — history, newest first.
async fn list_transactions_handler(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<TransactionRecord>>, ApiError> {
    Ok(Json(state.service.transactions(&user_id)?))
}

/// `POST /wallets/:user_id/transactions` — records an off-chain
/// transaction (topups, fiat payments, requests) against the ledger.
async fn record_transaction_handler(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<RecordTransactionRequest>,
) -> Result<(StatusCode, Json<TransactionRecord>), ApiError> {
    let meta = TransactionMeta {
        counterparty: req.counterparty,
        sender_address: None,
        note: req.note,
        category: req.category,
    };
    let record = state
        .service
        .record_off_chain(&user_id, req.kind, req.asset, req.amount, meta)?;

    state.metrics.transactions_recorded_total.inc();
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /wallets/:user_id/cards` — the user's cards, in issue order.
async fn list_cards_handler(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<CardPublic>>, ApiError> {
    Ok(Json(state.service.cards(&user_id)?))
}

/// `POST /wallets/:user_id/cards` — issues a card with a fresh sealed
/// keypair. The response never contains key material.
async fn create_card_handler(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<CreateCardRequest>,
) -> Result<(StatusCode, Json<CardPublic>), ApiError> {
    let card = state.service.create_card(&user_id, &req.card_holder)?;
    state.metrics.cards_issued_total.inc();
    Ok((StatusCode::CREATED, Json(card)))
}

/// `PATCH /cards/:id` — freeze/unfreeze and/or update stored limits.
///
/// Applies the freeze change first, then the limits, and returns the
/// card's final state.
async fn patch_card_handler(
    Path(card_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<PatchCardRequest>,
) -> Result<Json<CardPublic>, ApiError> {
    let mut card = None;
    if let Some(frozen) = req.frozen {
        card = Some(state.service.set_card_frozen(&req.user_id, &card_id, frozen)?);
    }
    if req.daily_limit.is_some() || req.monthly_limit.is_some() {
        card = Some(state.service.update_card_limits(
            &req.user_id,
            &card_id,
            req.daily_limit,
            req.monthly_limit,
        )?);
    }

    // A body with neither field is a no-op read.
    let card = match card {
        Some(card) => card,
        None => state
            .service
            .cards(&req.user_id)?
            .into_iter()
            .find(|c| c.id == card_id)
            .ok_or(ServiceError::CardNotFound(card_id))?,
    };
    Ok(Json(card))
}

/// `GET /cards/:id/balance?user_id=` — on-chain balances of a card.
async fn card_balance_handler(
    Path(card_id): Path<Uuid>,
    Query(query): Query<BalanceQuery>,
    State(state): State<AppState>,
) -> Result<Json<CardBalances>, ApiError> {
    let balances = state.service.card_balances(&query.user_id, &card_id).await?;
    Ok(Json(balances))
}

/// `POST /cards/:id/send` — signed on-chain transfer from a card.
///
/// The chain is the source of truth: the ledger record exists only if
/// the chain confirmed. 502 means the chain was unreachable and the
/// client may retry — ideally with an idempotency key.
async fn send_handler(
    Path(card_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendOutcome>, ApiError> {
    let to_address = Address::new(&req.to_address);
    let started = std::time::Instant::now();

    let result = state
        .service
        .send_on_chain(
            &req.user_id,
            &card_id,
            req.asset,
            &to_address,
            req.amount,
            req.idempotency_key.as_deref(),
        )
        .await;

    match &result {
        Ok(outcome) if outcome.replayed => {
            state.metrics.idempotent_replays_total.inc();
        }
        Ok(_) => {
            state.metrics.chain_sends_total.inc();
            state.metrics.transactions_recorded_total.inc();
            state
                .metrics
                .chain_send_latency_seconds
                .observe(started.elapsed().as_secs_f64());
        }
        Err(ServiceError::ReconciliationGap { .. }) => {
            // The chain moved money even though the call failed.
            state.metrics.chain_sends_total.inc();
            state.metrics.reconciliation_gaps_total.inc();
        }
        Err(_) => {
            state.metrics.chain_send_failures_total.inc();
        }
    }

    Ok(Json(result?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
