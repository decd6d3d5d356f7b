//! Request handlers for both path families.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::blockchain::{Credential, TransferRequest};
use crate::broadcast::{BroadcastOutcome, BroadcastPath};
use crate::relay::{ConfirmRequest, PreparedTransaction, RelayError, RelayResult, RelayService, TransactionState};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RelayService>,
}

/// Header carrying the caller's user id when the body has none.
const USER_ID_HEADERS: &[&str] = &["userid", "x-user-id"];

/// A string field that callers sometimes send as a JSON number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LooseString {
    Text(String),
    Number(serde_json::Number),
}

impl LooseString {
    fn into_string(self) -> String {
        match self {
            LooseString::Text(s) => s.trim().to_string(),
            LooseString::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PrepareBody {
    #[serde(rename = "UserID", alias = "user_id", default)]
    pub user_id: Option<LooseString>,
    #[serde(default)]
    pub blockchain: Option<String>,
    #[serde(default)]
    pub sender_address: String,
    #[serde(default)]
    pub recipient_address: String,
    #[serde(default)]
    pub amount: Option<LooseString>,
    #[serde(default)]
    pub smart_contract_address: Option<String>,
}

#[derive(Deserialize)]
pub struct ConfirmBody {
    #[serde(rename = "UserID", alias = "user_id", default)]
    pub user_id: Option<LooseString>,
    #[serde(default)]
    pub blockchain: Option<String>,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub private_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PrepareDetails {
    pub amount: String,
    pub blockchain: String,
    pub sender: String,
    pub recipient: String,
    pub smart_contract_address: Option<String>,
    pub nonce: u64,
    /// Wei, as a decimal string.
    pub gas_price: String,
    pub gas_limit: u64,
    pub estimated_fee: String,
    pub explorer_url: String,
}

#[derive(Debug, Serialize)]
pub struct PrepareResponse {
    pub success: bool,
    pub message: String,
    pub transaction_id: String,
    pub status: TransactionState,
    pub expires_at: u64,
    pub details: PrepareDetails,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub success: bool,
    pub message: String,
    pub transaction_id: String,
    pub transaction_hash: String,
    pub status: TransactionState,
    pub description: String,
    pub broadcast_path: BroadcastPath,
    pub explorer_url: String,
}

/// Public view of a record.
#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub transaction_id: String,
    pub blockchain: String,
    pub status: TransactionState,
    pub sender: String,
    pub recipient: String,
    pub amount: String,
    pub smart_contract_address: Option<String>,
    pub nonce: u64,
    pub transaction_hash: Option<String>,
    pub broadcast_path: Option<BroadcastPath>,
    pub error: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
    pub expires_at: u64,
    pub attempts: Vec<BroadcastOutcome>,
}

impl From<PreparedTransaction> for TransactionView {
    fn from(record: PreparedTransaction) -> Self {
        let nonce = record.nonce();
        Self {
            transaction_id: record.id,
            blockchain: record.request.chain,
            status: record.state,
            sender: record.request.sender,
            recipient: record.request.recipient,
            amount: record.request.amount,
            smart_contract_address: record.request.contract_address.filter(|c| !c.trim().is_empty()),
            nonce,
            transaction_hash: record.tx_hash.map(|h| h.to_string()),
            broadcast_path: record.broadcast_path,
            error: record.error,
            created_at: record.created_at,
            updated_at: record.updated_at,
            expires_at: record.expires_at,
            attempts: record.attempts,
        }
    }
}

fn decode<T>(body: Result<Json<T>, JsonRejection>) -> RelayResult<T> {
    body.map(|Json(b)| b)
        .map_err(|e| RelayError::InvalidRequest(format!("invalid request body: {}", e.body_text())))
}

fn user_id(body: Option<LooseString>, headers: &HeaderMap) -> Option<String> {
    body.map(LooseString::into_string)
        .or_else(|| {
            USER_ID_HEADERS
                .iter()
                .find_map(|h| headers.get(*h).and_then(|v| v.to_str().ok()))
                .map(|v| v.trim().to_string())
        })
        .filter(|u| !u.is_empty())
}

pub async fn prepare_for_chain(
    State(state): State<AppState>,
    Path(chain): Path<String>,
    headers: HeaderMap,
    body: Result<Json<PrepareBody>, JsonRejection>,
) -> RelayResult<Json<PrepareResponse>> {
    prepare(&state, Some(chain), &headers, decode(body)?).await
}

pub async fn prepare_generic(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PrepareBody>, JsonRejection>,
) -> RelayResult<Json<PrepareResponse>> {
    prepare(&state, None, &headers, decode(body)?).await
}

async fn prepare(
    state: &AppState,
    path_chain: Option<String>,
    headers: &HeaderMap,
    body: PrepareBody,
) -> RelayResult<Json<PrepareResponse>> {
    let chain = path_chain.or(body.blockchain).unwrap_or_default();
    let amount = body
        .amount
        .map(LooseString::into_string)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| RelayError::InvalidRequest("amount is required".into()))?;
    let request = TransferRequest {
        chain,
        sender: body.sender_address.trim().to_string(),
        recipient: body.recipient_address.trim().to_string(),
        amount,
        contract_address: body.smart_contract_address,
    };

    let receipt = state.service.prepare(request, user_id(body.user_id, headers)).await?;
    let record = receipt.record;
    let details = PrepareDetails {
        amount: record.request.amount.clone(),
        blockchain: record.request.chain.clone(),
        sender: record.request.sender.clone(),
        recipient: record.request.recipient.clone(),
        smart_contract_address: record.request.contract().map(String::from),
        nonce: record.nonce(),
        gas_price: record.descriptor.gas_price.to_string(),
        gas_limit: record.descriptor.gas_limit,
        estimated_fee: receipt.estimated_fee,
        explorer_url: receipt.explorer_url,
    };
    Ok(Json(PrepareResponse {
        success: true,
        message: "Transaction prepared; confirm to sign and send".into(),
        transaction_id: record.id,
        status: record.state,
        expires_at: record.expires_at,
        details,
    }))
}

pub async fn confirm_for_chain(
    State(state): State<AppState>,
    Path(chain): Path<String>,
    headers: HeaderMap,
    body: Result<Json<ConfirmBody>, JsonRejection>,
) -> RelayResult<Json<ConfirmResponse>> {
    confirm(&state, Some(chain), &headers, decode(body)?).await
}

pub async fn confirm_generic(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ConfirmBody>, JsonRejection>,
) -> RelayResult<Json<ConfirmResponse>> {
    confirm(&state, None, &headers, decode(body)?).await
}

async fn confirm(
    state: &AppState,
    path_chain: Option<String>,
    headers: &HeaderMap,
    body: ConfirmBody,
) -> RelayResult<Json<ConfirmResponse>> {
    let request = ConfirmRequest {
        transaction_id: body.transaction_id,
        user_id: user_id(body.user_id, headers),
        credential: body
            .private_key
            .filter(|k| !k.trim().is_empty())
            .map(Credential::new),
        chain: path_chain.or(body.blockchain),
    };

    let receipt = state.service.confirm(request).await?;
    let description = if receipt.disguised {
        format!("Accepted by the {} path despite a non-success status", receipt.path)
    } else {
        format!("Accepted by the {} path", receipt.path)
    };
    Ok(Json(ConfirmResponse {
        success: true,
        message: "Transaction sent successfully".into(),
        transaction_id: receipt.id,
        transaction_hash: receipt.tx_hash.to_string(),
        status: receipt.state,
        description,
        broadcast_path: receipt.path,
        explorer_url: receipt.explorer_url,
    }))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> RelayResult<Json<TransactionView>> {
    let caller = user_id(None, &headers);
    let record = state.service.get(id.trim(), caller.as_deref())?;
    Ok(Json(record.into()))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "chains": state.service.chains().names(),
        "records": state.service.store().len(),
    }))
}
