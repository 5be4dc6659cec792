//! HTTP routes for authentication, dialogs, analytics, deletion and stats.

use super::client_mgr::{LogoutOutcome, StatusSummary};
use super::server::GatewayState;
use super::tenant::Tenant;
use crate::analytics::{self, AnalyticsResult};
use crate::deletion::{self, DeletionOutcome};
use crate::dialogs::{self, DialogRecord};
use crate::error::{GatewayError, Result};
use crate::items::{lenient_id, MessageItem};
use crate::platform::Credentials;
use crate::stats::{self, ChannelStatistics};
use axum::{
    extract::{rejection::QueryRejection, FromRequest, Query, Request, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// JSON body extractor whose rejection is a [`GatewayError`]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = GatewayError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    #[serde(default, deserialize_with = "lenient_id")]
    pub api_id: Option<String>,
    #[serde(default)]
    pub api_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CodeResponse {
    pub phone_code_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub phone_code_hash: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub chat_id: String,
    pub message_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub messages: Vec<MessageItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRequest {
    #[serde(default, deserialize_with = "lenient_id")]
    pub channel_id: Option<String>,
}

/// Create the gateway routes
pub fn routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/", get(status_handler))
        .route("/auth/setup", post(setup_handler))
        .route("/auth/request-code", post(request_code_handler))
        .route("/auth/sign-in", post(sign_in_handler))
        .route("/auth/me", get(me_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/dialogs", get(dialogs_handler))
        .route("/analytics", get(analytics_handler))
        .route("/analytics/batch", post(analytics_batch_handler))
        .route("/messages/delete", post(delete_handler))
        .route("/channel-stats", post(channel_stats_handler))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// GET / - Service status, with account details for a known tenant
async fn status_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Json<StatusSummary> {
    let tenant = Tenant::from_headers(&headers).ok();
    Json(state.clients.status(tenant.as_ref().map(|t| t.id.as_str())).await)
}

/// POST /auth/setup - Store credentials and bring the client up
async fn setup_handler(
    State(state): State<Arc<GatewayState>>,
    tenant: Tenant,
    JsonBody(request): JsonBody<SetupRequest>,
) -> Result<Json<Value>> {
    let credentials = Credentials::parse(request.api_id.as_deref(), request.api_hash.as_deref())
        .ok_or_else(|| GatewayError::BadRequest("Missing api_id or api_hash".to_string()))?
        .map_err(GatewayError::BadRequest)?;

    state
        .clients
        .acquire(&tenant.id, Some(credentials))
        .await
        .map_err(|e| match e {
            GatewayError::Configuration(_) | GatewayError::BadRequest(_) => e,
            other => GatewayError::Internal(format!("Failed to initialize client: {other}")),
        })?;

    info!(tenant = %tenant.id, "credentials updated");
    Ok(Json(json!({
        "status": "success",
        "message": "Credentials updated and client initialized",
    })))
}

/// POST /auth/request-code - Send a login code to a phone number
async fn request_code_handler(
    State(state): State<Arc<GatewayState>>,
    tenant: Tenant,
    JsonBody(request): JsonBody<CodeRequest>,
) -> Result<Json<CodeResponse>> {
    let client = state.clients.acquire(&tenant.id, tenant.credentials).await?;

    let phone = non_empty(request.phone)
        .ok_or_else(|| GatewayError::BadRequest("Phone number required".to_string()))?;

    let phone_code_hash = client
        .send_code(&phone)
        .await
        .map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    info!(tenant = %tenant.id, "login code requested");
    Ok(Json(CodeResponse { phone_code_hash }))
}

/// POST /auth/sign-in - Complete login with the received code
async fn sign_in_handler(
    State(state): State<Arc<GatewayState>>,
    tenant: Tenant,
    JsonBody(request): JsonBody<SignInRequest>,
) -> Result<Json<Value>> {
    let client = state.clients.acquire(&tenant.id, tenant.credentials).await?;

    let (Some(phone), Some(code), Some(hash)) = (
        non_empty(request.phone),
        non_empty(request.code),
        non_empty(request.phone_code_hash),
    ) else {
        return Err(GatewayError::BadRequest(
            "Missing phone, code, or hash".to_string(),
        ));
    };

    let account = client
        .sign_in(&phone, &code, &hash)
        .await
        .map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    info!(tenant = %tenant.id, account = account.id, "signed in");
    Ok(Json(json!({
        "status": "success",
        "user": { "id": account.id, "username": account.username },
    })))
}

/// GET /auth/me - Current account
async fn me_handler(
    State(state): State<Arc<GatewayState>>,
    tenant: Tenant,
) -> Result<Json<MeResponse>> {
    let client = state
        .clients
        .acquire_authorized(&tenant.id, tenant.credentials)
        .await?;

    let me = client.get_me().await?.ok_or_else(GatewayError::unauthorized)?;
    Ok(Json(MeResponse {
        id: me.id.to_string(),
        username: me.username,
        first_name: me.first_name,
    }))
}

/// POST /auth/logout - Log out and drop the session
async fn logout_handler(
    State(state): State<Arc<GatewayState>>,
    tenant: Tenant,
) -> Result<Json<Value>> {
    Ok(Json(match state.clients.logout(&tenant.id).await? {
        LogoutOutcome::LoggedOut => json!({"status": "success", "message": "Logged out"}),
        LogoutOutcome::Ignored => json!({"status": "ignored", "detail": "No client"}),
    }))
}

/// GET /dialogs - Conversations the tenant can post to
async fn dialogs_handler(
    State(state): State<Arc<GatewayState>>,
    tenant: Tenant,
) -> Result<Json<Vec<DialogRecord>>> {
    let client = state
        .clients
        .acquire_authorized(&tenant.id, tenant.credentials)
        .await?;

    let raw = client.dialogs().await?;
    Ok(Json(dialogs::classify(&raw)))
}

/// GET /analytics - Counts for one message
async fn analytics_handler(
    State(state): State<Arc<GatewayState>>,
    tenant: Tenant,
    query: std::result::Result<Query<AnalyticsQuery>, QueryRejection>,
) -> Result<Json<AnalyticsResult>> {
    let Query(query) = query.map_err(|e| GatewayError::BadRequest(e.body_text()))?;

    let client = state
        .clients
        .acquire_authorized(&tenant.id, tenant.credentials)
        .await?;

    let result = analytics::analyze_one(client.as_ref(), &query.chat_id, query.message_id).await?;
    Ok(Json(result))
}

/// POST /analytics/batch - Counts for many messages, keyed by message ID
async fn analytics_batch_handler(
    State(state): State<Arc<GatewayState>>,
    tenant: Tenant,
    JsonBody(items): JsonBody<Vec<MessageItem>>,
) -> Result<Json<BTreeMap<String, AnalyticsResult>>> {
    let client = state
        .clients
        .acquire_authorized(&tenant.id, tenant.credentials)
        .await?;

    Ok(Json(analytics::analyze_batch(client.as_ref(), &items).await))
}

/// POST /messages/delete - Delete messages for both sides
async fn delete_handler(
    State(state): State<Arc<GatewayState>>,
    tenant: Tenant,
    JsonBody(request): JsonBody<DeleteRequest>,
) -> Result<Json<DeletionOutcome>> {
    let client = state
        .clients
        .acquire_authorized(&tenant.id, tenant.credentials)
        .await?;

    let outcome = deletion::delete_batch(client.as_ref(), &request.messages).await?;
    info!(
        tenant = %tenant.id,
        success = outcome.success_count,
        failed = outcome.failed_count,
        "deletion finished"
    );
    Ok(Json(outcome))
}

/// POST /channel-stats - Growth and follower statistics
async fn channel_stats_handler(
    State(state): State<Arc<GatewayState>>,
    tenant: Tenant,
    JsonBody(request): JsonBody<StatsRequest>,
) -> Result<Json<ChannelStatistics>> {
    let client = state
        .clients
        .acquire_authorized(&tenant.id, tenant.credentials)
        .await?;

    let channel_id = non_empty(request.channel_id)
        .ok_or_else(|| GatewayError::BadRequest("Channel ID required".to_string()))?;

    Ok(Json(stats::get_stats(client.as_ref(), &channel_id).await?))
}
