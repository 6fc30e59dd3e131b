//! Server side of the HA peer protocol
//!
//! Calls arrive from the other node with the shared HA password as a bearer
//! token.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    response::Json,
    routing::{get, post, put},
    Router,
};
use log::warn;

use appnet_config::BackupManifest;
use appnet_ha::peer::{
    ADOPT_ENDPOINT, BACKUP_ENDPOINT, DISABLE_ENDPOINT, IDENTITY_ENDPOINT, INTERFACES_ENDPOINT,
    LAST_SYNC_ENDPOINT,
};
use appnet_ha::{HaStatus, LastSync, PEER_API_PREFIX};
use appnet_types::{DeviceIdentity, HaConfig, InterfacesDocument};

use crate::context::AppContext;
use crate::error::{ok, ApiError, ApiResult};

const PEER_CALLER: &str = "ha-peer";

pub struct PeerAPI;

impl PeerAPI {
    pub fn router() -> Router<Arc<AppContext>> {
        Router::new()
            .route(&endpoint(DISABLE_ENDPOINT), post(peer_disable))
            .route(&endpoint(IDENTITY_ENDPOINT), get(peer_identity))
            .route(&endpoint(BACKUP_ENDPOINT), post(peer_backup))
            .route(&endpoint(INTERFACES_ENDPOINT), put(peer_interfaces))
            .route(&endpoint(ADOPT_ENDPOINT), post(peer_adopt))
            .route(&endpoint(LAST_SYNC_ENDPOINT), put(peer_last_sync))
    }
}

fn endpoint(name: &str) -> String {
    format!("{}{}", PEER_API_PREFIX, name)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn authorize(context: &AppContext, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    if context.ha.verify_peer_token(token).await? {
        Ok(())
    } else {
        warn!("Rejected HA peer call with a wrong token");
        Err(ApiError::Unauthorized)
    }
}

async fn peer_disable(State(context): State<Arc<AppContext>>, headers: HeaderMap) -> ApiResult<()> {
    authorize(&context, &headers).await?;
    ok(context.ha.peer_disable(PEER_CALLER).await?)
}

async fn peer_identity(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> ApiResult<DeviceIdentity> {
    authorize(&context, &headers).await?;
    ok(context.ha.peer_identity())
}

async fn peer_backup(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> ApiResult<BackupManifest> {
    authorize(&context, &headers).await?;
    ok(context.ha.peer_backup(PEER_CALLER).await?)
}

async fn peer_interfaces(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(document): Json<InterfacesDocument>,
) -> ApiResult<()> {
    authorize(&context, &headers).await?;
    ok(context
        .ha
        .peer_push_interfaces(document, PEER_CALLER)
        .await?)
}

async fn peer_adopt(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(config): Json<HaConfig>,
) -> ApiResult<HaStatus> {
    authorize(&context, &headers).await?;
    ok(context.ha.peer_adopt(config, PEER_CALLER).await?)
}

async fn peer_last_sync(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(body): Json<LastSync>,
) -> ApiResult<()> {
    authorize(&context, &headers).await?;
    ok(context
        .ha
        .peer_last_sync(body.last_synced, PEER_CALLER)
        .await?)
}
