//! HA request endpoints

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, response::Json, routing::get, Router};
use log::info;

use appnet_ha::{HaRequest, HaStatus};

use crate::caller;
use crate::context::AppContext;
use crate::error::{ok, ApiResult};

pub struct HaAPI;

impl HaAPI {
    pub fn router() -> Router<Arc<AppContext>> {
        Router::new().route("/api/v1/ha", get(ha_status).post(ha_request))
    }
}

async fn ha_status(State(context): State<Arc<AppContext>>) -> ApiResult<HaStatus> {
    ok(context.ha.status().await?)
}

/// Request types: 1 create, 2 disable, 3 sync to backup
async fn ha_request(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(request): Json<HaRequest>,
) -> ApiResult<HaStatus> {
    let caller = caller(&headers);
    info!("{} sent HA request type {}", caller, request.request_type);
    ok(context.ha.handle(request, &caller).await?)
}
