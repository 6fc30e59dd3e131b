//! Static route, BGP and OSPF endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Json,
    routing::get,
    Router,
};

use appnet_types::{BgpConfig, OspfConfig, RouteKey, RoutingDocument, StaticRoute};

use crate::caller;
use crate::context::AppContext;
use crate::error::{ok, ApiResult};

pub struct RoutingAPI;

impl RoutingAPI {
    pub fn router() -> Router<Arc<AppContext>> {
        Router::new()
            .route("/api/v1/routing", get(get_routing))
            .route(
                "/api/v1/routing/static",
                get(list_static_routes)
                    .post(add_static_route)
                    .put(update_static_route)
                    .delete(delete_static_route),
            )
            .route("/api/v1/routing/static/route", get(get_static_route))
            .route("/api/v1/routing/bgp", get(get_bgp).put(set_bgp))
            .route("/api/v1/routing/ospf", get(get_ospf).put(set_ospf))
    }
}

async fn get_routing(State(context): State<Arc<AppContext>>) -> ApiResult<RoutingDocument> {
    ok(context.routing.routing().await?)
}

async fn list_static_routes(State(context): State<Arc<AppContext>>) -> ApiResult<Vec<StaticRoute>> {
    ok(context.routing.list_static_routes().await?)
}

/// `?interface=eth0&destination=10.20.0.0&mask=16`
async fn get_static_route(
    State(context): State<Arc<AppContext>>,
    Query(key): Query<RouteKey>,
) -> ApiResult<StaticRoute> {
    ok(context.routing.static_route(&key).await?)
}

async fn add_static_route(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(route): Json<StaticRoute>,
) -> ApiResult<StaticRoute> {
    ok(context
        .routing
        .add_static_route(route, &caller(&headers))
        .await?)
}

async fn update_static_route(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(route): Json<StaticRoute>,
) -> ApiResult<StaticRoute> {
    ok(context
        .routing
        .update_static_route(route, &caller(&headers))
        .await?)
}

async fn delete_static_route(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    Query(key): Query<RouteKey>,
) -> ApiResult<()> {
    ok(context
        .routing
        .delete_static_route(&key, &caller(&headers))
        .await?)
}

async fn get_bgp(State(context): State<Arc<AppContext>>) -> ApiResult<Option<BgpConfig>> {
    ok(context.routing.bgp().await?)
}

/// A `null` body removes the BGP instance
async fn set_bgp(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(bgp): Json<Option<BgpConfig>>,
) -> ApiResult<Option<BgpConfig>> {
    context.routing.set_bgp(bgp, &caller(&headers)).await?;
    ok(context.routing.bgp().await?)
}

async fn get_ospf(State(context): State<Arc<AppContext>>) -> ApiResult<Option<OspfConfig>> {
    ok(context.routing.ospf().await?)
}

async fn set_ospf(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(ospf): Json<Option<OspfConfig>>,
) -> ApiResult<Option<OspfConfig>> {
    context.routing.set_ospf(ospf, &caller(&headers)).await?;
    ok(context.routing.ospf().await?)
}
