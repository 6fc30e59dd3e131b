//! Link endpoints: live links, physical ports and VLAN/bridge/bond CRUD

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
    routing::{get, post, put},
    Router,
};
use log::debug;
use serde::Deserialize;

use appnet_apply::PhysicalUpdate;
use appnet_core::bond::{BondRequest, BondUpdate, BondView};
use appnet_core::bridge::{BridgeRequest, BridgeUpdate, BridgeView};
use appnet_core::registry::PhysicalInterface;
use appnet_core::vlan::{VlanRequest, VlanUpdate, VlanView};
use appnet_core::{IpAssignment, Link, LinkFilter, LinkKind, NetworkError};

use crate::caller;
use crate::context::AppContext;
use crate::error::{ok, ApiResult};

/// Query parameters for link listing
#[derive(Debug, Deserialize)]
pub struct LinkListQuery {
    pub kind: Option<LinkKind>,
}

pub struct LinksAPI;

impl LinksAPI {
    pub fn router() -> Router<Arc<AppContext>> {
        Router::new()
            .route("/api/v1/links", get(list_links))
            .route("/api/v1/links/:name", get(get_link))
            .route("/api/v1/physical", get(list_physical))
            .route("/api/v1/physical/:name", put(update_physical))
            .route(
                "/api/v1/physical/:name/aliases",
                post(add_alias).delete(delete_alias),
            )
            .route("/api/v1/vlans", get(list_vlans).post(create_vlan))
            .route(
                "/api/v1/vlans/:name",
                get(get_vlan).put(update_vlan).delete(delete_vlan),
            )
            .route("/api/v1/bridges", get(list_bridges).post(create_bridge))
            .route(
                "/api/v1/bridges/:name",
                get(get_bridge).put(update_bridge).delete(delete_bridge),
            )
            .route("/api/v1/bonds", get(list_bonds).post(create_bond))
            .route(
                "/api/v1/bonds/:name",
                get(get_bond).put(update_bond).delete(delete_bond),
            )
    }
}

fn single<T>(views: Vec<T>, kind: &'static str, name: &str) -> Result<T, NetworkError> {
    views
        .into_iter()
        .next()
        .ok_or_else(|| NetworkError::not_found(kind, name))
}

async fn list_links(
    State(context): State<Arc<AppContext>>,
    Query(query): Query<LinkListQuery>,
) -> ApiResult<Vec<Link>> {
    let filter = match query.kind {
        Some(kind) => LinkFilter::kind(kind),
        None => LinkFilter::all(),
    };
    ok(context.links.registry.list_links(&filter).await?)
}

async fn get_link(
    State(context): State<Arc<AppContext>>,
    Path(name): Path<String>,
) -> ApiResult<Link> {
    ok(context.links.registry.link(&name).await?)
}

async fn list_physical(State(context): State<Arc<AppContext>>) -> ApiResult<Vec<PhysicalInterface>> {
    ok(context.physical.list().await?)
}

async fn update_physical(
    State(context): State<Arc<AppContext>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(update): Json<PhysicalUpdate>,
) -> ApiResult<Link> {
    ok(context.physical.update(&name, update, &caller(&headers)).await?)
}

async fn add_alias(
    State(context): State<Arc<AppContext>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(alias): Json<IpAssignment>,
) -> ApiResult<Link> {
    ok(context.physical.add_alias(&name, alias, &caller(&headers)).await?)
}

async fn delete_alias(
    State(context): State<Arc<AppContext>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(alias): Json<IpAssignment>,
) -> ApiResult<Link> {
    ok(context.physical.delete_alias(&name, alias, &caller(&headers)).await?)
}

// VLANs

async fn list_vlans(State(context): State<Arc<AppContext>>) -> ApiResult<Vec<VlanView>> {
    ok(context.vlans.list(None).await?)
}

async fn get_vlan(
    State(context): State<Arc<AppContext>>,
    Path(name): Path<String>,
) -> ApiResult<VlanView> {
    ok(single(context.vlans.list(Some(&name)).await?, "vlan", &name)?)
}

async fn create_vlan(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(request): Json<VlanRequest>,
) -> ApiResult<VlanView> {
    debug!("Creating VLAN {} on {}", request.name, request.parent);
    ok(context.vlans.create(request, &caller(&headers)).await?)
}

async fn update_vlan(
    State(context): State<Arc<AppContext>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(update): Json<VlanUpdate>,
) -> ApiResult<VlanView> {
    ok(context.vlans.update(&name, update, &caller(&headers)).await?)
}

async fn delete_vlan(
    State(context): State<Arc<AppContext>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> ApiResult<()> {
    ok(context.vlans.delete(&name, &caller(&headers)).await?)
}

// Bridges

async fn list_bridges(State(context): State<Arc<AppContext>>) -> ApiResult<Vec<BridgeView>> {
    ok(context.bridges.list(None).await?)
}

async fn get_bridge(
    State(context): State<Arc<AppContext>>,
    Path(name): Path<String>,
) -> ApiResult<BridgeView> {
    ok(single(context.bridges.list(Some(&name)).await?, "bridge", &name)?)
}

async fn create_bridge(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(request): Json<BridgeRequest>,
) -> ApiResult<BridgeView> {
    debug!("Creating bridge {} with ports {:?}", request.name, request.ports);
    ok(context.bridges.create(request, &caller(&headers)).await?)
}

async fn update_bridge(
    State(context): State<Arc<AppContext>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(update): Json<BridgeUpdate>,
) -> ApiResult<BridgeView> {
    ok(context.bridges.update(&name, update, &caller(&headers)).await?)
}

async fn delete_bridge(
    State(context): State<Arc<AppContext>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> ApiResult<()> {
    ok(context.bridges.delete(&name, &caller(&headers)).await?)
}

// Bonds

async fn list_bonds(State(context): State<Arc<AppContext>>) -> ApiResult<Vec<BondView>> {
    ok(context.bonds.list(None).await?)
}

async fn get_bond(
    State(context): State<Arc<AppContext>>,
    Path(name): Path<String>,
) -> ApiResult<BondView> {
    ok(single(context.bonds.list(Some(&name)).await?, "bond", &name)?)
}

async fn create_bond(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(request): Json<BondRequest>,
) -> ApiResult<BondView> {
    debug!("Creating bond {} with slaves {:?}", request.name, request.slaves);
    ok(context.bonds.create(request, &caller(&headers)).await?)
}

async fn update_bond(
    State(context): State<Arc<AppContext>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(update): Json<BondUpdate>,
) -> ApiResult<BondView> {
    ok(context.bonds.update(&name, update, &caller(&headers)).await?)
}

async fn delete_bond(
    State(context): State<Arc<AppContext>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> ApiResult<()> {
    ok(context.bonds.delete(&name, &caller(&headers)).await?)
}
