//! Appliance network management API
//!
//! REST endpoints for links, composite link CRUD, HA and routing, plus the
//! peer side of the HA protocol. Every response uses the
//! `{status_code, data|error}` envelope.

pub mod context;
pub mod error;
pub mod ha;
pub mod links;
pub mod peer;
pub mod routing;
pub mod settings;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use context::AppContext;
pub use error::{ApiError, ApiResult};
pub use ha::HaAPI;
pub use links::LinksAPI;
pub use peer::PeerAPI;
pub use routing::RoutingAPI;
pub use settings::AppSettings;

/// Header naming who issued a management request, recorded in lock info
/// and logs.
pub const CALLER_HEADER: &str = "x-appnet-caller";

pub fn caller(headers: &HeaderMap) -> String {
    headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("api")
        .to_string()
}

/// Full application router
pub fn app(context: Arc<AppContext>) -> Router {
    Router::new()
        .merge(LinksAPI::router())
        .merge(HaAPI::router())
        .merge(RoutingAPI::router())
        .merge(PeerAPI::router())
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}
