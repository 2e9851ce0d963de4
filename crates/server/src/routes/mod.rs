pub mod health;
pub mod ratings;
pub mod session_ws;

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db::profiles::ProfileStore;

/// Remote rating storage, absent when no database is configured.
#[derive(Clone, Default)]
pub struct RemoteProfiles(pub Option<Arc<dyn ProfileStore>>);

pub fn app(config: Config, remote: RemoteProfiles) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/ratings", get(ratings::get_ratings))
        .route("/ws/session", get(session_ws::ws_handler))
        .layer(Extension(config))
        .layer(Extension(remote))
        .layer(cors)
}
