use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::post,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::TokenService;
use crate::config::Config;
use crate::db::Store;

pub mod auth;
mod error;
mod types;
pub mod users;

pub use error::ApiError;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,

    pub store: Store,

    pub tokens: TokenService,
}

impl AppState {
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }
}

pub async fn create_app_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let tokens = TokenService::new(&config.auth);

    Ok(Arc::new(AppState {
        config,
        store,
        tokens,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config.server.cors_allowed_origins.clone();

    let protected_routes = create_protected_router(state.clone());

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/register", post(users::register))
        .route("/auth", post(auth::authenticate))
        .route("/token", post(auth::login))
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

/// Routes that require a verified bearer token. Handlers that also need
/// the claims (admin-create, delete) decode them from the header again;
/// decoding is pure and the middleware has already checked existence.
fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(users::list_users))
        .route("/users/create", post(users::create_user))
        .route("/users/delete", post(users::delete_user))
        .route("/users/{id}", post(users::get_user))
        .route("/access", post(auth::check_access))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
