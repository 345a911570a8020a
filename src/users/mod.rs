use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod errors;
pub mod handlers;
pub mod memory;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod validation;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::public_routes())
        .merge(handlers::protected_routes())
}
