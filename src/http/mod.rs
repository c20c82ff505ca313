use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod routes;

pub use auth::{AdminToken, AuthUser, MaybeAuthUser};
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health())
        .merge(routes::reports())
        .merge(routes::matches())
        .merge(routes::notifications())
        .merge(routes::admin())
        .with_state(state)
}
