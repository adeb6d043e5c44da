/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - /health は素通し、/authorize /userinfo /events には認証 middleware を掛ける
 */
use axum::{Router, routing::get};

use crate::middleware;
use crate::state::AppState;

use crate::api::v1::handlers::{
    authorize::authorize, events::events, health::health, userinfo::userinfo,
};

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/authorize", get(authorize))
        .route("/userinfo", get(userinfo))
        .route("/events", get(events));
    let protected = middleware::auth::access::apply(protected, state);

    Router::new()
        .route("/health", get(health))
        .merge(protected)
}
