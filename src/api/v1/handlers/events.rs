/*
 * Responsibility
 * - GET /events?page=&size=
 * - 直近の認可判定を新しい順に返す (admin:forwardauth 権限が必要)
 */
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::api::v1::extractors::AuthCtxExtractor;
use crate::error::AppError;
use crate::services::authenticate::AuthenticationEvent;
use crate::services::events::EventPage;
use crate::state::AppState;

pub const ADMIN_PERMISSION: &str = "admin:forwardauth";
const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EventsParams {
    pub page: usize,
    pub size: usize,
}

impl Default for EventsParams {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

pub async fn events(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Query(params): Query<EventsParams>,
) -> Result<Json<EventPage>, AppError> {
    let user = match ctx.authentication.event {
        AuthenticationEvent::Authenticated(user) => user,
        AuthenticationEvent::Anonymous { reason } | AuthenticationEvent::Error { reason } => {
            return Err(AppError::Unauthorized(reason));
        }
    };

    let permitted = user
        .access_token
        .permissions()
        .is_some_and(|permissions| permissions.iter().any(|p| p == ADMIN_PERMISSION));
    if !permitted {
        tracing::info!(subject = %user.subject, "event listing refused");
        return Err(AppError::Forbidden(format!(
            "Missing permissions '{ADMIN_PERMISSION}'"
        )));
    }

    let size = params.size.clamp(1, MAX_PAGE_SIZE);
    Ok(Json(state.forward_auth.events().page(params.page, size)))
}
