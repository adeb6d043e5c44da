use url::Url;

use super::state::{AuthorizeState, StateError};
use crate::services::application::ApplicationPolicy;

#[derive(Debug, thiserror::Error)]
pub enum AuthorizeUrlError {
    #[error("invalid authorize endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Builds the identity provider login URL for `application`.
pub fn build_authorize_url(
    endpoint: &str,
    application: &ApplicationPolicy,
    state: &AuthorizeState,
) -> Result<Url, AuthorizeUrlError> {
    let mut url = Url::parse(endpoint)?;
    url.query_pairs_mut()
        .append_pair("audience", &application.audience)
        .append_pair("scope", &application.scope)
        .append_pair("response_type", "code")
        .append_pair("client_id", &application.client_id)
        .append_pair("redirect_uri", &application.redirect_uri)
        .append_pair("state", &state.encode()?);
    Ok(url)
}
