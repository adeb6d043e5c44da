/*
 * Responsibility
 * - 1 リクエスト分の判定をまとめる: token 検証 → 認証 → 認可
 * - NeedRedirect のときの nonce 生成と authorize URL 組み立て
 * - 認可結果を EventStore に記録する
 *
 * Notes
 * - HTTP には依存しない (header / cookie の読み書きは api 層)
 */
use std::time::Duration;

use url::Url;

use crate::services::application::{ApplicationPolicy, ForwardAuthSettings};
use crate::services::authenticate::{AuthenticationEvent, authenticate};
use crate::services::authorize::{
    AuthorizationState, AuthorizeState, Nonce, RequestedUrl, authorize, build_authorize_url,
};
use crate::services::events::EventStore;
use crate::services::token::Token;
use crate::services::user::AuthenticatedUser;
use crate::services::verify::TokenVerifier;

const ACCESS_DENIED: &str = "Access denied.";

/// Authentication outcome plus the verified tokens it was computed from.
#[derive(Debug, Clone)]
pub struct Authentication {
    pub event: AuthenticationEvent,
    access_token: Token,
    id_token: Token,
}

impl Authentication {
    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match &self.event {
            AuthenticationEvent::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// Tokens handed to the authorization machine. Anonymous callers carry no usable token.
    fn tokens(&self) -> (Token, Token) {
        match &self.event {
            AuthenticationEvent::Anonymous { reason } => {
                let reason = format!("anonymous: {reason}");
                (Token::Invalid(reason.clone()), Token::Invalid(reason))
            }
            _ => (self.access_token.clone(), self.id_token.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizeEvent {
    AccessGranted {
        user: Option<AuthenticatedUser>,
    },
    AccessDenied {
        reason: String,
    },
    NeedRedirect {
        authorize_url: Url,
        nonce: Nonce,
        cookie_domain: String,
        max_age: Duration,
    },
    Error {
        reason: String,
    },
}

impl AuthorizeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccessGranted { .. } => "AccessGranted",
            Self::AccessDenied { .. } => "AccessDenied",
            Self::NeedRedirect { .. } => "NeedRedirect",
            Self::Error { .. } => "Error",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::AccessDenied { reason } | Self::Error { reason } => Some(reason.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForwardAuthService {
    verifier: TokenVerifier,
    settings: ForwardAuthSettings,
    authorize_endpoint: String,
    nonce_max_age: Duration,
    events: EventStore,
}

impl ForwardAuthService {
    pub fn new(
        verifier: TokenVerifier,
        settings: ForwardAuthSettings,
        authorize_endpoint: impl Into<String>,
        nonce_max_age: Duration,
        events: EventStore,
    ) -> Self {
        Self {
            verifier,
            settings,
            authorize_endpoint: authorize_endpoint.into(),
            nonce_max_age,
            events,
        }
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    pub fn application(&self, host: Option<&str>) -> ApplicationPolicy {
        self.settings.find_application_or_default(host)
    }

    /// Verifies the raw credentials for the application serving `host` and classifies the caller.
    pub async fn authenticate(
        &self,
        raw_access_token: Option<&str>,
        raw_id_token: Option<&str>,
        host: Option<&str>,
    ) -> Authentication {
        let app = self.application(host);
        let access_token = self.verifier.verify(raw_access_token, &app.audience).await;
        let id_token = self.verifier.verify(raw_id_token, &app.client_id).await;

        let result = authenticate(access_token, id_token);
        let access_token = result.access_token.clone();
        let id_token = result.id_token.clone();
        let event = result.into_event(&app.claims);

        tracing::debug!(
            host = host.unwrap_or_default(),
            application = %app.name,
            authenticated = matches!(event, AuthenticationEvent::Authenticated(_)),
            "authentication finished"
        );

        Authentication {
            event,
            access_token,
            id_token,
        }
    }

    /// Decides the request and records the outcome in the event store.
    pub fn authorize(
        &self,
        authentication: &Authentication,
        requested_url: &RequestedUrl,
        is_api: bool,
    ) -> AuthorizeEvent {
        let event = self.decide(authentication, requested_url, is_api);
        self.events.record(
            event.kind(),
            requested_url,
            authentication.user().map(|user| user.subject.as_str()),
            event.reason(),
        );
        event
    }

    fn decide(
        &self,
        authentication: &Authentication,
        requested_url: &RequestedUrl,
        is_api: bool,
    ) -> AuthorizeEvent {
        let app = self.application(Some(&requested_url.host));
        let (access_token, id_token) = authentication.tokens();
        let result = authorize(access_token, id_token, &app, requested_url, is_api);
        let reason = result.error.map(|e| e.message);

        match result.state {
            AuthorizationState::AccessGranted => AuthorizeEvent::AccessGranted {
                user: authentication.user().cloned(),
            },
            AuthorizationState::AccessDenied => AuthorizeEvent::AccessDenied {
                reason: reason.unwrap_or_else(|| ACCESS_DENIED.to_string()),
            },
            AuthorizationState::NeedRedirect => self.redirect(&app, requested_url),
            AuthorizationState::Error => AuthorizeEvent::Error {
                reason: reason.unwrap_or_else(|| ACCESS_DENIED.to_string()),
            },
            state => {
                debug_assert!(!state.is_terminal());
                tracing::warn!(?state, "authorization did not reach a decision");
                AuthorizeEvent::Error {
                    reason: format!("authorization ended in {state:?}"),
                }
            }
        }
    }

    fn redirect(&self, app: &ApplicationPolicy, requested_url: &RequestedUrl) -> AuthorizeEvent {
        let nonce = match Nonce::generate() {
            Ok(nonce) => nonce,
            Err(err) => {
                tracing::error!(error = %err, "failed to generate nonce");
                return AuthorizeEvent::Error {
                    reason: err.to_string(),
                };
            }
        };

        let state = AuthorizeState::new(requested_url.clone(), nonce.clone());
        match build_authorize_url(&self.authorize_endpoint, app, &state) {
            Ok(authorize_url) => AuthorizeEvent::NeedRedirect {
                authorize_url,
                nonce,
                cookie_domain: app.token_cookie_domain.clone(),
                max_age: self.nonce_max_age,
            },
            Err(err) => {
                tracing::error!(error = %err, "failed to build authorize url");
                AuthorizeEvent::Error {
                    reason: err.to_string(),
                }
            }
        }
    }
}
