use serde::Serialize;

use super::requested_url::RequestedUrl;
use crate::services::application::ApplicationPolicy;
use crate::services::fsm::{DecisionError, RunToCompletion, StateChart, Transition, always};
use crate::services::token::Token;

pub const OPAQUE_ACCESS_TOKEN: &str = "Opaque Access Tokens is not supported.";
pub const OPAQUE_ID_TOKEN: &str = "An ID Token can't be an opaque token.";
pub const MISSING_PERMISSIONS_CLAIM: &str =
    "Missing permissions claim in access token. In Auth0, Add Permissions in the Access Token.";
pub const MISSING_ACCESS_TOKEN: &str = "Access token is missing.";
pub const MISSING_ID_TOKEN: &str = "Id token is missing.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationState {
    AwaitAuthorizing,
    Authorizing,
    ValidatingRequestedUrl,
    ValidatingWhitelistedUrl,
    ValidatingRestrictedMethod,
    ValidatingTokens,
    ValidatingAccessToken,
    ValidatingPermissions,
    ValidatingIdToken,
    InvalidToken,
    AccessGranted,
    AccessDenied,
    NeedRedirect,
    Error,
}

impl AuthorizationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::AccessGranted | Self::AccessDenied | Self::NeedRedirect | Self::Error
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Authorize,
    ValidateRequestedUrl,
    ValidateWhitelistedUrl,
    WhitelistedUrl,
    RestrictedUrl,
    RestrictedMethod,
    UnrestrictedMethod,
    ValidateAccessToken,
    ValidAccessToken,
    InvalidAccessToken,
    ValidPermissions,
    InvalidPermissions,
    ValidIdToken,
    InvalidIdToken,
    Error,
    NextTransition,
}

struct Context {
    access_token: Token,
    id_token: Token,
    application: ApplicationPolicy,
    requested_url: RequestedUrl,
    is_api: bool,
    error: Option<DecisionError>,
}

impl Context {
    fn fail(&mut self, message: impl Into<String>, trigger: Trigger) -> Option<Trigger> {
        self.error = Some(DecisionError::new(message));
        Some(trigger)
    }

    fn is_whitelisted(&self) -> bool {
        let callback = &self.application.redirect_uri;
        !callback.is_empty() && self.requested_url.starts_with(callback)
    }

    fn check_permissions(&mut self) -> Option<Trigger> {
        let required = &self.application.required_permissions;
        if required.is_empty() {
            return Some(Trigger::ValidPermissions);
        }

        let granted = match self.access_token.verified().map(|t| t.permissions()) {
            Some(Some(granted)) => granted,
            Some(None) => {
                tracing::warn!(
                    application = %self.application.name,
                    "access token has no permissions claim; enable permissions in access tokens at the identity provider"
                );
                return self.fail(MISSING_PERMISSIONS_CLAIM, Trigger::InvalidPermissions);
            }
            None => return self.fail(MISSING_ACCESS_TOKEN, Trigger::InvalidPermissions),
        };

        let missing: Vec<&str> = required
            .iter()
            .filter(|p| !granted.contains(*p))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Some(Trigger::ValidPermissions)
        } else {
            let message = format!("Missing permissions '{}'", missing.join(", "));
            self.fail(message, Trigger::InvalidPermissions)
        }
    }
}

fn has_error(ctx: &Context) -> bool {
    ctx.error.is_some()
}

fn no_error(ctx: &Context) -> bool {
    ctx.error.is_none()
}

fn is_api(ctx: &Context) -> bool {
    ctx.is_api
}

fn is_browser(ctx: &Context) -> bool {
    !ctx.is_api
}

use AuthorizationState as S;

static TRANSITIONS: &[Transition<S, Trigger, Context>] = &[
    Transition { from: S::AwaitAuthorizing, event: Trigger::Authorize, to: S::Authorizing, guard: always },
    Transition { from: S::Authorizing, event: Trigger::ValidateRequestedUrl, to: S::ValidatingRequestedUrl, guard: always },
    Transition { from: S::Authorizing, event: Trigger::Error, to: S::Error, guard: has_error },
    Transition { from: S::ValidatingRequestedUrl, event: Trigger::ValidateWhitelistedUrl, to: S::ValidatingWhitelistedUrl, guard: always },
    Transition { from: S::ValidatingWhitelistedUrl, event: Trigger::WhitelistedUrl, to: S::AccessGranted, guard: always },
    Transition { from: S::ValidatingWhitelistedUrl, event: Trigger::RestrictedUrl, to: S::ValidatingRestrictedMethod, guard: always },
    Transition { from: S::ValidatingRestrictedMethod, event: Trigger::UnrestrictedMethod, to: S::AccessGranted, guard: always },
    Transition { from: S::ValidatingRestrictedMethod, event: Trigger::RestrictedMethod, to: S::ValidatingTokens, guard: always },
    Transition { from: S::ValidatingTokens, event: Trigger::ValidateAccessToken, to: S::ValidatingAccessToken, guard: no_error },
    Transition { from: S::ValidatingAccessToken, event: Trigger::ValidAccessToken, to: S::ValidatingPermissions, guard: no_error },
    Transition { from: S::ValidatingAccessToken, event: Trigger::InvalidAccessToken, to: S::InvalidToken, guard: always },
    Transition { from: S::ValidatingPermissions, event: Trigger::ValidPermissions, to: S::ValidatingIdToken, guard: no_error },
    Transition { from: S::ValidatingPermissions, event: Trigger::InvalidPermissions, to: S::AccessDenied, guard: always },
    Transition { from: S::ValidatingIdToken, event: Trigger::ValidIdToken, to: S::AccessGranted, guard: no_error },
    Transition { from: S::ValidatingIdToken, event: Trigger::InvalidIdToken, to: S::InvalidToken, guard: always },
    Transition { from: S::InvalidToken, event: Trigger::NextTransition, to: S::NeedRedirect, guard: is_browser },
    Transition { from: S::InvalidToken, event: Trigger::NextTransition, to: S::AccessDenied, guard: is_api },
];

struct AuthorizationChart;

impl StateChart for AuthorizationChart {
    type State = S;
    type Event = Trigger;
    type Context = Context;

    const INITIAL: S = S::AwaitAuthorizing;

    fn parent(state: S) -> Option<S> {
        match state {
            S::ValidatingRequestedUrl
            | S::ValidatingTokens
            | S::AccessGranted
            | S::AccessDenied
            | S::NeedRedirect
            | S::Error => Some(S::Authorizing),
            S::ValidatingWhitelistedUrl | S::ValidatingRestrictedMethod => {
                Some(S::ValidatingRequestedUrl)
            }
            S::ValidatingAccessToken
            | S::ValidatingPermissions
            | S::ValidatingIdToken
            | S::InvalidToken => Some(S::ValidatingTokens),
            S::AwaitAuthorizing | S::Authorizing => None,
        }
    }

    fn transitions() -> &'static [Transition<S, Trigger, Context>] {
        TRANSITIONS
    }

    fn on_entry(state: S, ctx: &mut Context) -> Option<Trigger> {
        match state {
            S::AwaitAuthorizing => None,
            S::Authorizing => {
                tracing::trace!(application = %ctx.application.name, url = %ctx.requested_url, "authorizing");
                Some(Trigger::ValidateRequestedUrl)
            }
            S::ValidatingRequestedUrl => Some(Trigger::ValidateWhitelistedUrl),
            S::ValidatingWhitelistedUrl => Some(if ctx.is_whitelisted() {
                Trigger::WhitelistedUrl
            } else {
                Trigger::RestrictedUrl
            }),
            S::ValidatingRestrictedMethod => Some(
                if ctx.application.is_restricted_method(&ctx.requested_url.method) {
                    Trigger::RestrictedMethod
                } else {
                    Trigger::UnrestrictedMethod
                },
            ),
            S::ValidatingTokens => Some(Trigger::ValidateAccessToken),
            S::ValidatingAccessToken => match &ctx.access_token {
                Token::Verified(_) => Some(Trigger::ValidAccessToken),
                Token::Opaque(_) => ctx.fail(OPAQUE_ACCESS_TOKEN, Trigger::Error),
                Token::Invalid(reason) => {
                    let reason = reason.clone();
                    ctx.fail(reason, Trigger::InvalidAccessToken)
                }
                Token::NoToken => ctx.fail(MISSING_ACCESS_TOKEN, Trigger::InvalidAccessToken),
            },
            S::ValidatingPermissions => ctx.check_permissions(),
            S::ValidatingIdToken => match &ctx.id_token {
                Token::Verified(_) => Some(Trigger::ValidIdToken),
                Token::Opaque(_) => ctx.fail(OPAQUE_ID_TOKEN, Trigger::Error),
                Token::Invalid(reason) => {
                    let reason = reason.clone();
                    ctx.fail(reason, Trigger::InvalidIdToken)
                }
                Token::NoToken => ctx.fail(MISSING_ID_TOKEN, Trigger::InvalidIdToken),
            },
            S::InvalidToken => Some(Trigger::NextTransition),
            S::AccessGranted | S::AccessDenied | S::NeedRedirect | S::Error => {
                tracing::debug!(
                    decision = ?state,
                    error = ?ctx.error.as_ref().map(|e| e.message.as_str()),
                    "authorization decided"
                );
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResult {
    pub state: AuthorizationState,
    pub error: Option<DecisionError>,
}

/// Runs the authorization machine once for one request.
pub fn authorize(
    access_token: Token,
    id_token: Token,
    application: &ApplicationPolicy,
    requested_url: &RequestedUrl,
    is_api: bool,
) -> AuthorizationResult {
    let mut machine = RunToCompletion::<AuthorizationChart>::new(Context {
        access_token,
        id_token,
        application: application.clone(),
        requested_url: requested_url.clone(),
        is_api,
        error: None,
    });
    machine.fire(Trigger::Authorize);

    let (state, ctx) = machine.into_parts();
    AuthorizationResult {
        state,
        error: ctx.error,
    }
}
