/*
 * Responsibility
 * - (access token, id token) → Authenticated / Anonymous / Error の判定
 * - 判定は state machine (services::fsm) 上で run-to-completion に実行する
 *
 * Notes
 * - 失敗系はすべて Anonymous に倒す。Error は opaque な access token のみ
 */
use serde::Serialize;

use crate::services::fsm::{DecisionError, RunToCompletion, StateChart, Transition, always};
use crate::services::token::Token;
use crate::services::user::AuthenticatedUser;

pub const OPAQUE_ACCESS_TOKEN: &str = "Opaque Access Tokens is not supported.";
pub const OPAQUE_ID_TOKEN: &str = "An ID Token can't be an opaque token.";
pub const DIFFERENT_SUBJECTS: &str = "Access Token and Id Token had different value in SUB-claim.";
pub const MISSING_ACCESS_TOKEN: &str = "Access token is missing.";
pub const MISSING_ID_TOKEN: &str = "Id token is missing.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationState {
    AwaitAuthentication,
    Authenticating,
    ValidatingTokens,
    ValidatingAccessToken,
    ValidatingIdToken,
    ValidatingSameSubs,
    InvalidToken,
    ValidTokens,
    Authenticated,
    Anonymous,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Authenticate,
    ValidateTokens,
    ValidateAccessToken,
    ValidAccessToken,
    InvalidAccessToken,
    ValidIdToken,
    InvalidIdToken,
    ValidSubs,
    InvalidSubs,
    Error,
    NextState,
}

struct Context {
    access_token: Token,
    id_token: Token,
    error: Option<DecisionError>,
}

impl Context {
    fn fail(&mut self, message: impl Into<String>, trigger: Trigger) -> Option<Trigger> {
        self.error = Some(DecisionError::new(message));
        Some(trigger)
    }
}

fn has_error(ctx: &Context) -> bool {
    ctx.error.is_some()
}

fn no_error(ctx: &Context) -> bool {
    ctx.error.is_none()
}

use AuthenticationState as S;

static TRANSITIONS: &[Transition<S, Trigger, Context>] = &[
    Transition { from: S::AwaitAuthentication, event: Trigger::Authenticate, to: S::Authenticating, guard: always },
    Transition { from: S::Authenticating, event: Trigger::ValidateTokens, to: S::ValidatingTokens, guard: always },
    Transition { from: S::Authenticating, event: Trigger::Error, to: S::Error, guard: has_error },
    Transition { from: S::ValidatingTokens, event: Trigger::ValidateAccessToken, to: S::ValidatingAccessToken, guard: always },
    Transition { from: S::ValidatingAccessToken, event: Trigger::ValidAccessToken, to: S::ValidatingIdToken, guard: no_error },
    Transition { from: S::ValidatingAccessToken, event: Trigger::InvalidAccessToken, to: S::InvalidToken, guard: has_error },
    Transition { from: S::ValidatingIdToken, event: Trigger::ValidIdToken, to: S::ValidatingSameSubs, guard: no_error },
    Transition { from: S::ValidatingIdToken, event: Trigger::InvalidIdToken, to: S::InvalidToken, guard: has_error },
    Transition { from: S::ValidatingSameSubs, event: Trigger::ValidSubs, to: S::ValidTokens, guard: no_error },
    Transition { from: S::ValidatingSameSubs, event: Trigger::InvalidSubs, to: S::InvalidToken, guard: has_error },
    Transition { from: S::InvalidToken, event: Trigger::NextState, to: S::Anonymous, guard: always },
    Transition { from: S::ValidTokens, event: Trigger::NextState, to: S::Authenticated, guard: always },
];

struct AuthenticationChart;

impl StateChart for AuthenticationChart {
    type State = S;
    type Event = Trigger;
    type Context = Context;

    const INITIAL: S = S::AwaitAuthentication;

    fn parent(state: S) -> Option<S> {
        match state {
            S::ValidatingTokens | S::Authenticated | S::Anonymous | S::Error => {
                Some(S::Authenticating)
            }
            S::ValidatingAccessToken
            | S::ValidatingIdToken
            | S::ValidatingSameSubs
            | S::InvalidToken
            | S::ValidTokens => Some(S::ValidatingTokens),
            S::AwaitAuthentication | S::Authenticating => None,
        }
    }

    fn transitions() -> &'static [Transition<S, Trigger, Context>] {
        TRANSITIONS
    }

    fn on_entry(state: S, ctx: &mut Context) -> Option<Trigger> {
        match state {
            S::AwaitAuthentication => None,
            S::Authenticating => Some(Trigger::ValidateTokens),
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
            S::ValidatingIdToken => match &ctx.id_token {
                Token::Verified(_) => Some(Trigger::ValidIdToken),
                Token::Opaque(_) => ctx.fail(OPAQUE_ID_TOKEN, Trigger::InvalidIdToken),
                Token::Invalid(reason) => {
                    let reason = reason.clone();
                    ctx.fail(reason, Trigger::InvalidIdToken)
                }
                Token::NoToken => ctx.fail(MISSING_ID_TOKEN, Trigger::InvalidIdToken),
            },
            S::ValidatingSameSubs => match (ctx.access_token.verified(), ctx.id_token.verified()) {
                (Some(access), Some(id)) if access.subject() == id.subject() => {
                    Some(Trigger::ValidSubs)
                }
                _ => ctx.fail(DIFFERENT_SUBJECTS, Trigger::InvalidSubs),
            },
            S::InvalidToken | S::ValidTokens => Some(Trigger::NextState),
            S::Authenticated => {
                tracing::trace!("authenticated");
                None
            }
            S::Anonymous => {
                tracing::debug!(reason = ?ctx.error.as_ref().map(|e| e.message.as_str()), "anonymous");
                None
            }
            S::Error => {
                tracing::debug!(error = ?ctx.error, "authentication error");
                None
            }
        }
    }
}

/// Final state of one authentication run, with the tokens handed back to the caller.
#[derive(Debug)]
pub struct AuthenticationResult {
    pub state: AuthenticationState,
    pub error: Option<DecisionError>,
    pub access_token: Token,
    pub id_token: Token,
}

/// Runs the authentication machine once for the given pair of tokens.
pub fn authenticate(access_token: Token, id_token: Token) -> AuthenticationResult {
    let mut machine = RunToCompletion::<AuthenticationChart>::new(Context {
        access_token,
        id_token,
        error: None,
    });
    machine.fire(Trigger::Authenticate);

    let (state, ctx) = machine.into_parts();
    AuthenticationResult {
        state,
        error: ctx.error,
        access_token: ctx.access_token,
        id_token: ctx.id_token,
    }
}

/// What the rest of the request pipeline sees of authentication.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthenticationEvent {
    Authenticated(AuthenticatedUser),
    Anonymous { reason: String },
    Error { reason: String },
}

impl AuthenticationResult {
    /// `claims` lists the id-token claims surfaced as user attributes.
    pub fn into_event(self, claims: &[String]) -> AuthenticationEvent {
        let reason = self
            .error
            .map(|e| e.message)
            .unwrap_or_else(|| format!("authentication ended in {:?}", self.state));

        match (self.state, self.access_token, self.id_token) {
            (S::Authenticated, Token::Verified(access), Token::Verified(id)) => {
                AuthenticationEvent::Authenticated(AuthenticatedUser::new(access, id, claims))
            }
            (S::Anonymous, _, _) => AuthenticationEvent::Anonymous { reason },
            // Error と、終端に届かなかった場合
            _ => AuthenticationEvent::Error { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::services::testutil;

    fn machine(access: Token, id: Token) -> RunToCompletion<AuthenticationChart> {
        let mut machine = RunToCompletion::<AuthenticationChart>::new(Context {
            access_token: access,
            id_token: id,
            error: None,
        });
        machine.fire(Trigger::Authenticate);
        machine
    }

    #[test]
    fn matching_subjects_authenticate() {
        let result = authenticate(
            testutil::verified("user-1", json!({})),
            testutil::verified("user-1", json!({})),
        );
        assert_eq!(result.state, S::Authenticated);
        assert_eq!(result.error, None);
    }

    #[test]
    fn happy_path_visits_every_validation_step() {
        let machine = machine(
            testutil::verified("user-1", json!({})),
            testutil::verified("user-1", json!({})),
        );
        assert_eq!(
            machine.entered(),
            &[
                S::Authenticating,
                S::ValidatingTokens,
                S::ValidatingAccessToken,
                S::ValidatingIdToken,
                S::ValidatingSameSubs,
                S::ValidTokens,
                S::Authenticated,
            ]
        );
    }

    #[test]
    fn different_subjects_are_anonymous() {
        let result = authenticate(
            testutil::verified("user-1", json!({})),
            testutil::verified("user-2", json!({})),
        );
        assert_eq!(result.state, S::Anonymous);
        assert_eq!(result.error, Some(DecisionError::new(DIFFERENT_SUBJECTS)));
    }

    #[test]
    fn opaque_access_token_is_an_error() {
        let result = authenticate(
            Token::Opaque("opaque".into()),
            testutil::verified("user-1", json!({})),
        );
        assert_eq!(result.state, S::Error);
        assert_eq!(result.error, Some(DecisionError::new(OPAQUE_ACCESS_TOKEN)));
    }

    #[test]
    fn invalid_or_missing_access_token_is_anonymous() {
        let result = authenticate(
            Token::invalid("token expired"),
            testutil::verified("user-1", json!({})),
        );
        assert_eq!(result.state, S::Anonymous);
        assert_eq!(result.error, Some(DecisionError::new("token expired")));

        let result = authenticate(Token::NoToken, Token::NoToken);
        assert_eq!(result.state, S::Anonymous);
        assert_eq!(result.error, Some(DecisionError::new(MISSING_ACCESS_TOKEN)));
    }

    #[test]
    fn id_token_must_be_verified() {
        let access = || testutil::verified("user-1", json!({}));

        let result = authenticate(access(), Token::Opaque("opaque".into()));
        assert_eq!(result.state, S::Anonymous);
        assert_eq!(result.error, Some(DecisionError::new(OPAQUE_ID_TOKEN)));

        let result = authenticate(access(), Token::invalid("bad signature"));
        assert_eq!(result.state, S::Anonymous);
        assert_eq!(result.error, Some(DecisionError::new("bad signature")));

        let result = authenticate(access(), Token::NoToken);
        assert_eq!(result.state, S::Anonymous);
        assert_eq!(result.error, Some(DecisionError::new(MISSING_ID_TOKEN)));
    }

    #[test]
    fn terminal_state_is_entered_once() {
        let machine = machine(Token::invalid("nope"), Token::NoToken);
        let anonymous = machine
            .entered()
            .iter()
            .filter(|s| **s == S::Anonymous)
            .count();
        assert_eq!(anonymous, 1);
        assert_eq!(machine.state(), S::Anonymous);
    }

    #[test]
    fn into_event_builds_user() {
        let event = authenticate(
            testutil::verified("user-1", json!({})),
            testutil::verified("user-1", json!({"email": "a@example.com"})),
        )
        .into_event(&["email".to_string()]);

        let AuthenticationEvent::Authenticated(user) = event else {
            panic!("expected authenticated, got {event:?}");
        };
        assert_eq!(user.subject, "user-1");
        assert_eq!(user.userinfo.get("email").map(String::as_str), Some("a@example.com"));
    }

    #[test]
    fn into_event_maps_failures() {
        let event = authenticate(Token::NoToken, Token::NoToken).into_event(&[]);
        assert_eq!(
            event,
            AuthenticationEvent::Anonymous {
                reason: MISSING_ACCESS_TOKEN.into()
            }
        );

        let event = authenticate(Token::Opaque("x".into()), Token::NoToken).into_event(&[]);
        assert_eq!(
            event,
            AuthenticationEvent::Error {
                reason: OPAQUE_ACCESS_TOKEN.into()
            }
        );
    }
}
