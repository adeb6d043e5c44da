/*
 * Responsibility
 * - 認可判定 (grant / deny / redirect) の state machine
 * - login redirect 用の state / nonce / authorize URL
 * - callback 時の state と nonce cookie の突き合わせ
 */
mod callback;
mod machine;
mod nonce;
mod requested_url;
mod state;
mod url;

pub use callback::{CallbackError, verify_callback};
pub use machine::{
    AuthorizationResult, AuthorizationState, MISSING_PERMISSIONS_CLAIM, authorize,
};
pub use nonce::{Nonce, NonceError};
pub use requested_url::RequestedUrl;
pub use state::{AuthorizeState, StateError};
pub use url::{AuthorizeUrlError, build_authorize_url};
