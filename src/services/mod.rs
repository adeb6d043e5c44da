/*
 * Responsibility
 * - ドメインロジック (HTTP 非依存)
 *   - token 検証と cache, 署名鍵の取得
 *   - 認証 / 認可の state machine
 *   - アプリケーション設定の解決
 *   - 判定結果の一時保存 (events)
 */
pub mod application;
pub mod authenticate;
pub mod authorize;
pub mod clock;
pub mod events;
pub mod forward_auth;
pub mod fsm;
pub mod keys;
pub mod token;
pub mod user;
pub mod verify;

#[cfg(test)]
pub(crate) mod testutil;
