/*
 * Responsibility
 * - middleware のまとまり
 *   - auth: token 検証 → AuthCtx を extensions へ
 *   - http: request id / body limit / timeout / trace
 */
pub mod auth;
pub mod http;
