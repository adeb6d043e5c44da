/*
 * Responsibility
 * - 署名検証鍵の取得 (kid → DecodingKey)
 * - 本番は JWKS, テストは固定鍵
 */
mod jwks;
mod provider;

pub use jwks::{JwksKeyProvider, parse_jwks};
pub use provider::{KeyError, KeyProvider};
