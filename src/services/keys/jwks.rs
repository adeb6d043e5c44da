//! JWKS-backed signing key provider.
//!
//! Keys are fetched from the issuer's JWKS endpoint and cached per `kid` with a TTL.
//! Concurrent lookups of the same missing `kid` share a single fetch.
//!
//! A `kid` that is not in the cache only triggers a new download once per
//! `min_refresh_interval`; inside that window it is reported as unknown. Tokens with
//! made-up key ids therefore cannot drive traffic to the identity provider.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{JwkSet, PublicKeyUse};
use moka::future::Cache;
use tokio::sync::Mutex;

use super::provider::{KeyError, KeyProvider};

pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

pub struct JwksKeyProvider {
    jwks_url: String,
    http: reqwest::Client,
    keys: Cache<String, Arc<DecodingKey>>,
    min_refresh_interval: Duration,
    // download 中も保持する (同時に来た別 kid の download をまとめるため)
    last_fetch: Mutex<Option<Instant>>,
}

impl JwksKeyProvider {
    pub fn new(jwks_url: impl Into<String>, ttl: Duration, timeout: Duration) -> Result<Self, KeyError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeyError::Fetch(e.to_string()))?;

        Ok(Self {
            jwks_url: jwks_url.into(),
            http,
            keys: Cache::builder().time_to_live(ttl).max_capacity(64).build(),
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            last_fetch: Mutex::new(None),
        })
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    async fn fetch(&self, kid: &str) -> Result<Arc<DecodingKey>, KeyError> {
        let mut last_fetch = self.last_fetch.lock().await;

        // 待っている間に別の download が温めているかもしれない
        if let Some(key) = self.keys.get(kid).await {
            return Ok(key);
        }
        if let Some(at) = *last_fetch
            && at.elapsed() < self.min_refresh_interval
        {
            tracing::debug!(kid, "jwks refresh rate limited; treating kid as unknown");
            return Err(KeyError::UnknownKeyId(kid.to_string()));
        }
        *last_fetch = Some(Instant::now());

        self.download(kid).await
    }

    async fn download(&self, kid: &str) -> Result<Arc<DecodingKey>, KeyError> {
        tracing::debug!(jwks_url = %self.jwks_url, kid, "fetching jwks");

        let body = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| KeyError::Fetch(e.to_string()))?
            .text()
            .await
            .map_err(|e| KeyError::Fetch(e.to_string()))?;

        let mut found = None;
        for (key_id, key) in parse_jwks(&body)? {
            let key = Arc::new(key);
            if key_id == kid {
                found = Some(key);
            } else {
                // 同じ JWKS に載っている他の鍵も温めておく
                self.keys.insert(key_id, key).await;
            }
        }

        found.ok_or_else(|| KeyError::UnknownKeyId(kid.to_string()))
    }
}

impl fmt::Debug for JwksKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksKeyProvider")
            .field("jwks_url", &self.jwks_url)
            .field("cached_keys", &self.keys.entry_count())
            .field("min_refresh_interval", &self.min_refresh_interval)
            .finish()
    }
}

#[async_trait]
impl KeyProvider for JwksKeyProvider {
    async fn signing_key(&self, kid: &str) -> Result<Arc<DecodingKey>, KeyError> {
        self.keys
            .try_get_with(kid.to_string(), self.fetch(kid))
            .await
            .map_err(|err| (*err).clone())
    }
}

/// Parses a JWKS document into `(kid, key)` pairs usable for signature verification.
///
/// Keys without a `kid`, encryption keys and keys jsonwebtoken cannot load are skipped.
pub fn parse_jwks(body: &str) -> Result<Vec<(String, DecodingKey)>, KeyError> {
    let set: JwkSet =
        serde_json::from_str(body).map_err(|e| KeyError::InvalidJwks(e.to_string()))?;

    let mut keys = Vec::with_capacity(set.keys.len());
    for jwk in &set.keys {
        let Some(kid) = jwk.common.key_id.clone() else {
            continue;
        };
        if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
            continue;
        }
        match DecodingKey::from_jwk(jwk) {
            Ok(key) => keys.push((kid, key)),
            Err(err) => tracing::warn!(kid = %kid, error = ?err, "skipping unusable jwk"),
        }
    }

    if keys.is_empty() {
        return Err(KeyError::InvalidJwks("no usable signing keys".into()));
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{Json, Router, routing::get};
    use serde_json::{Value, json};

    use super::*;
    use crate::services::testutil;

    fn jwks() -> Value {
        json!({
            "keys": [
                testutil::jwk(testutil::KID),
                testutil::jwk("other-key"),
                {"kty": "OKP", "crv": "Ed25519", "x": testutil::PUBLIC_KEY_X},
            ]
        })
    }

    #[test]
    fn parse_jwks_keeps_keys_with_kid() {
        let keys = parse_jwks(&jwks().to_string()).unwrap();
        let kids: Vec<_> = keys.iter().map(|(kid, _)| kid.as_str()).collect();
        assert_eq!(kids, vec![testutil::KID, "other-key"]);
    }

    #[test]
    fn parse_jwks_rejects_garbage_and_empty_sets() {
        assert!(matches!(parse_jwks("not json"), Err(KeyError::InvalidJwks(_))));
        assert!(matches!(
            parse_jwks(r#"{"keys":[]}"#),
            Err(KeyError::InvalidJwks(_))
        ));
    }

    async fn serve_jwks(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/.well-known/jwks.json",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(jwks())
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/.well-known/jwks.json")
    }

    #[tokio::test]
    async fn signing_key_is_fetched_once_and_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = serve_jwks(hits.clone()).await;
        let provider =
            JwksKeyProvider::new(url, Duration::from_secs(600), Duration::from_secs(2)).unwrap();

        provider.signing_key(testutil::KID).await.unwrap();
        provider.signing_key(testutil::KID).await.unwrap();
        // 同じ JWKS にあった鍵は追加の取得なしで引ける
        provider.signing_key("other-key").await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_kid_is_an_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = serve_jwks(hits).await;
        let provider =
            JwksKeyProvider::new(url, Duration::from_secs(600), Duration::from_secs(2)).unwrap();

        assert_eq!(
            provider.signing_key("missing").await.unwrap_err(),
            KeyError::UnknownKeyId("missing".into())
        );
    }

    #[tokio::test]
    async fn unknown_kids_do_not_refetch_within_the_refresh_interval() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = serve_jwks(hits.clone()).await;
        let provider =
            JwksKeyProvider::new(url, Duration::from_secs(600), Duration::from_secs(2)).unwrap();

        for i in 0..50 {
            let kid = format!("made-up-{i}");
            assert_eq!(
                provider.signing_key(&kid).await.unwrap_err(),
                KeyError::UnknownKeyId(kid)
            );
        }
        for _ in 0..50 {
            assert!(provider.signing_key("made-up").await.is_err());
        }
        // 最初の download で温まった鍵は引ける
        provider.signing_key(testutil::KID).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_unknown_kids_share_one_fetch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = serve_jwks(hits.clone()).await;
        let provider = Arc::new(
            JwksKeyProvider::new(url, Duration::from_secs(600), Duration::from_secs(2)).unwrap(),
        );

        let lookups: Vec<_> = (0..20)
            .map(|i| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.signing_key(&format!("made-up-{i}")).await })
            })
            .collect();
        for lookup in lookups {
            assert!(lookup.await.unwrap().is_err());
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_kid_refetches_after_the_refresh_interval() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = serve_jwks(hits.clone()).await;
        let provider =
            JwksKeyProvider::new(url, Duration::from_secs(600), Duration::from_secs(2))
                .unwrap()
                .with_min_refresh_interval(Duration::from_millis(50));

        assert!(provider.signing_key("rotated").await.is_err());
        assert!(provider.signing_key("rotated").await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(provider.signing_key("rotated").await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_fetch_error() {
        let provider = JwksKeyProvider::new(
            "http://127.0.0.1:9/.well-known/jwks.json",
            Duration::from_secs(600),
            Duration::from_millis(500),
        )
        .unwrap();

        assert!(matches!(
            provider.signing_key(testutil::KID).await,
            Err(KeyError::Fetch(_))
        ));
    }
}
