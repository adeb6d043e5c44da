/*
 * Responsibility
 * - Config読み込み → 依存生成 (JWKS / verifier / cache / event store / 判定サービス) → Router 組み立て
 * - tracing / panic hook の初期化
 * - verification cache の定期 purge
 * - axum::serve() で起動、Ctrl-C で graceful shutdown
 */
use std::{panic, process, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::Router;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::clock::{Clock, SystemClock};
use crate::services::events::EventStore;
use crate::services::forward_auth::ForwardAuthService;
use crate::services::keys::JwksKeyProvider;
use crate::services::verify::{SlidingTtlCache, TokenVerifier, VerificationCache};
use crate::state::AppState;
use crate::{api, middleware};

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,forward_auth=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // development: fail fast / production: stderr に出して継続
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting forward-auth in {:?} mode on {}",
        config.app_env,
        config.addr
    );
    tracing::info!(
        issuer = %config.auth_domain,
        jwks = %config.jwks_url,
        applications = config.settings.apps.len(),
        "configuration loaded"
    );

    let state = build_state(&config)?;
    let purge = spawn_cache_purge(
        state.forward_auth.verifier().cache().clone(),
        config.token_cache_purge_interval,
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    purge.abort();
    tracing::info!("forward-auth stopped");
    Ok(())
}

fn build_state(config: &Config) -> Result<AppState> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let idle = chrono::Duration::from_std(config.token_cache_idle)
        .context("TOKEN_CACHE_IDLE_SECONDS is out of range")?;
    let cache: Arc<dyn VerificationCache> = Arc::new(SlidingTtlCache::new(idle, clock.clone()));

    let keys = Arc::new(
        JwksKeyProvider::new(
            config.jwks_url.clone(),
            config.jwks_cache_ttl,
            config.jwks_timeout,
        )?
        .with_min_refresh_interval(config.jwks_min_refresh),
    );

    let events = EventStore::new(config.events_retention, config.events_capacity, clock.clone());
    let verifier = TokenVerifier::new(config.auth_domain.clone(), keys, cache, clock);
    let forward_auth = ForwardAuthService::new(
        verifier,
        config.settings.clone(),
        config.authorize_url.clone(),
        config.nonce_max_age,
        events,
    );

    Ok(AppState::new(
        Arc::new(forward_auth),
        config.app_env.is_production(),
    ))
}

fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .merge(api::v1::routes(state.clone()))
        .with_state(state);

    middleware::http::apply(router)
}

/// Drops idle verification-cache entries every `every`.
fn spawn_cache_purge(cache: Arc<dyn VerificationCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 1 回目の tick は即時に返るので読み捨てる
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = cache.purge_idle();
            if purged > 0 {
                tracing::debug!(purged, remaining = cache.len(), "purged idle verification cache entries");
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
