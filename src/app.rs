/*
 * Responsibility
 * - config load -> dependency construction -> Router assembly
 * - middleware order: appfilter wraps every route, http layers wrap everything
 * - axum::serve() with graceful shutdown on ctrl-c
 */
use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::repos::{credential_store::CredentialStore, pg_store::PgCredentialStore};
use crate::services::auth::AuthService;
use crate::state::AppState;
use crate::{api, middleware};

fn init_tracing() {
    // RUST_LOG wins when set, e.g. RUST_LOG=info,app_gate=debug,tower_http=debug.
    // Request spans carry method, path and request id; never the query string.
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
        // Always surface panics via tracing; stderr may not be collected.
        tracing::error!(?info, "panic");

        // Development: fail fast. Production: default hook, keep serving.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env().context("failed to load configuration")?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting app-gate in {:?} mode on {} (handler {}, appfilter enabled={} signatures={})",
        config.app_env,
        config.addr,
        config.app_handler_path,
        config.filter.enabled,
        config.filter.signatures.len()
    );

    // Lazy pool: an unreachable database shows up per request as StoreUnavailable.
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect_lazy(&config.database_url)
        .context("invalid DATABASE_URL")?;
    let store: Arc<dyn CredentialStore> = Arc::new(PgCredentialStore::new(pool));

    let state = build_state(&config, store);
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

/// Build the shared state around an already constructed credential store.
pub fn build_state(config: &Config, store: Arc<dyn CredentialStore>) -> AppState {
    let auth = Arc::new(AuthService::new(store, config.extract_limits));
    AppState::new(Arc::new(config.filter.clone()), auth)
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let routes = api::routes(&config.app_handler_path);
    let routes = middleware::appfilter::apply(routes, state.clone());
    let router = routes.with_state(state);

    middleware::http::apply(router, config.request_timeout)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install ctrl-c handler");
    }
}
