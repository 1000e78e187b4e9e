use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use raiden_onboarding::backend::{FaucetService, HttpBackend, OnboardingBackend};
use raiden_onboarding::config::{CoordinatorConfig, ServerConfig};
use raiden_onboarding::onboarding::{
    CoordinatorDeps, OnboardingCoordinator, OnboardingRouteState, SessionConstants, fatal_routes,
    onboarding_routes,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let server_config = ServerConfig::from_env();

    // Initialize tracing (stderr, plus a daily log file when configured)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (file_layer, _log_guard) = match &server_config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "raiden-onboarding.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                ),
                Some(guard),
            )
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    eprintln!("Raiden onboarding v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Session constants: {}", server_config.constants_path.display());
    eprintln!("   Keystore dir: {}", server_config.keystore_dir.display());
    eprintln!("   API: http://{}/api/onboarding/status", server_config.bind);

    let app = match build_app(&server_config).await {
        Ok(app) => app,
        Err(e) => {
            // Configuration errors are fatal for the session: serve the error state only.
            tracing::error!("Onboarding session unavailable: {e:#}");
            fatal_routes(format!("{e:#}"))
        }
    }
    .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(server_config.bind)
        .await
        .with_context(|| format!("failed to bind {}", server_config.bind))?;
    tracing::info!(addr = %server_config.bind, "Onboarding server started");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_app(server_config: &ServerConfig) -> anyhow::Result<axum::Router> {
    let raw = tokio::fs::read_to_string(&server_config.constants_path)
        .await
        .with_context(|| format!("reading {}", server_config.constants_path.display()))?;
    let session = SessionConstants::from_json(&raw)?.into_session()?;

    let http = Arc::new(HttpBackend::new(
        session.urls.clone(),
        server_config.request_timeout,
    )?);
    let backend: Arc<dyn OnboardingBackend> = http.clone();
    let faucet: Option<Arc<dyn FaucetService>> = if session.faucet_available {
        Some(http)
    } else {
        None
    };

    eprintln!("   Account: {}", session.checksum_address());
    eprintln!(
        "   Network: {} (faucet: {}, swap: {})",
        session.network,
        if session.faucet_available { "yes" } else { "no" },
        if session.swap_available() { "yes" } else { "no" },
    );

    let deps = CoordinatorDeps {
        backend,
        faucet,
        // The wallet provider is injected by the browser; the server-side
        // coordinator funds through the faucet only.
        wallet: None,
    };
    let coordinator = OnboardingCoordinator::new(session, deps, CoordinatorConfig::from_env());

    Ok(onboarding_routes(OnboardingRouteState {
        coordinator,
        keystore_dir: server_config.keystore_dir.clone(),
    }))
}
