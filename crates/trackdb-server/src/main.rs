use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use trackdb_carriers::CarrierRegistry;
use trackdb_server::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
    scheduler::{build_scheduler, ReconcileSettings, Reconciler, SchedulerHandle},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(trackdb_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let store = trackdb_db::open_store(&config).await?;
    let registry = Arc::new(CarrierRegistry::from_app_config(&config)?);
    if registry.list_supported().is_empty() {
        tracing::warn!("no carrier credentials configured; every track request will be rejected");
    }

    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        ReconcileSettings::from_app_config(&config),
    ));
    let scheduler = if config.scheduler_enabled {
        build_scheduler(Arc::clone(&reconciler), config.reconcile_interval_minutes).await?
    } else {
        tracing::info!("scheduler disabled; reconciliation runs only on manual trigger");
        SchedulerHandle::manual(reconciler)
    };
    let scheduler = Arc::new(scheduler);

    let auth = AuthState::from_env(matches!(
        config.env,
        trackdb_core::Environment::Development
    ))?;
    let app = build_app(
        AppState {
            store,
            registry,
            scheduler: Arc::clone(&scheduler),
        },
        auth,
        default_rate_limit_state(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "trackdb-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
