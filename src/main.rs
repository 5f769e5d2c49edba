use anyhow::Result;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fleet_status::config::{DatabaseConfig, EnvironmentConfig, StoreBackend};
use fleet_status::database::connect_and_migrate;
use fleet_status::repositories::{MemoryFleetStore, PgFleetStore, RedisDocumentStore};
use fleet_status::utils::{Clock, SystemClock};
use fleet_status::{create_router, AppState, FleetService};

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    // Configurar logging
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🚑 Fleet Status - Reconciliación de incidentes y disponibilidad");
    info!("================================================================");

    let config = EnvironmentConfig::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let fleet = match config.store_backend {
        StoreBackend::Postgres => {
            let database = DatabaseConfig::from_env()?;
            let pool = connect_and_migrate(&database).await.map_err(|e| {
                error!("❌ Error conectando a la base de datos: {}", e);
                e
            })?;
            FleetService::transactional(Arc::new(PgFleetStore::new(pool)), clock, config.retry)
        }
        StoreBackend::Redis => {
            let store = RedisDocumentStore::connect(&config.redis_url).await.map_err(|e| {
                error!("❌ Error conectando a Redis: {}", e);
                anyhow::anyhow!("Error de Redis: {}", e)
            })?;
            FleetService::document(Arc::new(store), clock, config.document)
        }
        StoreBackend::Memory => {
            warn!("⚠️ Almacén en memoria: los datos se pierden al reiniciar");
            FleetService::transactional(Arc::new(MemoryFleetStore::new()), clock, config.retry)
        }
    };

    let addr: SocketAddr = config.server_url().parse()?;
    let app = create_router(AppState::new(fleet, config.clone()));

    info!("🌐 Servidor iniciando en http://{} (almacén: {:?})", addr, config.store_backend);
    info!("🔍 Endpoints disponibles:");
    info!("   GET    /health");
    info!("   POST   /api/incidents/batch");
    info!("   GET    /api/vehicles?region=&district=&hub=");
    info!("   GET    /api/vehicles/:key");
    info!("   PUT    /api/vehicles/:registration/settings");
    info!("   DELETE /api/vehicles/:registration");
    info!("   GET    /api/statistics/availability?region=&district=&hub=&resolution=");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!("❌ Error del servidor: {}", e);
            e
        })?;

    info!("👋 Servidor terminado");
    Ok(())
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ No se pudo instalar el manejador de Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("❌ No se pudo instalar el manejador de SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
