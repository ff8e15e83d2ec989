use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::{anyhow, Context};
use dotenv::dotenv;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wallet_service::{
    config::{Config, LoggingConfig, ServerConfig, StorageBackend},
    database::{Database, WalletStore},
    handlers,
    memory::InMemoryWalletStore,
    services::WalletService,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    init_tracing(&config.logging);

    info!("Starting Wallet Service...");

    match config.storage_backend().map_err(|e| anyhow!(e))? {
        StorageBackend::Postgres => {
            let db = Database::new(
                &config.database.url,
                config.database.max_connections,
                config.database.min_connections,
                config.database.acquire_timeout_secs,
            )
            .await
            .context("Failed to connect to database")?;

            info!("Database connected successfully");

            if config.database.run_migrations {
                db.run_migrations().await.context("Failed to run migrations")?;
            }

            serve(config.server, Arc::new(db)).await
        }
        StorageBackend::Memory => {
            info!("Using in-memory wallet store; balances are lost on restart");
            serve(config.server, Arc::new(InMemoryWalletStore::new())).await
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve<S: WalletStore>(server_config: ServerConfig, store: Arc<S>) -> anyhow::Result<()> {
    // One service (and one pool) shared by every worker.
    let service = web::Data::new(Arc::new(WalletService::new(store)));

    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(handlers::configure_routes::<S>)
    })
    .workers(server_config.workers)
    .shutdown_timeout(server_config.shutdown_timeout_secs)
    .client_request_timeout(server_config.client_request_timeout())
    .client_disconnect_timeout(server_config.client_disconnect_timeout())
    .keep_alive(server_config.keep_alive())
    .bind((server_config.host.as_str(), server_config.port))?
    .run()
    .await?;

    info!("Wallet Service stopped");
    Ok(())
}
