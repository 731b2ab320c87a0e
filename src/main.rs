use std::env;

use authgate::app::{build_router, build_state, cors_layer};
use authgate::config::{Config, StoreBackend, mask_credentials};
use authgate::db::{self, Stores};
use authgate::logging::setup_logging;

#[tokio::main]
async fn main() -> Result<(), lambda_http::Error> {
    setup_logging();
    tracing::info!("Starting authgate session service...");

    let config = Config::from_env()?;

    let stores = match config.store_backend {
        StoreBackend::Postgres => {
            tracing::info!(database = %mask_credentials(&config.database_url), "Using Postgres stores");
            let pool = db::connection::create_pool(
                &config.database_url,
                config.db_pool_size,
                config.store_timeout,
            )?;
            Stores::postgres(pool, config.store_timeout)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory stores: all data is lost on restart");
            Stores::memory()
        }
    };

    let state = build_state(&config, &stores)?;
    let app = build_router(state, cors_layer(&config.frontend_url)?);

    if env::var("AWS_LAMBDA_FUNCTION_NAME").is_ok() {
        tracing::info!("Running in Lambda mode");
        lambda_http::run(app).await
    } else {
        let addr = format!("{}:{}", config.server_host, config.server_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Session service listening on http://{addr}");
        axum::serve(listener, app).await?;

        Ok(())
    }
}
