use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use courier_api::auth::AppStateInner;
use courier_api::routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,tower_http=debug".into()),
        )
        .init();

    // Config — the signing secret has no default; refusing to start beats
    // running with a guessable one.
    let jwt_secret = std::env::var("COURIER_JWT_SECRET")
        .context("COURIER_JWT_SECRET must be set")?;
    let db_path = std::env::var("COURIER_DB_PATH").unwrap_or_else(|_| "courier.db".into());
    let host = std::env::var("COURIER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("COURIER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .context("COURIER_PORT must be a port number")?;
    let hash_cost: u32 = std::env::var("COURIER_HASH_COST")
        .unwrap_or_else(|_| "2".into())
        .parse()
        .context("COURIER_HASH_COST must be an integer")?;
    let token_ttl_hours: i64 = std::env::var("COURIER_TOKEN_TTL_HOURS")
        .unwrap_or_else(|_| "24".into())
        .parse()
        .context("COURIER_TOKEN_TTL_HOURS must be an integer")?;

    // Init database
    let db = courier_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let state = Arc::new(AppStateInner::new(db, jwt_secret, hash_cost, token_ttl_hours)?);

    let app = routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("courier server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
