mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use cloak_api::{AppState, AppStateInner};
use cloak_db::Database;
use cloak_engine::{BlobStore, Engine, consent::run_revocation_listener, ledger::run_sweep_loop};
use cloak_gateway::{Dispatcher, connection};
use cloak_types::models::Role;

use config::Config;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cloak=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Arc::new(Database::open(&config.db_path)?);
    let blobs = Arc::new(BlobStore::new(config.blob_dir.clone(), config.public_url.clone()).await?);
    let dispatcher = Dispatcher::new();
    let engine = Engine::new(db.clone(), dispatcher.clone(), blobs);

    if let Some(handle) = &config.bootstrap_admin {
        bootstrap_admin(&db, handle)?;
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(run_sweep_loop(
        engine.statuses.clone(),
        config.status_sweep_every,
        shutdown.clone(),
    ));
    tokio::spawn(run_revocation_listener(
        engine.gates.clone(),
        dispatcher.receiver(),
        shutdown.clone(),
    ));

    let app_state: AppState = Arc::new(AppStateInner {
        engine,
        jwt_secret: config.jwt_secret.clone(),
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(ServerState {
            dispatcher,
            db,
            jwt_secret: config.jwt_secret.clone(),
        });

    let app = cloak_api::router(app_state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Cloak server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

fn bootstrap_admin(db: &Database, handle: &str) -> anyhow::Result<()> {
    match db.get_user_by_username(handle.trim())? {
        Some(user) => {
            if db.grant_role(&user.id, Role::Admin.as_str())? {
                info!(user_id = %user.id, "Granted admin to {}", user.username);
            }
        }
        None => warn!("CLOAK_BOOTSTRAP_ADMIN names unknown user {}", handle),
    }
    Ok(())
}

async fn ws_upgrade(
    State(state): State<ServerState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.db, state.jwt_secret)
    })
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
    shutdown.cancel();
}
