use clap::Parser;
use dotenvy::dotenv;
use producer::cli::{Cli, Command};
use producer::config::ProducerConfig;
use producer::infrastructure::storage;
use producer::services::endpoint_pool::{EndpointPool, ProbeSettings};
use producer::{ApiDoc, AppState, DEFAULT_LOG_FILTER, create_app};
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    if cli.command == Some(Command::Openapi) {
        println!("{}", ApiDoc::openapi().to_pretty_json()?);
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting producer...");

    let config = ProducerConfig::load(cli.port);
    info!(
        "🛡️  Upload Config: Body Limit={}MB, Default Expiration={}s, Admin Token={}",
        config.upload.body_limit / 1024 / 1024,
        config.upload.default_expiration_secs,
        if config.upload.admin_token.is_empty() {
            "unset"
        } else {
            "set"
        }
    );

    // Fatal here: no endpoint configured or none answering.
    let endpoints = storage::setup_endpoints(&config.s3).await?;
    let pool = Arc::new(EndpointPool::connect(endpoints, ProbeSettings::from(&config.s3)).await?);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let reprobe_handle = tokio::spawn(pool.clone().run_refresh(shutdown_rx));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let addr = config.listen.addr();
    let state = AppState::new(pool, config);
    let app = create_app(state).layer(trace_layer);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("✅ Listening on: http://{}", addr);
    info!("📖 Swagger UI documentation: http://{}/swagger-ui", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Server runtime error: {}", e);
    }

    info!("🛑 Shutting down...");
    let _ = shutdown_tx.send(true);
    let _ = reprobe_handle.await;

    info!("👋 Exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
