use clap::Parser;
use dotenvy::dotenv;
use pdf_renamer::config::AppConfig;
use pdf_renamer::services::drive::{CloudStorage, GoogleDriveStorage, UnconfiguredStorage};
use pdf_renamer::services::naming::OpenAiNamingAgent;
use pdf_renamer::services::rename_service::RenameService;
use pdf_renamer::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port for the HTTP server
    #[arg(short, long, default_value_t = 5000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_renamer=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting PDF Renamer...");

    let config = AppConfig::from_env();
    info!(
        "⚙️  Config: Max Size={}MB, Context={} chars, Model={}, Retries={}",
        config.max_file_size / 1024 / 1024,
        config.max_context_chars,
        config.openai_model,
        config.max_retries
    );

    // 2. Collaborators
    let naming = Arc::new(OpenAiNamingAgent::new(
        &config.openai_base_url,
        &config.openai_model,
        Duration::from_secs(config.llm_timeout_secs),
    )?);

    let storage: Arc<dyn CloudStorage> = match &config.google {
        Some(google) => {
            info!(
                "☁️  Google Drive: folder={}",
                google.folder_id.as_deref().unwrap_or("(root)")
            );
            Arc::new(GoogleDriveStorage::new(
                google.clone(),
                Duration::from_secs(config.drive_timeout_secs),
            )?)
        }
        None => {
            warn!("⚠️  GOOGLE_* credentials missing, uploads will fail until configured");
            Arc::new(UnconfiguredStorage)
        }
    };

    let rename_service = Arc::new(RenameService::new(&config, naming, storage));
    rename_service.ensure_directories().await?;
    info!(
        "📁 Staging={} Output={}",
        rename_service.upload_dir().display(),
        rename_service.output().root().display()
    );

    let state = AppState {
        rename_service,
        config,
    };

    // 3. HTTP server
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>, latency: Duration, _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
