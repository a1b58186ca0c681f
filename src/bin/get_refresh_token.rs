use anyhow::{Context, anyhow, bail};
use axum::{Router, extract::Query, response::Html, routing::get};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// One-time OAuth consent flow that prints a Google refresh token.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// OAuth client secrets downloaded from the Google Cloud console
    #[arg(long, default_value = "client_secrets.json")]
    client_secrets: PathBuf,

    /// Local port for the consent redirect
    #[arg(short, long, default_value_t = 5000)]
    port: u16,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

#[derive(Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    refresh_token: Option<String>,
}

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "get_refresh_token=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let raw = tokio::fs::read_to_string(&args.client_secrets)
        .await
        .with_context(|| format!("reading {}", args.client_secrets.display()))?;
    let file: ClientSecretsFile =
        serde_json::from_str(&raw).context("client secrets file is not valid JSON")?;
    let secrets = file
        .installed
        .or(file.web)
        .ok_or_else(|| anyhow!("client secrets must contain an 'installed' or 'web' section"))?;

    let redirect_uri = format!("http://localhost:{}/", args.port);
    let csrf_state = Uuid::new_v4().to_string();

    let auth_url = url::Url::parse_with_params(
        secrets.auth_uri.as_deref().unwrap_or(DEFAULT_AUTH_URI),
        &[
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", DRIVE_FILE_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", csrf_state.as_str()),
        ],
    )?;

    let (tx, rx) = oneshot::channel::<CallbackParams>();
    let sender: CallbackSender = Arc::new(Mutex::new(Some(tx)));

    let app = Router::new().route(
        "/",
        get(move |Query(params): Query<CallbackParams>| {
            let sender = sender.clone();
            async move {
                if let Some(tx) = sender.lock().ok().and_then(|mut guard| guard.take()) {
                    let _ = tx.send(params);
                }
                Html("Authorization received. You can close this window.")
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    println!("Open this URL in your browser to authorize Google Drive access:\n\n{}\n", auth_url);
    info!("Waiting for the consent redirect on {}", redirect_uri);

    let params = rx.await.context("consent listener stopped before a redirect arrived")?;
    let _ = stop_tx.send(());
    let _ = server.await;

    if let Some(error) = params.error {
        bail!("authorization was denied: {}", error);
    }
    if params.state.as_deref() != Some(csrf_state.as_str()) {
        bail!("state mismatch in consent redirect");
    }
    let code = params
        .code
        .ok_or_else(|| anyhow!("consent redirect carried no authorization code"))?;

    let response = reqwest::Client::new()
        .post(secrets.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        bail!("token exchange failed with {}: {}", status, body);
    }

    let tokens: TokenResponse = response.json().await?;
    match tokens.refresh_token {
        Some(refresh_token) => {
            println!("Refresh Token: {}", refresh_token);
            info!("Set GOOGLE_REFRESH_TOKEN to the value above.");
            Ok(())
        }
        None => bail!("Google returned no refresh token; revoke the app's access and retry"),
    }
}
