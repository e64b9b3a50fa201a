//! Demo web server wiring the session registry, auth flow and transport.
//!
//! Run with: cargo run -p web-server-demo -- [config.toml]
//!
//! Then open http://localhost:3000 in your browser.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{Router, response::Html, routing::get};
use session_channel_auth::{AuthFlow, Config, make_url_path};
use session_channel_registry::RuntimeHandle;
use session_channel_transport::websocket::{WsState, create_router};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("session-channel.toml"), PathBuf::from);
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let runtime = RuntimeHandle::new();
    runtime.init();
    let auth = Arc::new(AuthFlow::from_config(&config, runtime.clone()));

    let index = make_url_path(&config.server.base_url_path, "/");
    let app = Router::new()
        .route(&index, get(index_handler))
        .merge(create_router(WsState::new(runtime.clone(), auth)))
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Server listening on http://{addr}{index}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    runtime.teardown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutting down");
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Session Channel</title>
    <style>
        body { font-family: monospace; margin: 2em; }
        #log { white-space: pre; border: 1px solid #ccc; padding: 1em; min-height: 10em; }
    </style>
</head>
<body>
    <input id="provider" value="google">
    <button id="login">Log in</button>
    <button id="logout">Log out</button>
    <div id="log"></div>
    <script>
        const log = (line) => { document.getElementById('log').textContent += line + '\n'; };
        const base = location.pathname.replace(/\/$/, '');
        const ws = new WebSocket(`ws://${location.host}${base}/ws`);
        ws.onmessage = (event) => {
            const msg = JSON.parse(event.data);
            log(event.data);
            if (msg.type === 'forward' && msg.msg.type === 'auth_redirect') {
                log('redirect -> ' + msg.msg.url);
            }
        };
        ws.onclose = () => log('disconnected');
        document.getElementById('login').onclick = () => {
            const provider = document.getElementById('provider').value;
            ws.send(JSON.stringify({ type: 'login', provider }));
        };
        document.getElementById('logout').onclick = () => {
            ws.send(JSON.stringify({ type: 'logout' }));
        };
        setInterval(() => ws.readyState === 1 && ws.send('{"type":"ping"}'), 30000);
    </script>
</body>
</html>
"#;
