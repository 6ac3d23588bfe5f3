use anyhow::{Context, Result};
use clap::Parser;
use kumagate::config::{Args, Settings};
use kumagate::server::{self, Shutdown};
use kumagate_core::MonitorService;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let settings = Settings::load(&args)?;

    let service = MonitorService::builder()
        .url(settings.kuma.url.clone())
        .credentials(settings.kuma.username.clone(), settings.kuma.password.clone())
        .rpc_timeout(settings.kuma.rpc_timeout())
        .list_timeout(settings.kuma.list_timeout())
        .build();

    let listener = TcpListener::bind(("0.0.0.0", settings.port))
        .await
        .with_context(|| format!("Failed to listen on port {}", settings.port))?;
    info!(port = settings.port, "API server running on http://localhost:{}", settings.port);

    let shutdown = server::shutdown_signal().context("Failed to listen for shutdown signals")?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(server::serve(listener, service.clone(), async {
        let _ = stop_rx.await;
    }));

    info!(url = %settings.kuma.url, "Connecting to Uptime Kuma");
    let starter = {
        let service = service.clone();
        tokio::spawn(async move { service.start().await })
    };

    match shutdown.await {
        Shutdown::Interrupt => info!("Received Ctrl-C, shutting down"),
        Shutdown::Terminate => info!("Received SIGTERM, shutting down"),
    }

    starter.abort();
    let _ = stop_tx.send(());
    service.stop().await;
    server.await.context("HTTP server task failed")??;

    Ok(())
}
