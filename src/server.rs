//! HTTP/1 server loop and process shutdown signals.

use std::convert::Infallible;
use std::future::Future;
use std::io;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use kumagate_core::MonitorService;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::routes;

/// Which signal asked the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Ctrl-C / SIGINT.
    Interrupt,
    /// SIGTERM, as sent by service managers and container runtimes.
    Terminate,
}

/// Listen for the signals that stop the gateway.
///
/// The SIGTERM handler is installed before this returns, so a signal sent
/// after the call is never lost. The returned future resolves with the
/// first signal received.
#[cfg(unix)]
pub fn shutdown_signal() -> io::Result<impl Future<Output = Shutdown>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(error = %e, "Ctrl-C handler failed");
                }
                Shutdown::Interrupt
            }
            _ = terminate.recv() => Shutdown::Terminate,
        }
    })
}

/// Listen for Ctrl-C, the only stop signal outside unix.
#[cfg(not(unix))]
pub fn shutdown_signal() -> io::Result<impl Future<Output = Shutdown>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler failed");
        }
        Shutdown::Interrupt
    })
}

/// Accept connections until `shutdown` resolves.
///
/// Each connection is served on its own task. Connections still open at
/// shutdown are left to finish on their own.
pub async fn serve(
    listener: TcpListener,
    service: MonitorService,
    shutdown: impl Future<Output = ()>,
) -> io::Result<()> {
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = &mut shutdown => {
                info!("HTTP server shutting down");
                return Ok(());
            }
        };
        debug!(%peer, "Accepted connection");

        let io = TokioIo::new(stream);
        let service = service.clone();

        tokio::spawn(async move {
            let handler = service_fn(move |req: Request<hyper::body::Incoming>| {
                let service = service.clone();
                async move { Ok::<_, Infallible>(routes::handle(&service, req).await) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, handler).await {
                warn!(%peer, error = %e, "HTTP connection error");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kumagate_client::mock::MockTransport;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_serves_health_over_tcp() {
        let mock = MockTransport::new();
        let service = MonitorService::builder().transport_factory(mock.factory()).build();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(serve(listener, service, async {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.contains("\"message\":\"API is running\""));
        assert!(raw.to_ascii_lowercase().contains("access-control-allow-origin: *"));

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_requests_shutdown() {
        let signal = shutdown_signal().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let received = tokio::time::timeout(std::time::Duration::from_secs(5), signal)
            .await
            .unwrap();
        assert_eq!(received, Shutdown::Terminate);
    }
}
