//! Serving a mock API on its port.
//!
//! The supervisor only sees [`InstanceLauncher`]; [`TaskLauncher`] is the in-process
//! implementation that runs each instance as a tokio task with its own listener.

use super::handler::{handle_mock_request, MockApp};
use super::InstanceError;
use crate::mock_api::MockApiConfig;
use crate::repository::RequestLogSink;
use async_trait::async_trait;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Starts a server for a mock API on an already allocated port.
#[async_trait]
pub trait InstanceLauncher: Send + Sync {
    async fn launch(
        &self,
        config: Arc<MockApiConfig>,
        port: u16,
    ) -> Result<ServerHandle, InstanceError>;
}

/// How a server stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// In-flight connections drained within the grace period
    Graceful,
    /// The task was aborted
    Forced,
}

/// Owning handle to a running server task.
///
/// Dropping the handle closes the shutdown channel, which also stops the server.
#[derive(Debug)]
pub struct ServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn new(shutdown_tx: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }

    /// True once the server task has returned or panicked.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal shutdown and wait up to `grace` for connections to drain.
    ///
    /// A zero grace aborts immediately.
    pub async fn shutdown(mut self, grace: Duration) -> StopOutcome {
        if let Some(tx) = self.shutdown_tx.take() {
            // Receiver is gone if the task already ended
            let _ = tx.send(());
        }

        if grace.is_zero() {
            self.task.abort();
            let _ = (&mut self.task).await;
            return StopOutcome::Forced;
        }

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => StopOutcome::Graceful,
            Ok(Err(e)) => {
                warn!("Server task ended abnormally: {}", e);
                StopOutcome::Graceful
            }
            Err(_) => {
                self.task.abort();
                let _ = (&mut self.task).await;
                StopOutcome::Forced
            }
        }
    }
}

/// Runs every instance as a task in this process.
pub struct TaskLauncher {
    bind_host: String,
    log_sink: Arc<dyn RequestLogSink>,
}

impl TaskLauncher {
    pub fn new(bind_host: impl Into<String>, log_sink: Arc<dyn RequestLogSink>) -> Self {
        Self {
            bind_host: bind_host.into(),
            log_sink,
        }
    }
}

#[async_trait]
impl InstanceLauncher for TaskLauncher {
    async fn launch(
        &self,
        config: Arc<MockApiConfig>,
        port: u16,
    ) -> Result<ServerHandle, InstanceError> {
        let app = Arc::new(MockApp::new(config, port, Arc::clone(&self.log_sink))?);

        let listener = TcpListener::bind((self.bind_host.as_str(), port))
            .await
            .map_err(|source| InstanceError::Bind { port, source })?;
        info!(api_id = %app.api_id(), "Mock server bound to {}:{}", self.bind_host, port);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(serve(listener, app, shutdown_rx));
        Ok(ServerHandle::new(shutdown_tx, task))
    }
}

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Waits out a failed accept (fd exhaustion and the like). Returns true if
/// shutdown was signalled in the meantime.
async fn pause_after_accept_error(shutdown_rx: &mut oneshot::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => false,
        _ = shutdown_rx => true,
    }
}

/// Accept loop. Returns once shutdown is signalled and open connections have drained.
pub async fn serve(listener: TcpListener, app: Arc<MockApp>, mut shutdown_rx: oneshot::Receiver<()>) {
    let graceful = GracefulShutdown::new();
    let port = app.port();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(port, "Accepted connection from {}", addr);
                        let app = Arc::clone(&app);
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { handle_mock_request(req, app).await }
                        });
                        let conn = graceful.watch(http1::Builder::new().serve_connection(io, service));
                        tokio::spawn(async move {
                            if let Err(e) = conn.await {
                                debug!("Connection error on port {}: {}", port, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error on port {}: {}", port, e);
                        if pause_after_accept_error(&mut shutdown_rx).await {
                            info!(api_id = %app.api_id(), "Mock server on port {} shutting down", port);
                            break;
                        }
                    }
                }
            }
            _ = &mut shutdown_rx => {
                info!(api_id = %app.api_id(), "Mock server on port {} shutting down", port);
                break;
            }
        }
    }

    drop(listener);
    graceful.shutdown().await;
    debug!(port, "All connections closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::NoOpLogSink;

    fn empty_api() -> Arc<MockApiConfig> {
        Arc::new(MockApiConfig {
            id: "empty".to_string(),
            name: String::new(),
            endpoints: vec![],
        })
    }

    #[tokio::test]
    async fn test_accept_error_pause_waits_backoff() {
        let (_tx, mut rx) = oneshot::channel::<()>();
        let started = tokio::time::Instant::now();
        assert!(!pause_after_accept_error(&mut rx).await);
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn test_accept_error_pause_ends_on_shutdown() {
        let (tx, mut rx) = oneshot::channel();
        tx.send(()).unwrap();
        let started = tokio::time::Instant::now();
        assert!(pause_after_accept_error(&mut rx).await);
        assert!(started.elapsed() < ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn test_handle_reports_finished_task() {
        let (tx, _rx) = oneshot::channel();
        let handle = ServerHandle::new(tx, tokio::spawn(async {}));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.is_finished());
        assert_eq!(
            handle.shutdown(Duration::from_millis(50)).await,
            StopOutcome::Graceful
        );
    }

    #[tokio::test]
    async fn test_shutdown_forces_stuck_task() {
        let (tx, _rx) = oneshot::channel();
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let handle = ServerHandle::new(tx, task);
        assert_eq!(
            handle.shutdown(Duration::from_millis(20)).await,
            StopOutcome::Forced
        );
    }

    #[tokio::test]
    async fn test_shutdown_signals_task() {
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _ = rx.await;
        });
        let handle = ServerHandle::new(tx, task);
        assert_eq!(
            handle.shutdown(Duration::from_secs(1)).await,
            StopOutcome::Graceful
        );
    }

    #[tokio::test]
    async fn test_launch_reports_taken_port() {
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let launcher = TaskLauncher::new("127.0.0.1", Arc::new(NoOpLogSink));
        let err = launcher.launch(empty_api(), port).await.unwrap_err();
        assert!(matches!(err, InstanceError::Bind { port: p, .. } if p == port));
    }

    #[tokio::test]
    async fn test_launched_server_stops_gracefully() {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let launcher = TaskLauncher::new("127.0.0.1", Arc::new(NoOpLogSink));
        let handle = launcher.launch(empty_api(), port).await.unwrap();
        assert!(!handle.is_finished());
        assert_eq!(
            handle.shutdown(Duration::from_secs(1)).await,
            StopOutcome::Graceful
        );

        // The port is free again once the handle has shut down
        assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());
    }
}
