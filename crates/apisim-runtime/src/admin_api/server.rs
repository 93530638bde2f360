//! Admin API server.

use crate::admin_api::router::route_request;
use crate::backends::MemoryLogSink;
use crate::supervisor::Supervisor;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Shared state handed to every admin request.
pub struct AdminState {
    pub supervisor: Arc<Supervisor>,
    /// Ring buffer backing `GET /logs`
    pub log_sink: Arc<MemoryLogSink>,
}

/// Admin API server for apisim
pub struct AdminApiServer {
    addr: SocketAddr,
    state: Arc<AdminState>,
}

impl AdminApiServer {
    /// Create a new admin API server
    pub fn new(addr: SocketAddr, supervisor: Arc<Supervisor>, log_sink: Arc<MemoryLogSink>) -> Self {
        Self {
            addr,
            state: Arc::new(AdminState {
                supervisor,
                log_sink,
            }),
        }
    }

    /// Bind the configured address and serve until the task is dropped
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        info!("apisim Admin API listening on http://{}", listener.local_addr()?);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { route_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Admin API connection error: {}", e);
                }
            });
        }
    }
}
