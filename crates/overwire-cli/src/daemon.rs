//! Daemon mode: hosts the engine behind the IPC socket.
//!
//! Each accepted connection is served by its own task; commands and events
//! go through the command router, a subscribing connection is switched into
//! notification streaming.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use overwire_engine::{CommandRouter, Engine, MemoryRuleHost};
use overwire_proto::{CommandResponse, NetworkEvent};
use overwire_store::FileBackend;

use crate::ipc::{IpcConnection, IpcRequest, IpcServer};

/// Daemon configuration.
pub struct DaemonConfig {
    /// Directory holding the persisted state records.
    pub state_dir: PathBuf,
    /// Socket path the IPC server binds.
    pub socket_path: PathBuf,
    /// Keep previously captured requests instead of starting fresh.
    pub keep_requests: bool,
}

/// Build the engine the daemon serves.
pub fn build_engine(state_dir: &Path) -> Result<Arc<Engine>> {
    let backend = Arc::new(FileBackend::new(state_dir)?);
    let host = Arc::new(MemoryRuleHost::new());
    Ok(Arc::new(Engine::new(backend, host)))
}

/// Run the daemon until the process is stopped.
pub async fn run(config: DaemonConfig) -> Result<()> {
    let engine = build_engine(&config.state_dir)?;

    if config.keep_requests {
        info!("keeping previously captured requests");
    } else {
        // Fresh start: captures from the previous run are stale, but the
        // user's patterns survive restarts
        engine.clear_all_requests().await?;
        info!("cleared captured requests for fresh start");
    }

    let router = Arc::new(CommandRouter::new(engine));
    let server = IpcServer::bind_to(&config.socket_path).await?;
    info!(socket = ?server.path(), state_dir = ?config.state_dir, "daemon listening");

    loop {
        match server.accept().await {
            Ok(conn) => {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(conn, router).await {
                        debug!("connection closed with error: {}", e);
                    }
                });
            }
            Err(e) => {
                warn!("failed to accept IPC connection: {}", e);
            }
        }
    }
}

async fn serve_connection(mut conn: IpcConnection, router: Arc<CommandRouter>) -> Result<()> {
    while let Some(request) = conn.recv().await? {
        match request {
            IpcRequest::Command { command } => {
                let response = router.dispatch(command).await;
                conn.send(&response).await?;
            }
            IpcRequest::Event { event } => {
                let result = match &event {
                    NetworkEvent::BeforeRequest(ev) => {
                        router.engine().on_before_request(ev).await
                    }
                    NetworkEvent::Completed(ev) => {
                        router.engine().on_request_completed(ev).await
                    }
                };
                let response = match result {
                    Ok(()) => CommandResponse::ok(),
                    Err(e) => {
                        warn!("event handling failed: {}", e);
                        CommandResponse::err("Internal storage error")
                    }
                };
                conn.send(&response).await?;
            }
            IpcRequest::Subscribe => {
                let mut notifications = router.engine().subscribe();
                debug!("connection switched to notification streaming");
                while let Ok(note) = notifications.recv().await {
                    if conn.send_notification(&note).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }
    Ok(())
}
