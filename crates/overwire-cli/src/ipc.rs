//! IPC between the overwire daemon and its clients.
//!
//! The daemon listens on a Unix domain socket; clients (the UI, the
//! page-shim forwarder, this CLI) connect and speak newline-delimited JSON.
//! Each request line carries either a command from the catalogue or a
//! network-observation event; replies reuse the uniform command response
//! shape. A subscribing client instead receives a stream of notification
//! lines until it disconnects.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use overwire_proto::{Command, CommandResponse, NetworkEvent, Notification};

/// A single request line from a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IpcRequest {
    /// A command from the UI catalogue.
    Command { command: Command },

    /// A network-observation event from the host adapter.
    Event { event: NetworkEvent },

    /// Switch this connection into notification streaming.
    Subscribe,
}

/// Default path of the daemon socket.
pub fn socket_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".overwire").join("daemon.sock"))
}

/// Client side of the IPC socket.
pub struct IpcClient {
    stream: BufReader<UnixStream>,
}

impl IpcClient {
    /// Connect to the daemon at the default socket path.
    pub async fn connect() -> Result<Self> {
        Self::connect_to(&socket_path()?).await
    }

    /// Connect to a specific socket path.
    pub async fn connect_to(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .await
            .with_context(|| format!("Failed to connect to daemon socket at {:?}", path))?;
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    /// Send one request and read its reply.
    pub async fn request(&mut self, request: &IpcRequest) -> Result<CommandResponse> {
        let mut json = serde_json::to_string(request)?;
        json.push('\n');

        self.stream
            .get_mut()
            .write_all(json.as_bytes())
            .await
            .context("Failed to send request")?;
        self.stream
            .get_mut()
            .flush()
            .await
            .context("Failed to flush request")?;

        let mut line = String::new();
        self.stream
            .read_line(&mut line)
            .await
            .context("Failed to read response")?;

        serde_json::from_str(&line).context("Failed to parse response")
    }

    /// Enter notification streaming; read one notification at a time.
    pub async fn subscribe(mut self) -> Result<IpcSubscription> {
        let mut json = serde_json::to_string(&IpcRequest::Subscribe)?;
        json.push('\n');
        self.stream
            .get_mut()
            .write_all(json.as_bytes())
            .await
            .context("Failed to send subscribe request")?;
        self.stream.get_mut().flush().await?;
        Ok(IpcSubscription {
            stream: self.stream,
        })
    }
}

/// A connection switched into notification streaming.
pub struct IpcSubscription {
    stream: BufReader<UnixStream>,
}

impl IpcSubscription {
    /// Next notification; `None` once the daemon closes the connection.
    pub async fn next(&mut self) -> Result<Option<Notification>> {
        let mut line = String::new();
        let bytes = self
            .stream
            .read_line(&mut line)
            .await
            .context("Failed to read notification")?;
        if bytes == 0 {
            return Ok(None);
        }
        let note = serde_json::from_str(&line).context("Failed to parse notification")?;
        Ok(Some(note))
    }
}

/// Daemon side of the IPC socket.
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl IpcServer {
    /// Bind the default socket path.
    pub async fn bind() -> Result<Self> {
        Self::bind_to(&socket_path()?).await
    }

    /// Bind a specific socket path, taking over a stale socket if the
    /// previous daemon died without cleanup.
    pub async fn bind_to(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if path.exists() {
            match UnixStream::connect(path).await {
                Ok(_) => {
                    anyhow::bail!(
                        "Another daemon is already running (socket at {:?} is active)",
                        path
                    );
                }
                Err(_) => {
                    // Stale socket from a dead process
                    std::fs::remove_file(path)?;
                }
            }
        }

        let listener = UnixListener::bind(path)
            .with_context(|| format!("Failed to bind to socket at {:?}", path))?;

        Ok(Self {
            listener,
            socket_path: path.to_path_buf(),
        })
    }

    /// Accept an incoming client connection.
    pub async fn accept(&self) -> Result<IpcConnection> {
        let (stream, _) = self.listener.accept().await?;
        Ok(IpcConnection {
            stream: BufReader::new(stream),
        })
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

/// One accepted client connection.
pub struct IpcConnection {
    stream: BufReader<UnixStream>,
}

impl IpcConnection {
    /// Read the next request line; `None` when the client disconnects.
    pub async fn recv(&mut self) -> Result<Option<IpcRequest>> {
        let mut line = String::new();
        let bytes = self
            .stream
            .read_line(&mut line)
            .await
            .context("Failed to read request")?;
        if bytes == 0 {
            return Ok(None);
        }
        let request = serde_json::from_str(&line).context("Failed to parse request")?;
        Ok(Some(request))
    }

    /// Send a reply line.
    pub async fn send(&mut self, response: &CommandResponse) -> Result<()> {
        let mut json = serde_json::to_string(response)?;
        json.push('\n');
        self.stream
            .get_mut()
            .write_all(json.as_bytes())
            .await
            .context("Failed to send response")?;
        self.stream
            .get_mut()
            .flush()
            .await
            .context("Failed to flush response")?;
        Ok(())
    }

    /// Push a notification line to a subscribed client.
    pub async fn send_notification(&mut self, note: &Notification) -> Result<()> {
        let mut json = serde_json::to_string(note)?;
        json.push('\n');
        self.stream.get_mut().write_all(json.as_bytes()).await?;
        self.stream.get_mut().flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overwire_proto::{BeforeRequest, Command};

    #[test]
    fn test_ipc_request_serialization() {
        let req = IpcRequest::Command {
            command: Command::GetRequests,
        };
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"kind":"command","command":{"type":"GET_REQUESTS"}}"#
        );

        let req = IpcRequest::Event {
            event: NetworkEvent::BeforeRequest(BeforeRequest {
                url: "https://h/a".to_string(),
                method: "GET".to_string(),
                timestamp: 1,
                body: None,
                headers: None,
            }),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""kind":"event""#));
        assert!(json.contains(r#""type":"BEFORE_REQUEST""#));

        let req = IpcRequest::Subscribe;
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"kind":"subscribe"}"#
        );
    }

    #[test]
    fn test_ipc_request_deserialization() {
        let req: IpcRequest = serde_json::from_str(
            r#"{"kind":"command","command":{"type":"DELETE_REQUEST","requestId":"x"}}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            IpcRequest::Command {
                command: Command::DeleteRequest {
                    request_id: "x".to_string()
                }
            }
        );
    }

    #[tokio::test]
    async fn test_ipc_client_server_roundtrip() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");

        let server = IpcServer::bind_to(&socket_path).await.unwrap();

        let server_handle = tokio::spawn(async move {
            let mut conn = server.accept().await.unwrap();
            while let Some(request) = conn.recv().await.unwrap() {
                let response = match request {
                    IpcRequest::Command {
                        command: Command::GetOverrides,
                    } => CommandResponse::ok_with(serde_json::json!([])),
                    IpcRequest::Event { .. } => CommandResponse::ok(),
                    _ => CommandResponse::err("Unknown request"),
                };
                conn.send(&response).await.unwrap();
            }
        });

        let mut client = IpcClient::connect_to(&socket_path).await.unwrap();

        let response = client
            .request(&IpcRequest::Command {
                command: Command::GetOverrides,
            })
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.data, Some(serde_json::json!([])));

        // Second request on the same connection
        let response = client
            .request(&IpcRequest::Event {
                event: NetworkEvent::BeforeRequest(BeforeRequest {
                    url: "https://h/a".to_string(),
                    method: "GET".to_string(),
                    timestamp: 1,
                    body: None,
                    headers: None,
                }),
            })
            .await
            .unwrap();
        assert!(response.success);

        drop(client);
        server_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_ipc_subscription_stream() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("sub.sock");

        let server = IpcServer::bind_to(&socket_path).await.unwrap();

        let server_handle = tokio::spawn(async move {
            let mut conn = server.accept().await.unwrap();
            let request = conn.recv().await.unwrap().unwrap();
            assert_eq!(request, IpcRequest::Subscribe);

            conn.send_notification(&Notification::PatternsUpdated)
                .await
                .unwrap();
            conn.send_notification(&Notification::RequestCompleted {
                request_id: "https://h/a".to_string(),
            })
            .await
            .unwrap();
        });

        let client = IpcClient::connect_to(&socket_path).await.unwrap();
        let mut subscription = client.subscribe().await.unwrap();

        assert_eq!(
            subscription.next().await.unwrap(),
            Some(Notification::PatternsUpdated)
        );
        assert_eq!(
            subscription.next().await.unwrap(),
            Some(Notification::RequestCompleted {
                request_id: "https://h/a".to_string()
            })
        );

        server_handle.await.unwrap();
        // Server side is gone; the stream ends
        assert_eq!(subscription.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ipc_stale_socket_cleanup() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("stale.sock");

        // A stale file left behind by a dead daemon
        std::fs::write(&socket_path, "stale").unwrap();

        let server = IpcServer::bind_to(&socket_path).await.unwrap();
        assert!(socket_path.exists());

        drop(server);
        assert!(!socket_path.exists());
    }
}
