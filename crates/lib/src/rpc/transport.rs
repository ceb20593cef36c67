//! Unix domain socket transport upgraded to WebSocket framing.

use crate::rpc::client::ClientError;
use std::path::PathBuf;
use tokio::net::UnixStream;
use tokio_tungstenite::WebSocketStream;

pub type EdgeSocket = WebSocketStream<UnixStream>;

/// Address of an Edge Core endpoint: socket path plus logical API path (e.g. `/1/pt`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub socket_path: PathBuf,
    pub api_path: String,
}

impl Locator {
    pub fn new(socket_path: impl Into<PathBuf>, api_path: impl Into<String>) -> Self {
        let api_path = api_path.into();
        let api_path = if api_path.starts_with('/') {
            api_path
        } else {
            format!("/{}", api_path)
        };
        Self {
            socket_path: socket_path.into(),
            api_path,
        }
    }

    /// `ws+unix://<socket>:<path>` form, for log lines.
    pub fn display_url(&self) -> String {
        format!("ws+unix://{}:{}", self.socket_path.display(), self.api_path)
    }

    /// URL sent in the WebSocket handshake. The host is not used for routing on a Unix socket.
    pub fn handshake_url(&self) -> String {
        format!("ws://localhost{}", self.api_path)
    }
}

/// Connect the Unix stream and run the WebSocket client handshake. No timeout beyond what the OS applies.
pub async fn open(locator: &Locator) -> Result<EdgeSocket, ClientError> {
    let stream = UnixStream::connect(&locator.socket_path)
        .await
        .map_err(|e| {
            ClientError::Connection(format!("{}: {}", locator.socket_path.display(), e))
        })?;
    let (socket, _) = tokio_tungstenite::client_async(locator.handshake_url(), stream)
        .await
        .map_err(|e| ClientError::Connection(format!("websocket handshake failed: {}", e)))?;
    Ok(socket)
}
