//! Event transport to the `/chat` channel
//!
//! `Connector` opens a fresh `Transport`; the reconnect driver only talks to
//! these traits so it can be exercised without a server.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use helpline_shared::{ClientEvent, ServerEvent};

use crate::error::ClientError;

#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), ClientError>;

    /// Next event from the server. `None` once the connection is gone.
    async fn next_event(&mut self) -> Option<Result<ServerEvent, ClientError>>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;

    async fn connect(&self) -> Result<Self::Transport, ClientError>;
}

/// Connects to `ws[s]://host/chat?token=...`
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// `base_url` is the `ws://` or `wss://` origin of the coordinator
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            url: format!("{}/chat?token={}", base_url.trim_end_matches('/'), token),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self) -> Result<WsTransport, ClientError> {
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        Ok(WsTransport { socket })
    }
}

pub struct WsTransport {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), ClientError> {
        let json = serde_json::to_string(event)?;
        self.socket
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<Result<ServerEvent, ClientError>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(&text).map_err(ClientError::from));
                }
                Ok(Message::Close(_)) => return None,
                // Pings are answered by tungstenite; binary frames are not part of the protocol
                Ok(_) => continue,
                Err(e) => return Some(Err(ClientError::Transport(e.to_string()))),
            }
        }
    }
}
