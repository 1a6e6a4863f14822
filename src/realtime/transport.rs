//! Realtime transport seam
//!
//! The session manager owns a [`Connection`] obtained from a
//! [`Transport`]. Production uses [`WsTransport`] over tokio-tungstenite;
//! tests inject a fake so the state machine can be driven without a
//! network.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ClientError;
use crate::realtime::stomp::Frame;

/// One decoded inbound transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A full STOMP frame
    Frame(Frame),
    /// A keep-alive (LF frame or websocket ping/pong)
    Heartbeat,
}

/// Opens physical connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to the given URL.
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ClientError>;
}

/// One open physical connection.
#[async_trait]
pub trait Connection: Send {
    /// Send one frame.
    async fn send(&mut self, frame: &Frame) -> Result<(), ClientError>;

    /// Send a keep-alive.
    async fn send_heartbeat(&mut self) -> Result<(), ClientError>;

    /// Receive the next inbound event. `None` means the peer closed the
    /// connection.
    async fn recv(&mut self) -> Option<Result<InboundEvent, ClientError>>;

    /// Close the connection. Best-effort.
    async fn close(&mut self);
}

/// Production websocket transport.
#[derive(Debug, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ClientError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|err| ClientError::transport(format!("websocket connect failed: {}", err)))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, frame: &Frame) -> Result<(), ClientError> {
        self.stream
            .send(Message::Text(frame.encode().into()))
            .await
            .map_err(|err| ClientError::transport(format!("websocket send failed: {}", err)))
    }

    async fn send_heartbeat(&mut self) -> Result<(), ClientError> {
        self.stream
            .send(Message::Text("\n".into()))
            .await
            .map_err(|err| ClientError::transport(format!("websocket send failed: {}", err)))
    }

    async fn recv(&mut self) -> Option<Result<InboundEvent, ClientError>> {
        loop {
            return match self.stream.next().await? {
                Ok(Message::Text(text)) => match Frame::parse(text.as_str()) {
                    Ok(Some(frame)) => Some(Ok(InboundEvent::Frame(frame))),
                    Ok(None) => Some(Ok(InboundEvent::Heartbeat)),
                    Err(err) => Some(Err(ClientError::protocol(format!(
                        "unparseable frame: {}",
                        err
                    )))),
                },
                // tungstenite answers pings on its own; both directions
                // still count as liveness.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Some(Ok(InboundEvent::Heartbeat)),
                Ok(Message::Close(_)) => None,
                Ok(Message::Binary(_)) | Ok(Message::Frame(_)) => continue,
                Err(err) => Some(Err(ClientError::transport(format!(
                    "websocket read failed: {}",
                    err
                )))),
            };
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
