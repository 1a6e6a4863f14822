//! Shared test fixtures
//!
//! An in-memory transport for driving the realtime session manager
//! without a network. Each accepted connection hands the test a
//! [`RemoteHandle`] playing the broker's side: it observes every frame
//! the client writes and can push inbound events, errors, or a close.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use gonggu_client::error::ClientError;
use gonggu_client::realtime::{Command, Connection, Frame, InboundEvent, Transport};

/// Something the client wrote to a fake connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentItem {
    Frame(Frame),
    Heartbeat,
}

/// Broker side of one accepted fake connection.
///
/// Dropping the handle drops the broker's inbound sender, which the
/// client observes as the peer closing the connection.
pub struct RemoteHandle {
    inbound: mpsc::UnboundedSender<Result<InboundEvent, ClientError>>,
    sent: mpsc::UnboundedReceiver<SentItem>,
}

impl RemoteHandle {
    /// Push a frame to the client.
    pub fn push_frame(&self, frame: Frame) {
        let _ = self.inbound.send(Ok(InboundEvent::Frame(frame)));
    }

    /// Push a keep-alive to the client.
    pub fn push_heartbeat(&self) {
        let _ = self.inbound.send(Ok(InboundEvent::Heartbeat));
    }

    /// Push a chat MESSAGE frame for a room.
    pub fn push_message(&self, room_id: i64, sender: &str, content: &str) {
        let body = format!(
            r#"{{"roomId":{room_id},"senderId":1,"senderNickname":"{sender}","content":"{content}","timestamp":"2026-01-01T00:00:00Z"}}"#
        );
        self.push_frame(
            Frame::new(Command::Message)
                .with_header("destination", format!("/topic/chat/{}", room_id))
                .with_header("content-type", "application/json")
                .with_body(body),
        );
    }

    /// Next item the client wrote, or `None` once the client hung up.
    pub async fn next_sent(&mut self) -> Option<SentItem> {
        self.sent.recv().await
    }

    /// Next *frame* the client wrote with the given command, skipping
    /// heartbeats and other frames. Panics after a short wait so a missing
    /// frame fails the test instead of hanging it.
    pub async fn expect_frame(&mut self, command: Command) -> Frame {
        let deadline = Duration::from_secs(5);
        let result = tokio::time::timeout(deadline, async {
            loop {
                match self.sent.recv().await {
                    Some(SentItem::Frame(frame)) if frame.command() == command => return frame,
                    Some(_) => continue,
                    None => panic!("client hung up while waiting for {} frame", command),
                }
            }
        })
        .await;
        match result {
            Ok(frame) => frame,
            Err(_) => panic!("no {} frame within {:?}", command, deadline),
        }
    }
}

/// In-memory [`Transport`]. Records the time of every connect attempt and
/// can be told to refuse the next N attempts.
pub struct FakeTransport {
    fail_remaining: AtomicU32,
    connect_times: Mutex<Vec<Instant>>,
    accepted: mpsc::UnboundedSender<RemoteHandle>,
}

impl FakeTransport {
    /// Transport plus the stream of broker handles for each accepted
    /// connection.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteHandle>) {
        let (accepted, handles) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                fail_remaining: AtomicU32::new(0),
                connect_times: Mutex::new(Vec::new()),
                accepted,
            }),
            handles,
        )
    }

    /// Refuse the next `n` connect attempts. `u32::MAX` refuses forever.
    pub fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Timestamps of every connect attempt so far.
    pub fn connect_times(&self) -> Vec<Instant> {
        self.connect_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Connection>, ClientError> {
        self.connect_times.lock().unwrap().push(Instant::now());

        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.fail_remaining.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(ClientError::transport("connection refused"));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let _ = self.accepted.send(RemoteHandle {
            inbound: inbound_tx.clone(),
            sent: sent_rx,
        });
        Ok(Box::new(FakeConnection {
            inbound: inbound_rx,
            sent: sent_tx,
            handshake: Some(inbound_tx),
        }))
    }
}

struct FakeConnection {
    inbound: mpsc::UnboundedReceiver<Result<InboundEvent, ClientError>>,
    sent: mpsc::UnboundedSender<SentItem>,
    // Answers the CONNECT frame with CONNECTED, then drops this sender so
    // connection liveness tracks the RemoteHandle alone.
    handshake: Option<mpsc::UnboundedSender<Result<InboundEvent, ClientError>>>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn send(&mut self, frame: &Frame) -> Result<(), ClientError> {
        let _ = self.sent.send(SentItem::Frame(frame.clone()));
        if frame.command() == Command::Connect {
            if let Some(tx) = self.handshake.take() {
                let connected = Frame::new(Command::Connected)
                    .with_header("version", "1.2")
                    .with_header("heart-beat", "4000,4000");
                let _ = tx.send(Ok(InboundEvent::Frame(connected)));
            }
        }
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<(), ClientError> {
        let _ = self.sent.send(SentItem::Heartbeat);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<InboundEvent, ClientError>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}
