//! Transport driver pairing one TCP stream with one [`Session`].
//!
//! All protocol judgement lives in the session; this layer only moves bytes.
//! Reads happen inside [`Connection::tick`] under a short poll window so the
//! caller keeps control of its loop even when the broker is silent.

use crate::client::error::ClientError;
use crate::client::session::{ConnectionState, Session, SessionEvent};
use bytes::Bytes;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

pub struct Connection {
    session: Session,
    stream: Option<TcpStream>,
    poll_window: Duration,
}

impl Connection {
    /// Dials the broker and sends CONNECT. The handshake completes later,
    /// when [`Connection::tick`] reads the CONNACK.
    pub async fn open(
        host: &str,
        port: u16,
        client_id: &str,
        keepalive_secs: u16,
        poll_window: Duration,
    ) -> Result<Self, ClientError> {
        let dial = TcpStream::connect((host, port));
        let mut stream = if keepalive_secs > 0 {
            let window = Duration::from_secs(u64::from(keepalive_secs));
            tokio::time::timeout(window, dial)
                .await
                .map_err(|_| ClientError::ConnectTimeout)??
        } else {
            dial.await?
        };

        let mut session = Session::new(client_id, keepalive_secs, Instant::now());
        let connect = session.start_connect(Instant::now())?;
        stream.write_all(&connect).await?;
        info!("CONNECT sent to {}:{}, awaiting CONNACK", host, port);

        Ok(Self {
            session,
            stream: Some(stream),
            poll_window,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    fn drop_transport(&mut self) {
        self.stream = None;
        self.session.mark_disconnected();
    }

    async fn send(&mut self, bytes: Bytes) -> Result<(), ClientError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ClientError::NotConnected);
        };
        if let Err(e) = stream.write_all(&bytes).await {
            self.drop_transport();
            return Err(ClientError::Transport(e));
        }
        Ok(())
    }

    /// One scheduler round: poll the socket for up to the poll window, feed
    /// whatever arrived to the session, then let the session check its
    /// keepalive deadlines. Returns the session events produced by this
    /// round. Errors mean the connection is gone.
    pub async fn tick(&mut self) -> Result<Vec<SessionEvent>, ClientError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ClientError::NotConnected);
        };

        let mut chunk = [0u8; 4096];
        let mut events = Vec::new();
        match tokio::time::timeout(self.poll_window, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => {
                debug!("broker closed the stream");
                self.drop_transport();
                return Err(ClientError::ConnectionClosed);
            }
            Ok(Ok(n)) => match self.session.receive(&chunk[..n], Instant::now()) {
                Ok(produced) => events = produced,
                Err(e) => {
                    self.drop_transport();
                    return Err(e);
                }
            },
            Ok(Err(e)) => {
                self.drop_transport();
                return Err(ClientError::Transport(e));
            }
            // Poll window elapsed with nothing to read.
            Err(_) => {}
        }

        match self.session.poll_keepalive(Instant::now()) {
            Ok(Some(ping)) => self.send(ping).await?,
            Ok(None) => {}
            Err(e) => {
                self.drop_transport();
                return Err(e);
            }
        }

        Ok(events)
    }

    /// Fire-and-forget QoS 0 publish.
    pub async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ClientError> {
        let bytes = self.session.publish(topic, payload, Instant::now())?;
        self.send(bytes).await
    }

    pub async fn subscribe(&mut self, filter: &str) -> Result<(), ClientError> {
        let bytes = self.session.subscribe(filter, Instant::now())?;
        self.send(bytes).await
    }

    /// Sends DISCONNECT and shuts the stream down. Safe to call repeatedly;
    /// only the first call on a live session emits anything.
    pub async fn close(&mut self) {
        let Some(bytes) = self.session.disconnect() else {
            return;
        };
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        if let Err(e) = stream.write_all(&bytes).await {
            debug!("DISCONNECT not delivered: {}", e);
        }
        if let Err(e) = stream.shutdown().await {
            debug!("stream shutdown failed: {}", e);
        }
        self.stream = None;
        info!("connection closed");
    }
}
