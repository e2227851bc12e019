use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::HubError;
use crate::models::{OutboundEvent, OutboundFrame, UserId};

/// Write half of a client transport.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

pub type ConnectionId = Uuid;

/// One live client stream together with the lock that serializes writes to it.
///
/// Every writer (the hub loop, the reader task replying to a frame, the
/// heartbeat) goes through [`Connection::send`], so frames never interleave.
/// Each send is bounded by the write deadline; a send that misses it is a
/// transport failure. [`Connection::close`] is the single teardown path and
/// wakes the reader task through [`Connection::closed`].
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    writer: Mutex<FrameSink>,
    write_timeout: Duration,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl Connection {
    pub fn new(user_id: UserId, sink: FrameSink, write_timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            writer: Mutex::new(sink),
            write_timeout,
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the connection has been closed by anyone.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    pub async fn send(&self, msg: Message) -> Result<(), HubError> {
        if self.is_closed() {
            return Err(HubError::ConnectionClosed);
        }

        let write = async {
            let mut sink = self.writer.lock().await;
            sink.send(msg).await
        };

        match timeout(self.write_timeout, write).await {
            Ok(result) => result.map_err(HubError::from),
            Err(_) => Err(HubError::WriteTimeout(self.write_timeout)),
        }
    }

    pub async fn send_frame(&self, frame: &OutboundFrame) -> Result<(), HubError> {
        let text = frame.to_json()?;
        self.send(Message::Text(text)).await
    }

    pub async fn send_event(&self, event: OutboundEvent) -> Result<(), HubError> {
        self.send_frame(&OutboundFrame::new(event)).await
    }

    /// Close the stream. Only the first call does any work.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();

        let teardown = async {
            let mut sink = self.writer.lock().await;
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        };
        if timeout(self.write_timeout, teardown).await.is_err() {
            tracing::debug!(
                user_id = %self.user_id,
                connection_id = %self.id,
                "Timed out sending close frame"
            );
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
