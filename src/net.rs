pub mod server;
mod tcp;
mod ws;

use crate::types::Value;
use futures::{future::BoxFuture, Sink, SinkExt};
use serde::{Deserialize, Serialize};
use std::{
    fmt, io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::{self, JoinHandle},
    time,
};
use tracing::{debug, warn};

/// The frame a forwarding session writes to its peer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Name of the function whose output is carried.
    pub origin: String,
    pub payload: Value,
}

pub type Session = Arc<dyn TransportSession>;

/// A one-way connection to a single destination.
pub trait TransportSession: Send + Sync {
    fn destination(&self) -> &str;

    /// Queues `envelope` for delivery and returns without waiting on the peer.
    fn send(&self, envelope: Envelope) -> Result<(), SendError>;

    /// Stops accepting envelopes, flushes what is queued and releases the
    /// connection.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Opens sessions. Both openers connect eagerly.
pub trait TransportFactory: Send + Sync {
    fn open_url_session<'a>(&'a self, uri: &'a str)
        -> BoxFuture<'a, Result<Session, ConnectError>>;

    fn open_address_session<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> BoxFuture<'a, Result<Session, ConnectError>>;
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connecting to {destination}: {source}")]
    Io {
        destination: String,
        source: io::Error,
    },

    #[error("websocket handshake with {destination}: {source}")]
    WebSocket {
        destination: String,
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    #[error("connection to {destination} refused: {reason}")]
    Refused { destination: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("session to {0} is closed")]
    Closed(String),
}

/// How long closing a session waits for queued envelopes to reach the peer.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens TCP sessions for `host:port` destinations and websocket sessions for
/// URLs (`http`/`https` are upgraded as `ws`/`wss`).
#[derive(Debug, Clone, Copy)]
pub struct NetTransport {
    flush_timeout: Duration,
}

impl Default for NetTransport {
    fn default() -> Self {
        Self {
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }
}

impl NetTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds how long [`TransportSession::close`] waits on a peer that stopped
    /// reading. Envelopes still queued afterwards are dropped.
    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }
}

impl TransportFactory for NetTransport {
    fn open_url_session<'a>(
        &'a self,
        uri: &'a str,
    ) -> BoxFuture<'a, Result<Session, ConnectError>> {
        Box::pin(async move {
            let session: Session = Arc::new(ws::connect(uri, self.flush_timeout).await?);
            Ok(session)
        })
    }

    fn open_address_session<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> BoxFuture<'a, Result<Session, ConnectError>> {
        Box::pin(async move {
            let session: Session = Arc::new(tcp::connect(host, port, self.flush_timeout).await?);
            Ok(session)
        })
    }
}

/// A session whose envelopes are written by a background task, so senders
/// never wait on the network.
pub(crate) struct StreamSession {
    destination: String,
    queue: Mutex<Option<UnboundedSender<Envelope>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    flush_timeout: Duration,
}

impl StreamSession {
    pub(crate) fn spawn<S>(destination: String, sink: S, flush_timeout: Duration) -> Self
    where
        S: Sink<Envelope> + Send + 'static,
        S::Error: fmt::Display + Send,
    {
        let (queue, pending) = mpsc::unbounded_channel();
        let writer = task::spawn(drain(destination.clone(), sink, pending));
        Self {
            destination,
            queue: Mutex::new(Some(queue)),
            writer: Mutex::new(Some(writer)),
            flush_timeout,
        }
    }
}

impl TransportSession for StreamSession {
    fn destination(&self) -> &str {
        &self.destination
    }

    fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        lock(&self.queue)
            .as_ref()
            .and_then(|queue| queue.send(envelope).ok())
            .ok_or_else(|| SendError::Closed(self.destination.clone()))
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            drop(lock(&self.queue).take());
            let Some(mut writer) = lock(&self.writer).take() else {
                return;
            };
            match time::timeout(self.flush_timeout, &mut writer).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(destination = %self.destination, %error, "forwarding writer panicked");
                }
                Err(_) => {
                    writer.abort();
                    warn!(
                        destination = %self.destination,
                        timeout = ?self.flush_timeout,
                        "peer not draining, unsent payloads dropped"
                    );
                }
            }
        })
    }
}

async fn drain<S>(destination: String, sink: S, mut pending: UnboundedReceiver<Envelope>)
where
    S: Sink<Envelope>,
    S::Error: fmt::Display,
{
    let mut sink = Box::pin(sink);
    while let Some(envelope) = pending.recv().await {
        let origin = envelope.origin.clone();
        if let Err(error) = sink.send(envelope).await {
            warn!(%destination, %origin, %error, "dropped forwarded payload");
        }
    }
    if let Err(error) = sink.close().await {
        debug!(%destination, %error, "closing forwarding connection");
    }
    debug!(%destination, "forwarding session closed");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
