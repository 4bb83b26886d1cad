use super::{ws, Envelope};
use crate::catalog::{Callable, DispatchError, FunctionCatalog};
use async_bincode::tokio::AsyncBincodeReader;
use futures::StreamExt;
use std::{io, net::SocketAddr, sync::Arc};
use tokio::{io::BufReader, net::TcpListener, net::TcpStream, task};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// The receiving end of forwarding sessions. Every envelope that arrives is
/// passed to one function; nothing is sent back.
pub struct Server {
    function: Callable,
}

impl Server {
    pub fn new(function: Callable) -> Self {
        Self { function }
    }

    /// Serves the (possibly composed) `definition` from `catalog`.
    pub fn for_definition(
        catalog: &FunctionCatalog,
        definition: &str,
    ) -> Result<Self, DispatchError> {
        catalog
            .lookup_definition(definition)
            .map(Self::new)
            .ok_or_else(|| DispatchError::NoSuchFunction(definition.to_owned()))
    }

    pub fn function_name(&self) -> &str {
        self.function.name()
    }

    async fn handle_envelope(&self, peer: SocketAddr, envelope: Envelope) {
        let Envelope { origin, payload } = envelope;
        match self.function.call(payload).await {
            Ok(result) => debug!(%peer, %origin, %result, "handled forwarded payload"),
            Err(error) => warn!(%peer, %origin, %error, "forwarded payload rejected"),
        }
    }

    pub async fn serve_tcp(self, listener: TcpListener) -> io::Result<()> {
        let root_arc = Arc::new(self);
        info!(
            addr = ?listener.local_addr().ok(),
            function = root_arc.function_name(),
            "serving tcp"
        );
        loop {
            let arc_self = root_arc.clone();
            let (sock, peer) = listener.accept().await?;
            task::spawn(arc_self.read_tcp(sock, peer));
        }
    }

    async fn read_tcp(self: Arc<Self>, sock: TcpStream, peer: SocketAddr) {
        let mut frames = AsyncBincodeReader::<_, Envelope>::from(BufReader::new(sock));
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(envelope) => self.handle_envelope(peer, envelope).await,
                Err(error) => {
                    warn!(%peer, %error, "undecodable frame, dropping connection");
                    break;
                }
            }
        }
        debug!(%peer, "tcp peer disconnected");
    }

    pub async fn serve_ws(self, listener: TcpListener) -> io::Result<()> {
        let root_arc = Arc::new(self);
        info!(
            addr = ?listener.local_addr().ok(),
            function = root_arc.function_name(),
            "serving websocket"
        );
        loop {
            let arc_self = root_arc.clone();
            let (sock, peer) = listener.accept().await?;
            task::spawn(arc_self.read_ws(sock, peer));
        }
    }

    async fn read_ws(self: Arc<Self>, sock: TcpStream, peer: SocketAddr) {
        let mut stream = match accept_async(sock).await {
            Ok(stream) => stream,
            Err(error) => {
                warn!(%peer, %error, "websocket handshake failed");
                return;
            }
        };
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Binary(bytes)) => match ws::decode(&bytes) {
                    Ok(envelope) => self.handle_envelope(peer, envelope).await,
                    Err(error) => warn!(%peer, %error, "undecodable websocket message"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(error) => {
                    warn!(%peer, %error, "websocket error, dropping connection");
                    break;
                }
            }
        }
        debug!(%peer, "websocket peer disconnected");
    }
}
