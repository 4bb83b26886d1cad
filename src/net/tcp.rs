use super::{ConnectError, Envelope, StreamSession};
use async_bincode::tokio::AsyncBincodeWriter;
use std::time::Duration;
use tokio::{io::BufWriter, net::TcpStream};
use tracing::debug;

/// Connects to `host:port` and frames each envelope as length-prefixed bincode.
pub(super) async fn connect(
    host: &str,
    port: u16,
    flush_timeout: Duration,
) -> Result<StreamSession, ConnectError> {
    let destination = format!("{host}:{port}");
    let io_error = |source| ConnectError::Io {
        destination: destination.clone(),
        source,
    };
    let sock = TcpStream::connect((host, port)).await.map_err(io_error)?;
    sock.set_nodelay(true).map_err(io_error)?;
    debug!(%destination, peer = ?sock.peer_addr().ok(), "tcp forwarding session connected");

    let sock = AsyncBincodeWriter::<_, Envelope, _>::from(BufWriter::new(sock)).for_async();
    Ok(StreamSession::spawn(destination, sock, flush_timeout))
}
