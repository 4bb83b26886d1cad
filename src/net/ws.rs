use super::{ConnectError, Envelope, StreamSession};
use futures::{future::ready, SinkExt, StreamExt};
use std::{io, time::Duration};
use tokio::task;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
};
use tracing::debug;

/// Performs the websocket handshake with `uri` and sends each envelope as one
/// binary message.
pub(super) async fn connect(
    uri: &str,
    flush_timeout: Duration,
) -> Result<StreamSession, ConnectError> {
    let request_uri = websocket_uri(uri);
    let (stream, response) = connect_async(request_uri.as_str())
        .await
        .map_err(|source| ConnectError::WebSocket {
            destination: uri.to_owned(),
            source: Box::new(source),
        })?;
    debug!(
        destination = %uri,
        status = %response.status(),
        "websocket forwarding session connected"
    );

    let (sink, mut incoming) = stream.split();
    // Reading keeps control frames (ping/close) flowing; peers send no data.
    task::spawn(async move { while let Some(Ok(_)) = incoming.next().await {} });

    let sink = sink.with(|envelope: Envelope| ready(encode(&envelope)));
    Ok(StreamSession::spawn(uri.to_owned(), sink, flush_timeout))
}

/// `http`/`https` peers are reached through `ws`/`wss`.
pub(super) fn websocket_uri(uri: &str) -> String {
    match uri.split_once("://") {
        Some(("http", rest)) => format!("ws://{rest}"),
        Some(("https", rest)) => format!("wss://{rest}"),
        _ => uri.to_owned(),
    }
}

pub(super) fn encode(envelope: &Envelope) -> Result<Message, tungstenite::Error> {
    let bytes = bincode::serialize(envelope)
        .map_err(|e| tungstenite::Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
    Ok(Message::Binary(bytes))
}

pub(super) fn decode(bytes: &[u8]) -> Result<Envelope, bincode::Error> {
    bincode::deserialize(bytes)
}
