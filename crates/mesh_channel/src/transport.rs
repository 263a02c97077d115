//! WebSocket transport: framed envelopes over one TCP connection per peer.
//!
//! Every frame carries exactly one JSON-encoded
//! [`ChannelMessage`](crate::message::ChannelMessage). The accept loop hands
//! freshly upgraded sockets to the channel through an mpsc queue; outbound
//! sockets are opened on demand by the sender. Both sides are split into a
//! write half guarded by the connection's lock and a read half owned by the
//! connection's receive task.

use std::net::SocketAddr;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_async, connect_async};
use tracing::{debug, error, info};

use crate::error::ChannelError;
use crate::identity::Participant;

type ServerWs = WebSocketStream<TcpStream>;
type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound for the close handshake when tearing a socket down.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// The write side can be either a server-accepted or client-initiated socket.
pub(crate) enum PeerSink {
    Server(SplitSink<ServerWs, Message>),
    Client(SplitSink<ClientWs, Message>),
}

impl PeerSink {
    /// Write one text frame and flush it.
    pub(crate) async fn send_text(&mut self, text: String) -> Result<(), ChannelError> {
        let frame = Message::Text(text.into());
        let result = match self {
            PeerSink::Server(sink) => sink.send(frame).await,
            PeerSink::Client(sink) => sink.send(frame).await,
        };
        result.map_err(|e| ChannelError::Transport(format!("Send error: {e}")))
    }

    /// Send a close frame, best effort.
    pub(crate) async fn close(&mut self) {
        let close = async {
            match self {
                PeerSink::Server(sink) => {
                    let _ = sink.send(Message::Close(None)).await;
                }
                PeerSink::Client(sink) => {
                    let _ = sink.send(Message::Close(None)).await;
                }
            }
        };
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, close).await;
    }
}

/// What the read half produced.
#[derive(Debug)]
pub(crate) enum Frame {
    Text(String),
    /// Control or binary frame with no envelope in it.
    Skip,
    /// The peer closed the socket cleanly.
    Closed,
    /// The socket failed; it must not be read again.
    Failed(String),
}

/// The read side of a peer socket.
pub(crate) enum PeerStream {
    Server(SplitStream<ServerWs>),
    Client(SplitStream<ClientWs>),
}

impl PeerStream {
    pub(crate) async fn next_frame(&mut self) -> Frame {
        let next = match self {
            PeerStream::Server(stream) => stream.next().await,
            PeerStream::Client(stream) => stream.next().await,
        };
        match next {
            Some(Ok(Message::Text(text))) => Frame::Text(text.to_string()),
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Frame::Text(text),
                Err(_) => Frame::Skip,
            },
            Some(Ok(Message::Close(_))) | None => Frame::Closed,
            Some(Ok(_)) => Frame::Skip,
            Some(Err(e)) => Frame::Failed(e.to_string()),
        }
    }
}

/// A socket accepted by the server, not yet bound to any identity.
pub(crate) struct Accepted {
    pub addr: SocketAddr,
    pub sink: PeerSink,
    pub stream: PeerStream,
}

/// Bind the listening socket.
pub(crate) async fn bind(hostname: &str, port: u16) -> Result<TcpListener, ChannelError> {
    let listener = TcpListener::bind((hostname, port)).await?;
    Ok(listener)
}

/// Accept loop. Each accepted socket is upgraded on its own task and handed
/// to the channel through `accepted_tx`.
pub(crate) async fn serve(
    listener: TcpListener,
    accepted_tx: mpsc::Sender<Accepted>,
    mut shutdown: broadcast::Receiver<()>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("Channel server listening on {addr}");
    }

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, addr)) => {
                        let accepted_tx = accepted_tx.clone();
                        tokio::spawn(async move {
                            match accept_async(stream).await {
                                Ok(ws_stream) => {
                                    let (sink, stream) = ws_stream.split();
                                    debug!("Accepted socket from {addr}");
                                    let _ = accepted_tx
                                        .send(Accepted {
                                            addr,
                                            sink: PeerSink::Server(sink),
                                            stream: PeerStream::Server(stream),
                                        })
                                        .await;
                                }
                                Err(e) => {
                                    error!("WebSocket accept failed for {addr}: {e}");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!("TCP accept failed: {e}");
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("Channel server shutting down");
                break;
            }
        }
    }
}

/// Open a socket to `participant`.
pub(crate) async fn connect(
    participant: &Participant,
    timeout: Duration,
) -> Result<(PeerSink, PeerStream), ChannelError> {
    let url = participant.url();
    let (ws_stream, _) = tokio::time::timeout(timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| ChannelError::Timeout(timeout))?
        .map_err(|e| ChannelError::Transport(format!("Connect to {participant} failed: {e}")))?;

    let (sink, stream) = ws_stream.split();
    debug!("Opened socket to {participant}");
    Ok((PeerSink::Client(sink), PeerStream::Client(stream)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    async fn start_server() -> (
        Participant,
        mpsc::Receiver<Accepted>,
        broadcast::Sender<()>,
    ) {
        let listener = bind("127.0.0.1", 0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (accepted_tx, accepted_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(serve(listener, accepted_tx, shutdown_rx));
        (Participant::new("127.0.0.1", port), accepted_rx, shutdown_tx)
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = bind("127.0.0.1", 0).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (server, mut accepted_rx, shutdown_tx) = start_server().await;

        let (mut client_sink, mut client_stream) =
            connect(&server, Duration::from_secs(2)).await.unwrap();
        let mut accepted = tokio::time::timeout(Duration::from_secs(2), accepted_rx.recv())
            .await
            .unwrap()
            .unwrap();

        client_sink.send_text("hello".to_string()).await.unwrap();
        match accepted.stream.next_frame().await {
            Frame::Text(text) => assert_eq!(text, "hello"),
            other => panic!("Expected text frame, got {other:?}"),
        }

        accepted.sink.send_text("welcome".to_string()).await.unwrap();
        match client_stream.next_frame().await {
            Frame::Text(text) => assert_eq!(text, "welcome"),
            other => panic!("Expected text frame, got {other:?}"),
        }

        client_sink.close().await;
        match accepted.stream.next_frame().await {
            Frame::Closed => {}
            other => panic!("Expected close, got {other:?}"),
        }

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = bind("127.0.0.1", 0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = connect(&Participant::new("127.0.0.1", port), Duration::from_secs(2)).await;
        assert!(result.is_err());
    }
}
