//! WebSocket transport (tokio-tungstenite).
//!
//! One writer task drains outbound frames into the socket; one reader task
//! turns socket messages into [`TransportEvent`]s. The reader reports
//! `Closed` exactly once, after which the receiver ends. This adapter does
//! not reconnect.

use crate::ports::{Transport, TransportError, TransportEvent, TransportReceiver};
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tracing::{debug, info, warn};

/// How long `close()` waits for the writer to flush the Close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

enum Outbound {
    Frame(String),
    Close,
}

/// Outbound half of a WebSocket connection.
pub struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    writer: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Inbound half of a WebSocket connection.
pub struct WebSocketReceiver {
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Open a WebSocket connection to the hub at `url`.
pub async fn connect(
    url: &str,
) -> Result<(Arc<WebSocketTransport>, WebSocketReceiver), TransportError> {
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
    info!(url = %url, "Connected to hub");

    let (write, read) = ws_stream.split();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(read_loop(read, events_tx));

    Ok((
        WebSocketTransport::spawn(write),
        WebSocketReceiver { events: events_rx },
    ))
}

impl WebSocketTransport {
    /// Start the writer task over `sink`.
    fn spawn<S>(sink: S) -> Arc<Self>
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display + Send,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(sink, outbound_rx));
        Arc::new(Self {
            outbound,
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, frame: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| TransportError::Closed)
    }

    /// Queue a Close frame and wait for the writer to flush it.
    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(TransportError::Closed);
        }
        // The writer may already have stopped on a write error.
        let _ = self.outbound.send(Outbound::Close);

        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            if tokio::time::timeout(CLOSE_TIMEOUT, writer).await.is_err() {
                warn!(timeout = ?CLOSE_TIMEOUT, "WebSocket writer did not finish closing in time");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn receive(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

async fn write_loop<S>(mut sink: S, mut outbound: mpsc::UnboundedReceiver<Outbound>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(frame) => {
                if let Err(e) = sink.send(Message::text(frame)).await {
                    warn!(error = %e, "WebSocket write failed, writer stopped");
                    break;
                }
            }
            Outbound::Close => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                debug!("WebSocket closed by client");
                break;
            }
        }
    }
}

async fn read_loop<S>(mut stream: S, events: mpsc::UnboundedSender<TransportEvent>)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if events.send(TransportEvent::Message(text.to_string())).is_err() {
                    // Client dropped its receiver.
                    return;
                }
            }
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => {
                    let _ = events.send(TransportEvent::Message(text));
                }
                Err(_) => debug!(len = bytes.len(), "Ignoring non-UTF-8 binary frame"),
            },
            Ok(Message::Close(frame)) => {
                debug!(frame = ?frame, "Hub closed the WebSocket");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = events.send(TransportEvent::Error(e.to_string()));
                break;
            }
        }
    }

    let _ = events.send(TransportEvent::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::convert::Infallible;
    use std::io;

    async fn read_all(messages: Vec<Result<Message, tungstenite::Error>>) -> Vec<TransportEvent> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        read_loop(stream::iter(messages), events_tx).await;

        let mut events = Vec::new();
        while let Ok(event) = events_rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn reset() -> tungstenite::Error {
        tungstenite::Error::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
    }

    #[tokio::test]
    async fn test_text_frames_become_messages() {
        let events = read_all(vec![
            Ok(Message::text(r#"{"type":"binding"}"#)),
            Ok(Message::Ping(Vec::new().into())),
            Ok(Message::text("second")),
        ])
        .await;

        assert_eq!(
            events,
            vec![
                TransportEvent::Message(r#"{"type":"binding"}"#.into()),
                TransportEvent::Message("second".into()),
                TransportEvent::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn test_utf8_binary_becomes_message() {
        let events = read_all(vec![
            Ok(Message::binary(br#"{"a":1}"#.to_vec())),
            Ok(Message::binary(vec![0xff, 0xfe])),
        ])
        .await;

        assert_eq!(
            events,
            vec![
                TransportEvent::Message(r#"{"a":1}"#.into()),
                TransportEvent::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn test_error_then_single_close() {
        let events = read_all(vec![
            Ok(Message::text("before")),
            Err(reset()),
            Ok(Message::text("after")),
        ])
        .await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], TransportEvent::Message("before".into()));
        assert!(matches!(events[1], TransportEvent::Error(_)));
        assert_eq!(events[2], TransportEvent::Closed);
    }

    #[tokio::test]
    async fn test_close_frame_gives_single_close() {
        let events = read_all(vec![Ok(Message::Close(None)), Ok(Message::text("late"))]).await;
        assert_eq!(events, vec![TransportEvent::Closed]);
    }

    #[tokio::test]
    async fn test_writer_sends_close_frame_and_stops() {
        let mut sent: Vec<Message> = Vec::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        outbound_tx.send(Outbound::Frame("hello".into())).unwrap();
        outbound_tx.send(Outbound::Close).unwrap();
        outbound_tx.send(Outbound::Frame("late".into())).unwrap();

        write_loop(&mut sent, outbound_rx).await;

        assert_eq!(sent, vec![Message::text("hello"), Message::Close(None)]);
    }

    #[tokio::test]
    async fn test_close_waits_for_writer_flush() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let sent = Arc::clone(&sent);
            Box::pin(futures_util::sink::unfold((), move |(), message: Message| {
                let sent = Arc::clone(&sent);
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    sent.lock().push(message);
                    Ok::<_, Infallible>(())
                }
            }))
        };
        let transport = WebSocketTransport::spawn(sink);

        transport.send("hello".into()).await.unwrap();
        transport.close().await.unwrap();

        assert_eq!(
            *sent.lock(),
            vec![Message::text("hello"), Message::Close(None)]
        );
        assert_eq!(
            transport.send("late".into()).await,
            Err(TransportError::Closed)
        );
        assert_eq!(transport.close().await, Err(TransportError::Closed));
    }
}
