// WebSocket server for draft clients.
//
// Every accepted connection runs in its own task with its own `Session`;
// a client dropping off never affects the others.

use std::sync::Arc;
use std::time::Duration;

use bestball_draft::engine::DraftEngine;
use futures_util::stream::Stream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::identity::Identity;
use crate::protocol::ServerMessage;
use crate::session::{Session, SessionSettings};

/// Outbound frames buffered per connection before backpressure applies.
const OUTBOUND_BUFFER: usize = 64;

/// How long a closing connection may spend flushing queued replies.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything a connection task needs, shared across connections.
#[derive(Clone)]
pub struct ServerContext {
    pub engine: Arc<DraftEngine>,
    pub identity: Arc<dyn Identity>,
    pub settings: SessionSettings,
}

/// Bind the listener on `127.0.0.1:{port}`.
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    info!("WebSocket server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept connections forever, spawning one task per client.
pub async fn run(listener: TcpListener, ctx: ServerContext) -> anyhow::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let addr_str = addr.to_string();
        info!("Accepted TCP connection from {addr_str}");
        tokio::spawn(handle_connection(stream, addr_str, ctx.clone()));
    }
}

async fn handle_connection(stream: TcpStream, addr: String, ctx: ServerContext) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };

    let (write, read) = ws_stream.split();
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let writer = tokio::spawn(write_messages(write, out_rx, addr.clone()));

    let mut session = Session::new(ctx.engine, ctx.identity, ctx.settings, out_tx.clone(), &addr);
    if process_message_stream(read, &mut session, &out_tx, &addr)
        .await
        .is_err()
    {
        debug!("Outbound channel for {addr} closed before the client finished");
    }

    // Dropping the session aborts its room forwarders, which releases their
    // senders; with `out_tx` gone too the writer ends once its queue is empty.
    drop(session);
    drop(out_tx);
    finish_writer(writer, WRITER_DRAIN_TIMEOUT, &addr).await;
    info!("Client {addr} disconnected");
}

/// Let the writer flush what is already queued, aborting it if that takes
/// longer than `limit`. Returns true if the writer drained on its own.
pub async fn finish_writer(mut writer: JoinHandle<()>, limit: Duration, addr: &str) -> bool {
    match tokio::time::timeout(limit, &mut writer).await {
        Ok(_) => true,
        Err(_) => {
            debug!("Writer for {addr} still busy after {limit:?}, aborting");
            writer.abort();
            false
        }
    }
}

/// Process raw WebSocket [`Message`] items from any [`Stream`], answering
/// each text frame through the session and queueing the reply on `out`.
/// Returns `Err(())` if the outbound channel is closed.
///
/// This is a pure-logic function that requires no I/O and is the primary
/// unit-test target.
pub async fn process_message_stream<St>(
    mut stream: St,
    session: &mut Session,
    out: &mpsc::Sender<ServerMessage>,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let reply = session.handle_text(text.as_str()).await;
                if out.send(reply).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Binary, Ping, Pong and raw frames carry nothing for us.
            }
        }
    }
    Ok(())
}

/// Serialize queued server messages onto the socket until the queue closes
/// or the socket fails.
pub async fn write_messages<Si>(mut sink: Si, mut rx: mpsc::Receiver<ServerMessage>, addr: String)
where
    Si: Sink<Message> + Unpin,
    Si::Error: std::fmt::Display,
{
    while let Some(msg) = rx.recv().await {
        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize message for {addr}: {e}");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(json.into())).await {
            debug!("Write to {addr} failed: {e}");
            break;
        }
    }
}
