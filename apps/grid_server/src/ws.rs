use std::borrow::Cow;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use gridcore::connection::Connection;
use gridcore::endpoint::SessionEndpoint;
use gridcore::session::Session;
use gridcore::transport::Transport;
use gridproto::frame::{CONTROL_ASSIGN, encode_control};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::SharedState;

const PING_INTERVAL: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

struct WsShared {
    sink: tokio::sync::Mutex<SplitSink<WebSocket, WsMessage>>,
    stream: tokio::sync::Mutex<SplitStream<WebSocket>>,
    pong_tx: mpsc::Sender<()>,
    gone: CancellationToken,
}

/// `gridcore::Transport` over a split axum websocket. The halves sit behind
/// their own mutexes so the endpoint's read and write loops can run
/// concurrently against the same socket.
#[derive(Clone)]
struct WsTransport {
    inner: Arc<WsShared>,
}

impl WsTransport {
    fn new(socket: WebSocket) -> (Self, mpsc::Receiver<()>) {
        let (sink, stream) = socket.split();
        let (pong_tx, pong_rx) = mpsc::channel(8);
        (
            Self {
                inner: Arc::new(WsShared {
                    sink: tokio::sync::Mutex::new(sink),
                    stream: tokio::sync::Mutex::new(stream),
                    pong_tx,
                    gone: CancellationToken::new(),
                }),
            },
            pong_rx,
        )
    }

    /// Fires once the peer is gone (close frame, EOF or socket error).
    fn gone(&self) -> CancellationToken {
        self.inner.gone.clone()
    }

    async fn ping(&self) -> bool {
        let mut sink = self.inner.sink.lock().await;
        sink.send(WsMessage::Ping(Vec::new())).await.is_ok()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn read(&self) -> io::Result<Bytes> {
        let mut stream = self.inner.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Binary(b))) => return Ok(Bytes::from(b)),
                Some(Ok(WsMessage::Text(t))) => return Ok(Bytes::from(t.into_bytes())),
                Some(Ok(WsMessage::Ping(_))) => continue, // axum answers pings itself
                Some(Ok(WsMessage::Pong(_))) => {
                    let _ = self.inner.pong_tx.try_send(());
                    continue;
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    self.inner.gone.cancel();
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "websocket closed"));
                }
                Some(Err(err)) => {
                    self.inner.gone.cancel();
                    return Err(io::Error::other(err));
                }
            }
        }
    }

    async fn write(&self, data: &[u8]) -> io::Result<()> {
        let mut sink = self.inner.sink.lock().await;
        sink.send(WsMessage::Binary(data.to_vec()))
            .await
            .map_err(io::Error::other)
    }

    async fn close(&self, code: u16, reason: &str) -> io::Result<()> {
        let frame = WsMessage::Close(Some(CloseFrame {
            code,
            reason: Cow::Owned(reason.to_string()),
        }));
        // A writer wedged on a dead peer may hold the sink; don't hang the
        // endpoint teardown behind it.
        match tokio::time::timeout(CLOSE_TIMEOUT, async {
            let mut sink = self.inner.sink.lock().await;
            sink.send(frame).await
        })
        .await
        {
            Ok(res) => res.map_err(io::Error::other),
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "close timed out")),
        }
    }
}

pub async fn accept(State(state): State<SharedState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        if let Err(err) = handle_socket(state, socket).await {
            warn!(err = %err, "ws session ended with error");
        }
    })
}

async fn handle_socket(state: SharedState, socket: WebSocket) -> anyhow::Result<()> {
    let (transport, mut pong_rx) = WsTransport::new(socket);
    let gone = transport.gone();

    let session = Arc::new(Session::new());
    let sid = session.id();
    let connection = Arc::new(Connection::new(Box::new(transport.clone())));

    // Make sure the room's inbox exists before the endpoint publishes join.
    let room_id = state.room_manager.get_room(sid).await?;
    state.host.ensure_room(room_id).await;

    let endpoint = Arc::new(
        SessionEndpoint::new(
            session,
            connection,
            state.pubsub.clone(),
            state.room_manager.clone(),
        )
        .with_idle_timeout(state.idle_timeout),
    );

    // The client learns its session id first, then answers with Join.
    if endpoint.send(encode_control(sid, 0, CONTROL_ASSIGN)).is_err() {
        warn!(session = %sid, "could not queue assign frame");
    }

    // Keepalive pings keep the pong axis of live clients fresh.
    let pinger = {
        let transport = transport.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PING_INTERVAL);
            loop {
                ticker.tick().await;
                if !transport.ping().await {
                    return;
                }
            }
        })
    };
    let pong_forwarder = {
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            while pong_rx.recv().await.is_some() {
                endpoint.pong().await;
            }
        })
    };
    // A vanished peer closes the endpoint promptly instead of spinning on
    // read errors until the idle supervisor trips.
    let closer = {
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            gone.cancelled().await;
            endpoint.close().await;
        })
    };

    info!(session = %sid, room = %room_id, "ws client connected");
    let result = endpoint.run().await;
    endpoint.force_close().await;

    pinger.abort();
    pong_forwarder.abort();
    closer.abort();

    info!(session = %sid, "ws client disconnected");
    result?;
    Ok(())
}
