// Connection session - persistent TCP link to the coordinator
// One background task owns the socket: it connects, pumps frames both ways,
// and reconnects with exponential backoff. The session side only sees
// ConnectionEvents and a send() that refuses frames until the link is open.
// Every frame is tagged with the link it was sent for; a frame left over from
// a dead link is never written to the next one.

use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::ReconnectConfig;
use crate::error::TransportError;
use crate::fields;
use crate::protocol::FrameDecoder;

const EVENT_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkStatus {
    Connecting,
    Open,
    Disconnected,
}

/// `unsent` carries frames accepted by `send` that never reached the socket,
/// oldest first.
#[derive(Debug)]
pub enum ConnectionEvent {
    Opened,
    Frame(Bytes),
    Closed {
        reconnecting: bool,
        unsent: Vec<Bytes>,
    },
    Errored {
        error: TransportError,
        reconnecting: bool,
        unsent: Vec<Bytes>,
    },
}

#[derive(Debug)]
struct OutboundFrame {
    link: u64,
    frame: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ReconnectPolicy {
    #[cfg(test)]
    pub fn never() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based): doubles each time, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

#[derive(Debug)]
pub struct Connection {
    addr: String,
    status: LinkStatus,
    /// Number of links opened so far, as seen through `observe`.
    link: u64,
    outbound_tx: mpsc::UnboundedSender<OutboundFrame>,
    task: JoinHandle<()>,
}

impl Connection {
    pub fn spawn(
        addr: String,
        policy: ReconnectPolicy,
    ) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let span = info_span!("connection", { fields::ADDR } = %addr);
        let task = tokio::spawn(
            run_connection(addr.clone(), policy, outbound_rx, event_tx).instrument(span),
        );

        let connection = Self {
            addr,
            status: LinkStatus::Connecting,
            link: 0,
            outbound_tx,
            task,
        };
        (connection, event_rx)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Tracks the link status from the events the session consumes.
    pub fn observe(&mut self, event: &ConnectionEvent) -> LinkStatus {
        self.status = match event {
            ConnectionEvent::Opened => {
                self.link += 1;
                LinkStatus::Open
            }
            ConnectionEvent::Frame(_) => self.status,
            ConnectionEvent::Closed { reconnecting, .. }
            | ConnectionEvent::Errored { reconnecting, .. } => {
                if *reconnecting {
                    LinkStatus::Connecting
                } else {
                    LinkStatus::Disconnected
                }
            }
        };
        self.status
    }

    /// Queues a frame for the socket. Fails with `NotConnected` until opened.
    pub fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        if self.status != LinkStatus::Open {
            return Err(TransportError::NotConnected);
        }
        self.outbound_tx
            .send(OutboundFrame {
                link: self.link,
                frame,
            })
            .map_err(|_| TransportError::Closed)
    }

    pub fn close(&mut self) {
        self.task.abort();
        self.status = LinkStatus::Disconnected;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum LinkEnd {
    Closed,
    Failed(TransportError),
    Shutdown,
}

async fn run_connection(
    addr: String,
    policy: ReconnectPolicy,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    events: mpsc::Sender<ConnectionEvent>,
) {
    let mut failures: u32 = 0;
    let mut link: u64 = 0;

    loop {
        let end = match TcpStream::connect(addr.as_str()).await {
            Ok(stream) => {
                failures = 0;
                link += 1;
                if let Err(e) = stream.set_nodelay(true) {
                    debug!({ fields::ERROR } = %e, "Failed to set TCP_NODELAY");
                }
                info!("Connection opened");
                if events.send(ConnectionEvent::Opened).await.is_err() {
                    return;
                }
                pump(stream, link, &mut outbound_rx, &events).await
            }
            Err(source) => LinkEnd::Failed(TransportError::Connect {
                addr: addr.clone(),
                source,
            }),
        };

        let reconnecting = failures < policy.max_attempts;
        let event = match end {
            LinkEnd::Shutdown => {
                debug!("Connection task shutting down");
                return;
            }
            LinkEnd::Closed => {
                let unsent = drain_unsent(&mut outbound_rx);
                info!(reconnecting, { fields::QUEUE_SIZE } = unsent.len(), "Connection closed");
                ConnectionEvent::Closed {
                    reconnecting,
                    unsent,
                }
            }
            LinkEnd::Failed(error) => {
                let unsent = drain_unsent(&mut outbound_rx);
                warn!(
                    { fields::ERROR } = %error,
                    reconnecting,
                    { fields::QUEUE_SIZE } = unsent.len(),
                    "Connection failed"
                );
                ConnectionEvent::Errored {
                    error,
                    reconnecting,
                    unsent,
                }
            }
        };
        if events.send(event).await.is_err() || !reconnecting {
            return;
        }

        failures += 1;
        let backoff = policy.backoff(failures);
        debug!(
            { fields::ATTEMPT } = failures,
            { fields::BACKOFF_MS } = backoff.as_millis() as u64,
            "Reconnecting after backoff"
        );
        tokio::time::sleep(backoff).await;
    }
}

/// Frames still queued when a link ends, handed back to the session.
fn drain_unsent(outbound_rx: &mut mpsc::UnboundedReceiver<OutboundFrame>) -> Vec<Bytes> {
    let mut unsent = Vec::new();
    while let Ok(outbound) = outbound_rx.try_recv() {
        unsent.push(outbound.frame);
    }
    unsent
}

async fn pump(
    stream: TcpStream,
    link: u64,
    outbound_rx: &mut mpsc::UnboundedReceiver<OutboundFrame>,
    events: &mpsc::Sender<ConnectionEvent>,
) -> LinkEnd {
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = FrameDecoder::new();

    loop {
        tokio::select! {
            read = reader.read_buf(decoder.buffer_mut()) => {
                match read {
                    Ok(0) => return LinkEnd::Closed,
                    Ok(_) => loop {
                        match decoder.next_frame() {
                            Ok(Some(body)) => {
                                debug!({ fields::FRAME_SIZE } = body.len(), "Frame received");
                                if events.send(ConnectionEvent::Frame(body)).await.is_err() {
                                    return LinkEnd::Shutdown;
                                }
                            }
                            Ok(None) => break,
                            // Stream can't be resynchronised after a bad prefix.
                            Err(e) => return LinkEnd::Failed(e.into()),
                        }
                    },
                    Err(e) => return LinkEnd::Failed(e.into()),
                }
            }
            outbound = outbound_rx.recv() => {
                let Some(outbound) = outbound else {
                    return LinkEnd::Shutdown;
                };
                if outbound.link != link {
                    // Sent before the session saw the previous link drop.
                    warn!(
                        { fields::FRAME_SIZE } = outbound.frame.len(),
                        stale_link = outbound.link,
                        "Dropping frame queued for a previous link"
                    );
                    continue;
                }
                if let Err(e) = writer.write_all(&outbound.frame).await {
                    return LinkEnd::Failed(e.into());
                }
            }
        }
    }
}
