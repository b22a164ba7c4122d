// Client driver - one event loop owning the fight session.
//
// Key input, decay fires and connection events are serialized through a single
// select! loop, so session state is never touched from two places at once.
// Outbound messages are framed here and either handed to the connection or
// parked in the pending queue until the link opens.

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::connection::{Connection, ConnectionEvent, ReconnectPolicy};
use crate::decay_timer::DecayFired;
use crate::error::TransportError;
use crate::fields;
use crate::outbox::PendingQueue;
use crate::protocol::{encode_frame, ProtocolMessage};
use crate::render::Snapshot;
use crate::session::{FightSession, InputEvent};

pub struct Client {
    core: ClientCore,
    conn_events: mpsc::Receiver<ConnectionEvent>,
    decay_rx: mpsc::UnboundedReceiver<DecayFired>,
}

struct ClientCore {
    session: FightSession,
    connection: Connection,
    pending: PendingQueue,
    snapshots: watch::Sender<Snapshot>,
    ever_opened: bool,
    link_finished: bool,
}

impl Client {
    pub fn new(config: &Config) -> (Self, watch::Receiver<Snapshot>) {
        let (fired_tx, decay_rx) = mpsc::unbounded_channel();
        let session = FightSession::new(config.timing.punch_decay(), fired_tx);
        let (connection, conn_events) = Connection::spawn(
            config.client.endpoint(),
            ReconnectPolicy::from(&config.reconnect),
        );
        let (snapshots, snapshot_rx) = watch::channel(session.snapshot());

        let client = Self {
            core: ClientCore {
                session,
                connection,
                pending: PendingQueue::new(config.timing.pending_queue_capacity),
                snapshots,
                ever_opened: false,
                link_finished: false,
            },
            conn_events,
            decay_rx,
        };
        (client, snapshot_rx)
    }

    /// Runs until the input channel closes.
    pub async fn run(self, mut inputs: mpsc::Receiver<InputEvent>) -> anyhow::Result<()> {
        let Client {
            mut core,
            mut conn_events,
            mut decay_rx,
        } = self;

        let span = info_span!("session", { fields::SESSION_ID } = %core.session.id());
        async move {
            info!({ fields::ADDR } = core.connection.addr(), "Session started");

            loop {
                let changed = tokio::select! {
                    input = inputs.recv() => match input {
                        Some(input) => core.session.handle_input(input),
                        None => break,
                    },
                    Some(fired) = decay_rx.recv() => core.session.handle_decay(fired),
                    event = conn_events.recv(), if !core.link_finished => match event {
                        Some(event) => core.on_connection_event(event),
                        None => {
                            debug!("Connection task finished");
                            core.link_finished = true;
                            false
                        }
                    },
                };

                core.flush_outbound();
                if changed {
                    core.publish();
                }
            }

            core.shutdown();
            Ok(())
        }
        .instrument(span)
        .await
    }
}

impl ClientCore {
    fn on_connection_event(&mut self, event: ConnectionEvent) -> bool {
        let status = self.connection.observe(&event);
        match event {
            ConnectionEvent::Opened => {
                let reconnected = self.ever_opened;
                self.ever_opened = true;
                if reconnected {
                    self.resend_hello();
                }
                self.flush_pending();
            }
            ConnectionEvent::Frame(body) => return self.session.handle_frame(&body),
            ConnectionEvent::Closed {
                reconnecting,
                unsent,
            } => {
                info!(reconnecting, "Link closed");
                self.pending.requeue_front(unsent);
            }
            ConnectionEvent::Errored {
                error,
                reconnecting,
                unsent,
            } => {
                warn!({ fields::ERROR } = %error, reconnecting, "Link failed");
                self.pending.requeue_front(unsent);
            }
        }
        self.session.set_link(status)
    }

    fn flush_outbound(&mut self) {
        let messages: Vec<ProtocolMessage> = self.session.drain_outbound().collect();
        for message in &messages {
            self.transmit(message);
        }
    }

    /// Sends in order: nothing jumps ahead of frames already parked.
    fn transmit(&mut self, message: &ProtocolMessage) {
        let Some(frame) = self.encode(message) else {
            return;
        };
        if !self.pending.is_empty() {
            self.pending.push(frame);
            return;
        }
        if let Err(e) = self.connection.send(frame.clone()) {
            self.park(frame, e);
        }
    }

    /// The coordinator keys the pairing on the hello, so a reopened link
    /// starts with it. Parked copies are dropped to send it exactly once.
    fn resend_hello(&mut self) {
        let Some(hello) = self.session.hello() else {
            return;
        };
        let Some(frame) = self.encode(&hello) else {
            return;
        };
        let parked = self.pending.remove(&frame);
        debug!(parked, "Resending hello");
        if let Err(e) = self.connection.send(frame.clone()) {
            debug!({ fields::ERROR } = %e, "Hello not sent");
            self.pending.push_front(frame);
        }
    }

    fn flush_pending(&mut self) {
        while let Some(frame) = self.pending.pop() {
            if let Err(e) = self.connection.send(frame.clone()) {
                debug!({ fields::ERROR } = %e, "Pending flush interrupted");
                self.pending.push_front(frame);
                break;
            }
        }
    }

    fn park(&mut self, frame: Bytes, error: TransportError) {
        match error {
            TransportError::NotConnected => {}
            other => warn!({ fields::ERROR } = %other, "Send failed, queueing frame"),
        }
        self.pending.push(frame);
        debug!({ fields::QUEUE_SIZE } = self.pending.len(), "Frame parked");
    }

    fn encode(&self, message: &ProtocolMessage) -> Option<Bytes> {
        match encode_frame(message) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(
                    { fields::MESSAGE_TYPE } = message.type_name(),
                    { fields::ERROR } = %e,
                    "Failed to encode outbound message"
                );
                None
            }
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.session.snapshot());
    }

    fn shutdown(&mut self) {
        self.session.teardown();
        self.connection.close();
        if !self.pending.is_empty() {
            debug!(
                { fields::QUEUE_SIZE } = self.pending.len(),
                "Discarding unsent frames"
            );
        }
        info!("Session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Color, Condition, Side};
    use crate::config::parse_config;
    use crate::connection::LinkStatus;
    use crate::phase::GamePhase;
    use crate::protocol::decode_frame_body;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn config(port: u16) -> Config {
        parse_config(&format!(
            "[client]\nPlayerColor = \"Red\"\nSocketHost = \"127.0.0.1\"\nSocketPort = {}\n\
             [reconnect]\nmax_attempts = 0\n",
            port
        ))
        .unwrap()
    }

    fn reconnecting_config(port: u16) -> Config {
        parse_config(&format!(
            "[client]\nPlayerColor = \"Red\"\nSocketHost = \"127.0.0.1\"\nSocketPort = {}\n\
             [reconnect]\nmax_attempts = 3\ninitial_backoff_ms = 500\nmax_backoff_ms = 500\n",
            port
        ))
        .unwrap()
    }

    async fn read_message(peer: &mut TcpStream) -> ProtocolMessage {
        let mut prefix = [0u8; 4];
        timeout(WAIT, peer.read_exact(&mut prefix))
            .await
            .unwrap()
            .unwrap();
        let mut body = vec![0u8; u32::from_le_bytes(prefix) as usize];
        peer.read_exact(&mut body).await.unwrap();
        let mut messages = decode_frame_body(&body).unwrap();
        assert_eq!(messages.len(), 1);
        messages.remove(0)
    }

    async fn wait_for(
        snapshots: &mut watch::Receiver<Snapshot>,
        predicate: impl Fn(&Snapshot) -> bool,
    ) -> Snapshot {
        timeout(WAIT, async {
            loop {
                let current = *snapshots.borrow_and_update();
                if predicate(&current) {
                    return current;
                }
                snapshots.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_against_coordinator() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (client, mut snapshots) = Client::new(&config(port));
        let (input_tx, input_rx) = mpsc::channel(8);
        let run = tokio::spawn(client.run(input_rx));

        // May land before the link opens; then it is parked and flushed on open.
        input_tx
            .send(InputEvent::SelectColor(Color::Red))
            .await
            .unwrap();
        wait_for(&mut snapshots, |s| s.phase == GamePhase::WaitingForPeer).await;

        let (mut peer, _) = listener.accept().await.unwrap();
        assert_eq!(
            read_message(&mut peer).await,
            ProtocolMessage::ClientConnected { color: Color::Red }
        );
        wait_for(&mut snapshots, |s| s.link == LinkStatus::Open).await;

        peer.write_all(&encode_frame(&ProtocolMessage::PeerReady).unwrap())
            .await
            .unwrap();
        wait_for(&mut snapshots, |s| s.phase == GamePhase::Fighting).await;

        input_tx
            .send(InputEvent::Hand {
                side: Side::Right,
                condition: Condition::Block,
            })
            .await
            .unwrap();
        assert_eq!(
            read_message(&mut peer).await,
            ProtocolMessage::ConditionChanged {
                side: Side::Right,
                condition: Condition::Block
            }
        );

        peer.write_all(
            &encode_frame(&ProtocolMessage::ConditionChanged {
                side: Side::Left,
                condition: Condition::Punch,
            })
            .unwrap(),
        )
        .await
        .unwrap();
        let snapshot = wait_for(&mut snapshots, |s| s.remote.left == Condition::Punch).await;
        assert_eq!(snapshot.local.right, Condition::Block);
        assert_eq!(snapshot.local.left, Condition::Neutral);

        input_tx
            .send(InputEvent::DeclareOutcome { local_wins: true })
            .await
            .unwrap();
        assert_eq!(
            read_message(&mut peer).await,
            ProtocolMessage::GameOver(crate::protocol::Outcome::YouWin(false))
        );
        let snapshot = wait_for(&mut snapshots, |s| s.remote_lost).await;
        assert_eq!(snapshot.phase, GamePhase::GameOver { winner: Color::Red });

        drop(input_tx);
        timeout(WAIT, run).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_link_loss_is_reported_and_local_play_continues() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (client, mut snapshots) = Client::new(&config(port));
        let (input_tx, input_rx) = mpsc::channel(8);
        let run = tokio::spawn(client.run(input_rx));

        let (peer, _) = listener.accept().await.unwrap();
        wait_for(&mut snapshots, |s| s.link == LinkStatus::Open).await;
        drop(peer);
        wait_for(&mut snapshots, |s| s.link == LinkStatus::Disconnected).await;

        input_tx
            .send(InputEvent::SelectColor(Color::Blue))
            .await
            .unwrap();
        input_tx.send(InputEvent::PeerReady).await.unwrap();
        input_tx
            .send(InputEvent::Hand {
                side: Side::Left,
                condition: Condition::Block,
            })
            .await
            .unwrap();
        let snapshot = wait_for(&mut snapshots, |s| s.local.left == Condition::Block).await;
        assert_eq!(snapshot.phase, GamePhase::Fighting);
        assert_eq!(snapshot.link, LinkStatus::Disconnected);

        drop(input_tx);
        timeout(WAIT, run).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_sends_hello_first_then_parked_frames_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (client, mut snapshots) = Client::new(&reconnecting_config(port));
        let (input_tx, input_rx) = mpsc::channel(8);
        let run = tokio::spawn(client.run(input_rx));

        let (first, _) = listener.accept().await.unwrap();
        wait_for(&mut snapshots, |s| s.link == LinkStatus::Open).await;
        drop(first);
        wait_for(&mut snapshots, |s| s.link == LinkStatus::Connecting).await;

        // Everything below is parked while the link is down.
        input_tx
            .send(InputEvent::SelectColor(Color::Red))
            .await
            .unwrap();
        input_tx.send(InputEvent::PeerReady).await.unwrap();
        input_tx
            .send(InputEvent::Hand {
                side: Side::Left,
                condition: Condition::Block,
            })
            .await
            .unwrap();
        wait_for(&mut snapshots, |s| s.local.left == Condition::Block).await;

        let (mut second, _) = listener.accept().await.unwrap();
        assert_eq!(
            read_message(&mut second).await,
            ProtocolMessage::ClientConnected { color: Color::Red }
        );
        assert_eq!(
            read_message(&mut second).await,
            ProtocolMessage::ConditionChanged {
                side: Side::Left,
                condition: Condition::Block
            }
        );
        wait_for(&mut snapshots, |s| s.link == LinkStatus::Open).await;

        // The next frame is fresh input, not a second hello.
        input_tx
            .send(InputEvent::Hand {
                side: Side::Right,
                condition: Condition::Block,
            })
            .await
            .unwrap();
        assert_eq!(
            read_message(&mut second).await,
            ProtocolMessage::ConditionChanged {
                side: Side::Right,
                condition: Condition::Block
            }
        );

        drop(input_tx);
        timeout(WAIT, run).await.unwrap().unwrap().unwrap();
    }
}
