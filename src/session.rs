// Fight session - the single owner of phase, both fighters and their timers.
//
// Input handlers only ever touch the local fighter; decoded messages only ever
// touch the remote fighter and the phase. Every handler returns whether the
// visible state changed, and local changes queue outbound messages in the
// order they happened.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::condition::{Color, Condition, Side};
use crate::connection::LinkStatus;
use crate::decay_timer::{DecayFired, PunchTimers};
use crate::error::InvalidTransition;
use crate::fields;
use crate::fighter::{ConditionChange, LocalFighter, RemoteFighter};
use crate::phase::{FightStateMachine, GamePhase};
use crate::protocol::{decode_frame_body, Outcome, ProtocolMessage};
use crate::render::Snapshot;

/// Discrete events from the key-input boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    SelectColor(Color),
    Hand { side: Side, condition: Condition },
    /// Key released; reverts the hand only if it still holds `condition`.
    Release { side: Side, condition: Condition },
    /// Offline trigger for the fight start.
    PeerReady,
    DeclareOutcome { local_wins: bool },
    ResetRequested,
}

#[derive(Debug)]
pub struct FightSession {
    id: Uuid,
    machine: FightStateMachine,
    local: LocalFighter,
    remote: RemoteFighter,
    link: LinkStatus,
    punch_blocked: Option<Color>,
    outbound: VecDeque<ProtocolMessage>,
}

impl FightSession {
    pub fn new(punch_decay: Duration, fired_tx: mpsc::UnboundedSender<DecayFired>) -> Self {
        Self {
            id: Uuid::new_v4(),
            machine: FightStateMachine::new(),
            local: LocalFighter::new(PunchTimers::new(punch_decay, fired_tx)),
            remote: RemoteFighter::new(),
            link: LinkStatus::Connecting,
            punch_blocked: None,
            outbound: VecDeque::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn snapshot(&self) -> Snapshot {
        let (local_lost, remote_lost) = self.machine.losers();
        Snapshot {
            phase: self.machine.phase(),
            local_color: self.machine.local_color(),
            opponent_color: self.machine.opponent_color(),
            local: self.local.state(),
            remote: self.remote.state(),
            local_lost,
            remote_lost,
            link: self.link,
            punch_blocked: self.punch_blocked,
        }
    }

    /// Messages to transmit, oldest first.
    pub fn drain_outbound(&mut self) -> std::collections::vec_deque::Drain<'_, ProtocolMessage> {
        self.outbound.drain(..)
    }

    /// Pairing hello to resend after a reconnect, once a color is chosen.
    pub fn hello(&self) -> Option<ProtocolMessage> {
        match self.machine.phase() {
            GamePhase::SelectingColor => None,
            _ => Some(ProtocolMessage::ClientConnected {
                color: self.machine.local_color(),
            }),
        }
    }

    pub fn handle_input(&mut self, input: InputEvent) -> bool {
        let result = match input {
            InputEvent::SelectColor(color) => self.select_color(color),
            InputEvent::Hand { side, condition } => self.hand_input(side, condition),
            InputEvent::Release { side, condition } => self.hand_release(side, condition),
            InputEvent::PeerReady => self.start_fight(),
            InputEvent::DeclareOutcome { local_wins } => self.declare_outcome(local_wins),
            InputEvent::ResetRequested => self.reset(true),
        };
        self.settle(result)
    }

    /// Decodes one frame body and dispatches every message in it.
    pub fn handle_frame(&mut self, body: &[u8]) -> bool {
        match decode_frame_body(body) {
            Ok(messages) => {
                let mut changed = false;
                for message in messages {
                    changed |= self.handle_message(message);
                }
                changed
            }
            Err(e) => {
                warn!(
                    { fields::FRAME_SIZE } = body.len(),
                    { fields::ERROR } = %e,
                    "Dropping malformed frame"
                );
                false
            }
        }
    }

    pub fn handle_message(&mut self, message: ProtocolMessage) -> bool {
        debug!({ fields::MESSAGE_TYPE } = message.type_name(), "Message received");
        let result = match message {
            ProtocolMessage::ConditionChanged { side, condition } => {
                self.remote_update(side, condition)
            }
            ProtocolMessage::GameOver(outcome) => self.remote_game_over(outcome),
            ProtocolMessage::Reset => self.reset(false),
            ProtocolMessage::PeerColorAssigned { color }
            | ProtocolMessage::ClientConnected { color } => self.assign_peer_color(color),
            ProtocolMessage::PeerReady => self.start_fight(),
            ProtocolMessage::PunchBlocked { color } => self.punch_blocked(color),
            ProtocolMessage::Unknown(tag) => {
                warn!({ fields::MESSAGE_TYPE } = %tag, "Unknown message type received");
                Ok(false)
            }
        };
        self.settle(result)
    }

    pub fn handle_decay(&mut self, fired: DecayFired) -> bool {
        match self.local.apply_decay(fired) {
            Some(change) => {
                self.queue_change(change);
                true
            }
            None => false,
        }
    }

    pub fn set_link(&mut self, link: LinkStatus) -> bool {
        if self.link == link {
            return false;
        }
        self.link = link;
        true
    }

    /// Cancels every outstanding timer. Called before the session is dropped.
    pub fn teardown(&mut self) {
        self.local.cancel_decay();
        self.outbound.clear();
    }

    fn select_color(&mut self, color: Color) -> Result<bool, InvalidTransition> {
        self.machine.select_color(color)?;
        self.reset_fighters();
        info!(
            { fields::LOCAL_COLOR } = %color,
            { fields::OPPONENT_COLOR } = %self.machine.opponent_color(),
            "Color selected, waiting for peer"
        );
        self.outbound
            .push_back(ProtocolMessage::ClientConnected { color });
        Ok(true)
    }

    fn start_fight(&mut self) -> Result<bool, InvalidTransition> {
        self.machine.peer_ready()?;
        self.reset_fighters();
        info!("Fight started");
        Ok(true)
    }

    fn hand_input(&mut self, side: Side, condition: Condition) -> Result<bool, InvalidTransition> {
        self.machine.require_fighting("hand_input")?;
        Ok(self
            .local
            .apply_input(side, condition)
            .map(|change| self.queue_change(change))
            .is_some())
    }

    fn hand_release(&mut self, side: Side, held: Condition) -> Result<bool, InvalidTransition> {
        self.machine.require_fighting("hand_release")?;
        Ok(self
            .local
            .release(side, held)
            .map(|change| self.queue_change(change))
            .is_some())
    }

    fn declare_outcome(&mut self, local_wins: bool) -> Result<bool, InvalidTransition> {
        let winner = self.machine.game_over(local_wins)?;
        self.local.cancel_decay();
        self.punch_blocked = None;
        info!({ fields::WINNER } = %winner, "Game over declared locally");
        // The receiver reads YouWin about itself.
        self.outbound
            .push_back(ProtocolMessage::GameOver(Outcome::YouWin(!local_wins)));
        Ok(true)
    }

    fn remote_game_over(&mut self, outcome: Outcome) -> Result<bool, InvalidTransition> {
        let winner = match outcome {
            Outcome::YouWin(you_win) => self.machine.game_over(you_win)?,
            Outcome::Winner(color) => self.machine.game_over_with_winner(color)?,
        };
        self.local.cancel_decay();
        self.punch_blocked = None;
        info!({ fields::WINNER } = %winner, "Game over received");
        Ok(true)
    }

    /// `local_request` distinguishes the reset key (announced to the peer)
    /// from an inbound Reset (applied silently).
    fn reset(&mut self, local_request: bool) -> Result<bool, InvalidTransition> {
        self.machine.reset()?;
        self.reset_fighters();
        info!(local_request, "Match reset, selecting color");
        if local_request {
            self.outbound.push_back(ProtocolMessage::Reset);
        }
        Ok(true)
    }

    fn remote_update(&mut self, side: Side, condition: Condition) -> Result<bool, InvalidTransition> {
        self.machine.require_fighting("remote_update")?;
        let changed = self.remote.apply_update(side, condition);
        if changed {
            debug!(
                { fields::SIDE } = %side,
                { fields::CONDITION } = %condition,
                "Remote hand changed"
            );
        }
        Ok(changed)
    }

    fn assign_peer_color(&mut self, color: Color) -> Result<bool, InvalidTransition> {
        self.machine.assign_peer_color(color)?;
        info!({ fields::OPPONENT_COLOR } = %color, "Peer color assigned");
        Ok(true)
    }

    fn punch_blocked(&mut self, color: Color) -> Result<bool, InvalidTransition> {
        self.machine.require_fighting("punch_blocked")?;
        info!(blocked = %color, "Punch blocked");
        self.punch_blocked = Some(color);
        Ok(true)
    }

    fn queue_change(&mut self, change: ConditionChange) {
        self.outbound.push_back(ProtocolMessage::ConditionChanged {
            side: change.side,
            condition: change.condition,
        });
    }

    fn reset_fighters(&mut self) {
        self.local.reset();
        self.remote.reset();
        self.punch_blocked = None;
    }

    fn settle(&self, result: Result<bool, InvalidTransition>) -> bool {
        match result {
            Ok(changed) => changed,
            Err(invalid) => {
                trace!(
                    { fields::PHASE } = self.machine.phase().name(),
                    { fields::OPERATION } = invalid.attempted,
                    "Ignoring transition not valid for this phase"
                );
                false
            }
        }
    }
}
