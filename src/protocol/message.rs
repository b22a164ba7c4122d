use serde::{Deserialize, Serialize};

use crate::condition::{Color, Condition, Side};
use crate::error::ProtocolError;

// Wire message types
//
// {"Type":"PlayerChanged","Left":"Punch"}       local hand changed (outbound)
// {"Type":"OpponentChanged","Right":"Block"}    far hand changed (inbound)
// {"Type":"GameOver","YouWin":false}            outcome addressed to the receiver
// {"Type":"GameOver","Color":"Red"}             outcome naming the winner
// {"Type":"Reset"}
// {"Type":"PeerColorAssigned","Color":"Blue"}
// {"Type":"PeerReady"}
// {"Type":"ClientConnected","Color":"Red"}      hello, pairing key for the relay
// {"Type":"PunchBlocked","Color":"Red"}         relay notice, display only

pub const PLAYER_CHANGED: &str = "PlayerChanged";
pub const OPPONENT_CHANGED: &str = "OpponentChanged";
pub const GAME_OVER: &str = "GameOver";
pub const RESET: &str = "Reset";
pub const PEER_COLOR_ASSIGNED: &str = "PeerColorAssigned";
pub const PEER_READY: &str = "PeerReady";
pub const CLIENT_CONNECTED: &str = "ClientConnected";
pub const PUNCH_BLOCKED: &str = "PunchBlocked";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Phrased for the receiver of the frame.
    YouWin(bool),
    Winner(Color),
}

/// A decoded or to-be-encoded protocol message. Each one is consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    ConditionChanged { side: Side, condition: Condition },
    GameOver(Outcome),
    Reset,
    PeerColorAssigned { color: Color },
    PeerReady,
    ClientConnected { color: Color },
    PunchBlocked { color: Color },
    Unknown(String),
}

impl ProtocolMessage {
    /// Name for logs. Condition changes go out as PlayerChanged but arrive
    /// under either tag, so they get a direction-free name.
    pub fn type_name(&self) -> &str {
        match self {
            ProtocolMessage::ConditionChanged { .. } => "ConditionChanged",
            ProtocolMessage::GameOver(_) => GAME_OVER,
            ProtocolMessage::Reset => RESET,
            ProtocolMessage::PeerColorAssigned { .. } => PEER_COLOR_ASSIGNED,
            ProtocolMessage::PeerReady => PEER_READY,
            ProtocolMessage::ClientConnected { .. } => CLIENT_CONNECTED,
            ProtocolMessage::PunchBlocked { .. } => PUNCH_BLOCKED,
            ProtocolMessage::Unknown(tag) => tag,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Hands {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Condition>,
}

impl Hands {
    fn single(side: Side, condition: Condition) -> Self {
        match side {
            Side::Left => Hands {
                left: Some(condition),
                right: None,
            },
            Side::Right => Hands {
                left: None,
                right: Some(condition),
            },
        }
    }

    fn into_messages(self) -> Vec<ProtocolMessage> {
        [(Side::Left, self.left), (Side::Right, self.right)]
            .into_iter()
            .filter_map(|(side, condition)| {
                condition.map(|condition| ProtocolMessage::ConditionChanged { side, condition })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct GameOverBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub you_win: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ColorBody {
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub(crate) enum WireMessage {
    PlayerChanged(Hands),
    OpponentChanged(Hands),
    GameOver(GameOverBody),
    Reset,
    PeerColorAssigned(ColorBody),
    PeerReady,
    ClientConnected(ColorBody),
    PunchBlocked(ColorBody),
}

impl WireMessage {
    pub(crate) fn from_message(message: &ProtocolMessage) -> Result<Self, ProtocolError> {
        let wire = match *message {
            ProtocolMessage::ConditionChanged { side, condition } => {
                WireMessage::PlayerChanged(Hands::single(side, condition))
            }
            ProtocolMessage::GameOver(Outcome::YouWin(you_win)) => {
                WireMessage::GameOver(GameOverBody {
                    you_win: Some(you_win),
                    color: None,
                })
            }
            ProtocolMessage::GameOver(Outcome::Winner(color)) => {
                WireMessage::GameOver(GameOverBody {
                    you_win: None,
                    color: Some(color),
                })
            }
            ProtocolMessage::Reset => WireMessage::Reset,
            ProtocolMessage::PeerColorAssigned { color } => {
                WireMessage::PeerColorAssigned(ColorBody { color })
            }
            ProtocolMessage::PeerReady => WireMessage::PeerReady,
            ProtocolMessage::ClientConnected { color } => {
                WireMessage::ClientConnected(ColorBody { color })
            }
            ProtocolMessage::PunchBlocked { color } => WireMessage::PunchBlocked(ColorBody { color }),
            ProtocolMessage::Unknown(ref tag) => {
                return Err(ProtocolError::Unencodable(tag.clone()));
            }
        };
        Ok(wire)
    }

    /// A frame can carry both hands, so one wire message may become two.
    pub(crate) fn into_messages(self) -> Result<Vec<ProtocolMessage>, ProtocolError> {
        let messages = match self {
            // Both tags describe the far peer's hands from where we stand.
            WireMessage::PlayerChanged(hands) | WireMessage::OpponentChanged(hands) => {
                hands.into_messages()
            }
            WireMessage::GameOver(body) => {
                let outcome = match (body.you_win, body.color) {
                    (Some(you_win), _) => Outcome::YouWin(you_win),
                    (None, Some(color)) => Outcome::Winner(color),
                    (None, None) => {
                        return Err(ProtocolError::MissingField {
                            message_type: GAME_OVER,
                            field: "YouWin",
                        })
                    }
                };
                vec![ProtocolMessage::GameOver(outcome)]
            }
            WireMessage::Reset => vec![ProtocolMessage::Reset],
            WireMessage::PeerColorAssigned(ColorBody { color }) => {
                vec![ProtocolMessage::PeerColorAssigned { color }]
            }
            WireMessage::PeerReady => vec![ProtocolMessage::PeerReady],
            WireMessage::ClientConnected(ColorBody { color }) => {
                vec![ProtocolMessage::ClientConnected { color }]
            }
            WireMessage::PunchBlocked(ColorBody { color }) => {
                vec![ProtocolMessage::PunchBlocked { color }]
            }
        };
        Ok(messages)
    }

    pub(crate) fn is_known_type(tag: &str) -> bool {
        matches!(
            tag,
            PLAYER_CHANGED
                | OPPONENT_CHANGED
                | GAME_OVER
                | RESET
                | PEER_COLOR_ASSIGNED
                | PEER_READY
                | CLIENT_CONNECTED
                | PUNCH_BLOCKED
        )
    }
}
