// Fight phase state machine
// SelectingColor -> WaitingForPeer -> Fighting -> GameOver -> SelectingColor.
// Every transition is only valid from one phase; anything else is reported as
// an InvalidTransition for the caller to ignore.

use serde::Serialize;

use crate::condition::Color;
use crate::error::InvalidTransition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "Phase")]
pub enum GamePhase {
    SelectingColor,
    WaitingForPeer,
    Fighting,
    GameOver { winner: Color },
}

/// Phase without its payload, for logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    SelectingColor,
    WaitingForPeer,
    Fighting,
    GameOver,
}

impl GamePhase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            GamePhase::SelectingColor => PhaseKind::SelectingColor,
            GamePhase::WaitingForPeer => PhaseKind::WaitingForPeer,
            GamePhase::Fighting => PhaseKind::Fighting,
            GamePhase::GameOver { .. } => PhaseKind::GameOver,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GamePhase::SelectingColor => "SelectingColor",
            GamePhase::WaitingForPeer => "WaitingForPeer",
            GamePhase::Fighting => "Fighting",
            GamePhase::GameOver { .. } => "GameOver",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FightStateMachine {
    phase: GamePhase,
    local_color: Color,
    opponent_color: Color,
}

impl Default for FightStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl FightStateMachine {
    pub fn new() -> Self {
        Self {
            phase: GamePhase::SelectingColor,
            local_color: Color::Red,
            opponent_color: Color::Blue,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn local_color(&self) -> Color {
        self.local_color
    }

    pub fn opponent_color(&self) -> Color {
        self.opponent_color
    }

    /// Guard for inputs that are only meaningful while fighting.
    pub fn require_fighting(&self, attempted: &'static str) -> Result<(), InvalidTransition> {
        self.require(PhaseKind::Fighting, attempted)
    }

    pub fn select_color(&mut self, color: Color) -> Result<(), InvalidTransition> {
        self.require(PhaseKind::SelectingColor, "select_color")?;
        self.local_color = color;
        self.opponent_color = color.complement();
        self.phase = GamePhase::WaitingForPeer;
        Ok(())
    }

    /// Records the opponent's color before the fight starts. Once our own
    /// color is chosen, a clashing assignment is refused.
    pub fn assign_peer_color(&mut self, color: Color) -> Result<(), InvalidTransition> {
        match self.phase {
            GamePhase::SelectingColor => {
                self.opponent_color = color;
                self.local_color = color.complement();
                Ok(())
            }
            GamePhase::WaitingForPeer if color != self.local_color => {
                self.opponent_color = color;
                Ok(())
            }
            _ => Err(self.invalid("assign_peer_color")),
        }
    }

    pub fn peer_ready(&mut self) -> Result<(), InvalidTransition> {
        self.require(PhaseKind::WaitingForPeer, "peer_ready")?;
        self.phase = GamePhase::Fighting;
        Ok(())
    }

    /// `you_win` is addressed to this client. Returns the winner.
    pub fn game_over(&mut self, you_win: bool) -> Result<Color, InvalidTransition> {
        let winner = if you_win {
            self.local_color
        } else {
            self.opponent_color
        };
        self.game_over_with_winner(winner)
    }

    pub fn game_over_with_winner(&mut self, winner: Color) -> Result<Color, InvalidTransition> {
        self.require(PhaseKind::Fighting, "game_over")?;
        self.phase = GamePhase::GameOver { winner };
        Ok(winner)
    }

    pub fn reset(&mut self) -> Result<(), InvalidTransition> {
        self.require(PhaseKind::GameOver, "reset")?;
        self.phase = GamePhase::SelectingColor;
        Ok(())
    }

    /// Which fighter lost, as (local_lost, opponent_lost).
    pub fn losers(&self) -> (bool, bool) {
        match self.phase {
            GamePhase::GameOver { winner } => {
                (winner != self.local_color, winner != self.opponent_color)
            }
            _ => (false, false),
        }
    }

    fn require(&self, kind: PhaseKind, attempted: &'static str) -> Result<(), InvalidTransition> {
        if self.phase.kind() == kind {
            Ok(())
        } else {
            Err(self.invalid(attempted))
        }
    }

    fn invalid(&self, attempted: &'static str) -> InvalidTransition {
        InvalidTransition {
            phase: self.phase.kind(),
            attempted,
        }
    }
}
