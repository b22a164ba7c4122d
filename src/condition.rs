// Hand conditions, sides and player colors shared by every layer

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a single hand. Unspecified values are always Neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Condition {
    #[default]
    Neutral,
    Block,
    Punch,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Neutral => "Neutral",
            Condition::Block => "Block",
            Condition::Punch => "Punch",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub(crate) fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("Left"),
            Side::Right => f.write_str("Right"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    Red,
    Blue,
}

impl Color {
    pub fn complement(self) -> Color {
        match self {
            Color::Red => Color::Blue,
            Color::Blue => Color::Red,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Red => f.write_str("Red"),
            Color::Blue => f.write_str("Blue"),
        }
    }
}

/// Both hands of one fighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FighterState {
    pub left: Condition,
    pub right: Condition,
}

impl FighterState {
    pub fn get(&self, side: Side) -> Condition {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    /// Returns the previous condition of that hand.
    pub fn set(&mut self, side: Side, condition: Condition) -> Condition {
        let slot = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        std::mem::replace(slot, condition)
    }

    pub fn is_neutral(&self) -> bool {
        self.left == Condition::Neutral && self.right == Condition::Neutral
    }
}
