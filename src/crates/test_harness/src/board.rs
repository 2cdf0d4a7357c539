use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Player colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Gold,
    Silver,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Gold => Side::Silver,
            Side::Silver => Side::Gold,
        }
    }

    /// Single-letter tag used on the wire (`g` / `s`).
    pub fn tag(self) -> char {
        match self {
            Side::Gold => 'g',
            Side::Silver => 's',
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Gold => f.write_str("gold"),
            Side::Silver => f.write_str("silver"),
        }
    }
}

/// Errors reported by a board model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("could not parse position: {0}")]
    Parse(String),
    #[error("illegal move `{0}`")]
    IllegalMove(String),
}

/// Position and rules capability consumed by the harness.
///
/// Implementations are pure: every operation takes positions by reference and
/// returns new values. The harness never looks inside a position.
pub trait BoardModel {
    type Position: Clone;

    /// Parse a test definition's starting position.
    fn parse_position(&self, text: &str) -> Result<Self::Position, BoardError>;

    /// Serialized form handed to the engine with `setposition`.
    fn position_text(&self, position: &Self::Position) -> String;

    /// Apply a full move (all steps of one turn) for the side to move.
    fn apply_move(
        &self,
        position: &Self::Position,
        move_text: &str,
    ) -> Result<Self::Position, BoardError>;

    /// The side that has reached its goal in `position`, if any.
    fn goal_for(&self, position: &Self::Position) -> Option<Side>;

    fn side_to_move(&self, position: &Self::Position) -> Side;

    /// Every legal move for the side to move, paired with the resulting position.
    fn legal_replies(&self, position: &Self::Position) -> Vec<(Self::Position, String)>;

    /// Piece letter occupying `square` (`a1`..`h8`), if any.
    fn piece_at(&self, position: &Self::Position, square: &str) -> Option<char>;

    /// Join individual steps into move text.
    fn serialize_move(&self, steps: &[String]) -> String {
        steps.join(" ")
    }
}
