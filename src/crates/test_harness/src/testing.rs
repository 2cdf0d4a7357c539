//! A toy board for exercising the harness without a real rules engine.
//!
//! Positions are written as a side tag followed by pieces, e.g. `g Ra2 Ed4 rc7`
//! (whitespace, including newlines, separates tokens). Moves are up to four
//! steps such as `Ed4n` or `rc6x`. Every piece may step onto an empty
//! neighbouring square, except that rabbits cannot step backwards. A gold
//! rabbit (`R`) on rank 8 or a silver rabbit (`r`) on rank 1 is a goal.
//! There are no traps, pushes or freezing.

use std::collections::BTreeMap;

use crate::board::{BoardError, BoardModel, Side};
use crate::expectation::{Square, PIECES};

/// Pieces by square plus the side to move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubPosition {
    side: Side,
    pieces: BTreeMap<Square, char>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StubBoard;

const DIRECTIONS: [(char, i8, i8); 4] = [('n', 0, 1), ('s', 0, -1), ('e', 1, 0), ('w', -1, 0)];

fn owner(piece: char) -> Side {
    if piece.is_ascii_uppercase() {
        Side::Gold
    } else {
        Side::Silver
    }
}

fn neighbour(square: Square, direction: char) -> Option<Square> {
    let (_, df, dr) = DIRECTIONS.iter().find(|(name, _, _)| *name == direction)?;
    let file = u8::try_from(i16::from(square.file()) + i16::from(*df)).ok()?;
    let rank = u8::try_from(i16::from(square.rank()) + i16::from(*dr)).ok()?;
    Square::new(file, rank)
}

fn is_retreat(piece: char, direction: char) -> bool {
    matches!((piece, direction), ('R', 's') | ('r', 'n'))
}

fn parse_square(text: &str, context: &str) -> Result<Square, BoardError> {
    text.parse()
        .map_err(|_| BoardError::Parse(format!("bad square in `{context}`")))
}

impl StubBoard {
    fn step(position: &mut StubPosition, step: &str) -> Result<(), BoardError> {
        let illegal = || BoardError::IllegalMove(step.to_string());
        let mut chars = step.chars();
        let piece = chars.next().ok_or_else(illegal)?;
        let action = chars.next_back().ok_or_else(illegal)?;
        let from: Square = chars.as_str().parse().map_err(|_| illegal())?;
        if position.pieces.get(&from) != Some(&piece) {
            return Err(illegal());
        }

        if action == 'x' {
            position.pieces.remove(&from);
            return Ok(());
        }
        if is_retreat(piece, action) {
            return Err(illegal());
        }
        let to = neighbour(from, action).ok_or_else(illegal)?;
        if position.pieces.contains_key(&to) {
            return Err(illegal());
        }
        position.pieces.remove(&from);
        position.pieces.insert(to, piece);
        Ok(())
    }
}

impl BoardModel for StubBoard {
    type Position = StubPosition;

    fn parse_position(&self, text: &str) -> Result<StubPosition, BoardError> {
        let mut tokens = text.split_whitespace();
        let side = match tokens.next() {
            Some("g") | Some("w") => Side::Gold,
            Some("s") | Some("b") => Side::Silver,
            other => {
                return Err(BoardError::Parse(format!(
                    "expected side to move, found {other:?}"
                )))
            }
        };

        let mut pieces = BTreeMap::new();
        for token in tokens {
            let mut chars = token.chars();
            let piece = chars
                .next()
                .filter(|c| PIECES.contains(*c))
                .ok_or_else(|| BoardError::Parse(format!("bad piece `{token}`")))?;
            let square = parse_square(chars.as_str(), token)?;
            if pieces.insert(square, piece).is_some() {
                return Err(BoardError::Parse(format!("square {square} used twice")));
            }
        }
        Ok(StubPosition { side, pieces })
    }

    fn position_text(&self, position: &StubPosition) -> String {
        let mut text = position.side.tag().to_string();
        for (square, piece) in &position.pieces {
            text.push_str(&format!(" {piece}{square}"));
        }
        text
    }

    fn apply_move(
        &self,
        position: &StubPosition,
        move_text: &str,
    ) -> Result<StubPosition, BoardError> {
        let steps: Vec<&str> = move_text.split_whitespace().collect();
        if steps.is_empty() || steps.len() > 4 {
            return Err(BoardError::IllegalMove(move_text.to_string()));
        }
        let mut next = position.clone();
        for step in steps {
            Self::step(&mut next, step)?;
        }
        next.side = position.side.opponent();
        Ok(next)
    }

    fn goal_for(&self, position: &StubPosition) -> Option<Side> {
        let reached = |side: Side| {
            position.pieces.iter().any(|(square, piece)| match side {
                Side::Gold => *piece == 'R' && square.rank() == 7,
                Side::Silver => *piece == 'r' && square.rank() == 0,
            })
        };
        // The side that just moved is checked first.
        let last_mover = position.side.opponent();
        [last_mover, position.side]
            .into_iter()
            .find(|side| reached(*side))
    }

    fn side_to_move(&self, position: &StubPosition) -> Side {
        position.side
    }

    fn legal_replies(&self, position: &StubPosition) -> Vec<(StubPosition, String)> {
        let mut replies = Vec::new();
        for (square, piece) in &position.pieces {
            if owner(*piece) != position.side {
                continue;
            }
            for (direction, _, _) in DIRECTIONS {
                let step = format!("{piece}{square}{direction}");
                if let Ok(next) = self.apply_move(position, &step) {
                    replies.push((next, step));
                }
            }
        }
        replies
    }

    fn piece_at(&self, position: &StubPosition, square: &str) -> Option<char> {
        let square: Square = square.parse().ok()?;
        position.pieces.get(&square).copied()
    }
}
