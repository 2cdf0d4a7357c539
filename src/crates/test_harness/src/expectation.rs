//! Expected piece layouts for the `piece_position` policy.
//!
//! ```text
//! Ed5 Rc4 : 1 | xrc6 : 0.5 | Ed5
//! ```
//!
//! Clauses are separated by `|` and tried in order. A clause lists conditions
//! separated by whitespace and may end with `: <reward>` (default 1).
//! `Ed5` requires an `E` on d5 after the engine's move; `xrc6` requires the
//! move to capture an `r` on c6.

use std::fmt;
use std::str::FromStr;

use crate::error::{HarnessError, HarnessResult};

pub(crate) const PIECES: &str = "EMHDCRemhdcr";

/// A board square, `a1` to `h8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Square {
    file: u8,
    rank: u8,
}

impl Square {
    /// File and rank, both zero-based.
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        (file < 8 && rank < 8).then_some(Self { file, rank })
    }

    pub fn file(self) -> u8 {
        self.file
    }

    pub fn rank(self) -> u8 {
        self.rank
    }
}

impl FromStr for Square {
    type Err = HarnessError;

    fn from_str(text: &str) -> HarnessResult<Self> {
        let bytes = text.as_bytes();
        let square = match bytes {
            [file @ b'a'..=b'h', rank @ b'1'..=b'8'] => Square::new(file - b'a', rank - b'1'),
            _ => None,
        };
        square.ok_or_else(|| HarnessError::config(format!("invalid square `{text}`")))
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'a' + self.file) as char, self.rank + 1)
    }
}

/// One requirement inside a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// `piece` stands on `square` after the move.
    Occupies { piece: char, square: Square },
    /// The move removed `piece` from `square`.
    Captured { piece: char, square: Square },
}

impl Condition {
    /// Step token the engine writes for this capture (`rc6x`).
    pub fn capture_token(&self) -> Option<String> {
        match self {
            Condition::Captured { piece, square } => Some(format!("{piece}{square}x")),
            Condition::Occupies { .. } => None,
        }
    }
}

impl FromStr for Condition {
    type Err = HarnessError;

    fn from_str(token: &str) -> HarnessResult<Self> {
        let invalid = || HarnessError::config(format!("invalid piece condition `{token}`"));
        let (captured, rest) = match token.strip_prefix('x') {
            Some(rest) => (true, rest),
            None => (false, token),
        };

        let mut chars = rest.chars();
        let piece = chars.next().filter(|c| PIECES.contains(*c)).ok_or_else(invalid)?;
        let square: Square = chars.as_str().parse().map_err(|_| invalid())?;

        Ok(if captured {
            Condition::Captured { piece, square }
        } else {
            Condition::Occupies { piece, square }
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Occupies { piece, square } => write!(f, "{piece}{square}"),
            Condition::Captured { piece, square } => write!(f, "x{piece}{square}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub conditions: Vec<Condition>,
    pub reward: f64,
}

/// Ordered alternatives; the first satisfied clause decides the reward.
#[derive(Debug, Clone, PartialEq)]
pub struct Expectation {
    clauses: Vec<Clause>,
}

impl Expectation {
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Index and reward of the first clause whose conditions all hold.
    pub fn first_match(&self, holds: impl Fn(&Condition) -> bool) -> Option<(usize, f64)> {
        self.clauses
            .iter()
            .position(|clause| clause.conditions.iter().all(&holds))
            .map(|index| (index, self.clauses[index].reward))
    }
}

impl FromStr for Expectation {
    type Err = HarnessError;

    fn from_str(text: &str) -> HarnessResult<Self> {
        let clauses = text
            .split('|')
            .map(parse_clause)
            .collect::<HarnessResult<Vec<_>>>()?;
        Ok(Self { clauses })
    }
}

fn parse_clause(text: &str) -> HarnessResult<Clause> {
    let (conditions, reward) = match text.split_once(':') {
        Some((conditions, reward)) => {
            let reward_text = reward.trim();
            let reward: f64 = reward_text.parse().map_err(|_| {
                HarnessError::config(format!("invalid reward `{reward_text}`"))
            })?;
            if !(reward.is_finite() && reward >= 0.0) {
                return Err(HarnessError::config(format!(
                    "reward must be a non-negative number, got `{reward_text}`"
                )));
            }
            (conditions, reward)
        }
        None => (text, 1.0),
    };

    let conditions = conditions
        .split_whitespace()
        .map(str::parse)
        .collect::<HarnessResult<Vec<Condition>>>()?;
    if conditions.is_empty() {
        return Err(HarnessError::config(format!(
            "empty clause `{}` in piece position expectation",
            text.trim()
        )));
    }
    Ok(Clause { conditions, reward })
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, clause) in self.clauses.iter().enumerate() {
            if index > 0 {
                f.write_str(" | ")?;
            }
            for condition in &clause.conditions {
                write!(f, "{condition} ")?;
            }
            write!(f, ": {}", clause.reward)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(text: &str) -> Square {
        text.parse().unwrap()
    }

    #[test]
    fn parses_squares_on_the_board_only() {
        assert_eq!(sq("a1"), Square::new(0, 0).unwrap());
        assert_eq!(sq("h8").to_string(), "h8");
        for bad in ["i1", "a9", "a0", "A1", "a", "a10"] {
            assert!(bad.parse::<Square>().is_err(), "{bad}");
        }
    }

    #[test]
    fn parses_clauses_with_rewards() {
        let expectation: Expectation = "Ed5 xrc6 : 0.5 | Ra8".parse().unwrap();
        assert_eq!(expectation.clauses().len(), 2);
        assert_eq!(
            expectation.clauses()[0].conditions,
            vec![
                Condition::Occupies {
                    piece: 'E',
                    square: sq("d5")
                },
                Condition::Captured {
                    piece: 'r',
                    square: sq("c6")
                },
            ]
        );
        assert_eq!(expectation.clauses()[0].reward, 0.5);
        assert_eq!(expectation.clauses()[1].reward, 1.0);
    }

    #[test]
    fn capture_token_matches_step_notation() {
        let condition: Condition = "xrc6".parse().unwrap();
        assert_eq!(condition.capture_token().as_deref(), Some("rc6x"));
        assert_eq!("Ed5".parse::<Condition>().unwrap().capture_token(), None);
    }

    #[test]
    fn first_satisfied_clause_wins() {
        let expectation: Expectation = "Ed5 : 2 | Rb2 : 0.25 | Rb2".parse().unwrap();
        let only_rabbit = |condition: &Condition| {
            matches!(condition, Condition::Occupies { piece: 'R', .. })
        };
        assert_eq!(expectation.first_match(only_rabbit), Some((1, 0.25)));
        assert_eq!(expectation.first_match(|_| false), None);
    }

    #[test]
    fn rejects_malformed_expectations() {
        for text in ["", "Ed5 |", "Qd5", "Ed9", "Ed5 : many", "Ed5 : -1", "x", ": 1"] {
            assert!(
                matches!(text.parse::<Expectation>(), Err(HarnessError::Config(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_is_parseable() {
        let expectation: Expectation = "Ed5 xrc6:0.5|Ra8".parse().unwrap();
        let reparsed: Expectation = expectation.to_string().parse().unwrap();
        assert_eq!(reparsed, expectation);
    }
}
