use std::fmt;

use crate::board::{BoardError, BoardModel};
use crate::definition::Policy;
use crate::expectation::{Condition, Expectation};

/// Score awarded to one trial, with a human-readable reason.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub score: f64,
    pub detail: String,
}

impl Evaluation {
    fn pass(detail: impl Into<String>) -> Self {
        Self {
            score: 1.0,
            detail: detail.into(),
        }
    }

    fn fail(detail: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            detail: detail.into(),
        }
    }

    pub fn passed(&self) -> bool {
        self.score > 0.0
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.score, self.detail)
    }
}

/// Applies evaluation policies through a board model.
pub struct Scorer<'b, B: BoardModel> {
    board: &'b B,
}

impl<'b, B: BoardModel> Scorer<'b, B> {
    pub fn new(board: &'b B) -> Self {
        Self { board }
    }

    /// Judge `move_text` played from `start` under `policy`.
    ///
    /// An illegal move is returned as an error; callers score it as 0.
    pub fn evaluate(
        &self,
        policy: &Policy,
        start: &B::Position,
        move_text: &str,
    ) -> Result<Evaluation, BoardError> {
        match policy {
            Policy::ScoreGoal => self.score_goal(start, move_text),
            Policy::PreventGoal => self.prevent_goal(start, move_text),
            Policy::PiecePosition(expectation) => {
                self.piece_position(expectation, start, move_text)
            }
        }
    }

    fn play(&self, start: &B::Position, move_text: &str) -> Result<B::Position, BoardError> {
        if move_text.trim().is_empty() {
            return Err(BoardError::IllegalMove(move_text.to_string()));
        }
        self.board.apply_move(start, move_text)
    }

    fn score_goal(&self, start: &B::Position, move_text: &str) -> Result<Evaluation, BoardError> {
        let mover = self.board.side_to_move(start);
        let after = self.play(start, move_text)?;
        Ok(match self.board.goal_for(&after) {
            Some(side) if side == mover => Evaluation::pass(format!("{move_text} reaches goal")),
            Some(side) => Evaluation::fail(format!("{move_text} hands {side} the goal")),
            None => Evaluation::fail(format!("{move_text} does not reach goal")),
        })
    }

    fn prevent_goal(&self, start: &B::Position, move_text: &str) -> Result<Evaluation, BoardError> {
        let mover = self.board.side_to_move(start);
        let opponent = mover.opponent();
        if self.board.goal_for(start) == Some(opponent) {
            return Ok(Evaluation::pass(format!(
                "{opponent} already has a goal in the starting position"
            )));
        }

        let after = self.play(start, move_text)?;
        match self.board.goal_for(&after) {
            Some(side) if side == mover => {
                return Ok(Evaluation::pass(format!("{move_text} wins outright")))
            }
            Some(_) => {
                return Ok(Evaluation::fail(format!(
                    "{move_text} gives {opponent} the goal"
                )))
            }
            None => {}
        }

        let escape = self
            .board
            .legal_replies(&after)
            .into_iter()
            .find(|(position, _)| self.board.goal_for(position) == Some(opponent));
        Ok(match escape {
            Some((_, reply)) => Evaluation::fail(format!(
                "after {move_text}, {opponent} reaches goal with {reply}"
            )),
            None => Evaluation::pass(format!("{move_text} stops every goal")),
        })
    }

    fn piece_position(
        &self,
        expectation: &Expectation,
        start: &B::Position,
        move_text: &str,
    ) -> Result<Evaluation, BoardError> {
        let after = self.play(start, move_text)?;
        let steps: Vec<&str> = move_text.split_whitespace().collect();
        let holds = |condition: &Condition| match condition {
            Condition::Occupies { piece, square } => {
                self.board.piece_at(&after, &square.to_string()) == Some(*piece)
            }
            Condition::Captured { .. } => condition
                .capture_token()
                .is_some_and(|token| steps.contains(&token.as_str())),
        };

        Ok(match expectation.first_match(holds) {
            Some((index, reward)) => Evaluation {
                score: reward,
                detail: format!("{move_text} matches clause {}", index + 1),
            },
            None => Evaluation::fail(format!("{move_text} matches no clause")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubBoard;

    fn position(board: &StubBoard, text: &str) -> <StubBoard as BoardModel>::Position {
        board.parse_position(text).expect("position should parse")
    }

    #[test]
    fn score_goal_passes_only_when_the_mover_scores() {
        let board = StubBoard;
        let scorer = Scorer::new(&board);
        let start = position(&board, "g Rc7 rh5");

        let win = scorer.evaluate(&Policy::ScoreGoal, &start, "Rc7n").unwrap();
        assert_eq!(win.score, 1.0);

        let idle = scorer.evaluate(&Policy::ScoreGoal, &start, "Rc7w").unwrap();
        assert_eq!(idle.score, 0.0);
    }

    #[test]
    fn score_goal_fails_far_from_goal() {
        let board = StubBoard;
        let scorer = Scorer::new(&board);
        let start = position(&board, "g Ra2 rh7");
        let result = scorer.evaluate(&Policy::ScoreGoal, &start, "Ra2n").unwrap();
        assert!(!result.passed());
    }

    #[test]
    fn illegal_moves_are_board_errors() {
        let board = StubBoard;
        let scorer = Scorer::new(&board);
        let start = position(&board, "g Ra2");
        assert!(matches!(
            scorer.evaluate(&Policy::ScoreGoal, &start, "Rb5n"),
            Err(BoardError::IllegalMove(_))
        ));
        assert!(scorer.evaluate(&Policy::ScoreGoal, &start, "  ").is_err());
    }

    #[test]
    fn prevent_goal_is_vacuous_when_opponent_already_scored() {
        let board = StubBoard;
        let scorer = Scorer::new(&board);
        // Silver rabbit already on gold's home rank.
        let start = position(&board, "g Ra4 rc1");
        let result = scorer
            .evaluate(&Policy::PreventGoal, &start, "not even a move")
            .unwrap();
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn prevent_goal_reports_the_escaping_reply() {
        let board = StubBoard;
        let scorer = Scorer::new(&board);
        // Silver threatens c2-c1; gold wanders off on the other wing.
        let start = position(&board, "g Eh5 rc2");
        let result = scorer.evaluate(&Policy::PreventGoal, &start, "Eh5n").unwrap();
        assert_eq!(result.score, 0.0);
        assert!(result.detail.contains("rc2s"), "{}", result.detail);
    }

    #[test]
    fn prevent_goal_passes_when_the_threat_is_blocked() {
        let board = StubBoard;
        let scorer = Scorer::new(&board);
        let start = position(&board, "g Ed2 rc2");
        let result = scorer.evaluate(&Policy::PreventGoal, &start, "Ed2s Ed1w").unwrap();
        assert_eq!(result.score, 1.0, "{}", result.detail);
    }

    #[test]
    fn piece_position_returns_first_matching_reward() {
        let board = StubBoard;
        let scorer = Scorer::new(&board);
        let start = position(&board, "g Ed4 rd5");
        let expectation: Expectation = "Ed6 : 1 | Ee4 : 0.5".parse().unwrap();
        let policy = Policy::PiecePosition(expectation);

        let second = scorer.evaluate(&policy, &start, "Ed4e").unwrap();
        assert_eq!(second.score, 0.5);
        assert!(second.detail.contains("clause 2"));

        let none = scorer.evaluate(&policy, &start, "Ed4w").unwrap();
        assert_eq!(none.score, 0.0);
    }

    #[test]
    fn piece_position_checks_captures_in_the_move() {
        let board = StubBoard;
        let scorer = Scorer::new(&board);
        let start = position(&board, "g Ed4 rd5");
        let policy = Policy::PiecePosition("xrd5 Ed4".parse().unwrap());

        let captured = scorer.evaluate(&policy, &start, "rd5x").unwrap();
        assert_eq!(captured.score, 1.0);
        let kept = scorer.evaluate(&policy, &start, "Ed4s").unwrap();
        assert_eq!(kept.score, 0.0);
    }
}
