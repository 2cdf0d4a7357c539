//! Utilities for spawning an AEI game engine, feeding it scripted positions and
//! scoring the moves it chooses.
//!
//! Typical usage:
//! ```no_run
//! use aei_test_harness::{BoardModel, HarnessConfig, HarnessResult, SuiteRunner, TestSuite};
//!
//! fn run_suite<B>(board: &B) -> HarnessResult<()>
//! where
//!     B: BoardModel + Sync,
//!     B::Position: Sync,
//! {
//!     let config = HarnessConfig::load("suite.json")?;
//!     let suite = TestSuite::from_config(&config)?;
//!     let runner = SuiteRunner::from_config(board, &config)?;
//!
//!     // `workers` in the config decides how many engines run side by side.
//!     let outcome = runner.run_with_workers(&suite);
//!     println!("{}", outcome.report);
//!     outcome.into_result().map(|_| ())
//! }
//! ```

mod board;
mod config;
mod definition;
mod error;
mod expectation;
mod filter;
mod process;
mod report;
mod response;
mod scorer;
mod session;
mod suite;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use board::{BoardError, BoardModel, Side};
pub use config::{CommandLine, EngineConfig, HarnessConfig};
pub use definition::{discover, test_id_from_name, Policy, TestCase, DEFINITION_EXTENSION};
pub use error::{HarnessError, HarnessResult};
pub use expectation::{Clause, Condition, Expectation, Square};
pub use filter::TestFilter;
pub use process::{AbortHandle, EngineProcess};
pub use report::{ResultAggregator, ScoreRecord, SuiteReport, TestReport};
pub use response::{classify, Response};
pub use scorer::{Evaluation, Scorer};
pub use session::{EngineSession, SearchStream, SessionState, TIME_PER_MOVE_OPTION};
pub use suite::{SuiteOutcome, SuiteRunner, TestSuite};
