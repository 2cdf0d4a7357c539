use std::any::Any;
use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::board::BoardModel;
use crate::config::{EngineConfig, HarnessConfig};
use crate::definition::{discover, TestCase};
use crate::error::{HarnessError, HarnessResult};
use crate::filter::TestFilter;
use crate::process::AbortHandle;
use crate::report::{ResultAggregator, SuiteReport};
use crate::scorer::{Evaluation, Scorer};
use crate::session::{EngineSession, SessionState};

/// Ordered test cases plus how often and which of them to run.
#[derive(Debug, Clone)]
pub struct TestSuite {
    cases: Vec<TestCase>,
    cycles: u32,
    filter: TestFilter,
}

impl TestSuite {
    /// Build a suite; identifiers must be unique and `cycles` at least 1.
    pub fn new(cases: Vec<TestCase>, cycles: u32, filter: TestFilter) -> HarnessResult<Self> {
        if cycles == 0 {
            return Err(HarnessError::config("cycles must be at least 1"));
        }
        let mut seen = HashSet::new();
        for case in &cases {
            if !seen.insert(case.id()) {
                return Err(HarnessError::config(format!(
                    "test number {} appears more than once",
                    case.id()
                )));
            }
        }
        Ok(Self {
            cases,
            cycles,
            filter,
        })
    }

    /// Discover the definitions in the configured directory.
    pub fn from_config(config: &HarnessConfig) -> HarnessResult<Self> {
        let cases = discover(&config.tests_dir)?;
        Self::new(cases, config.cycles, config.filter()?)
    }

    /// Every loaded case, filtered or not.
    pub fn all_cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Cases kept by the filter, in discovery order.
    pub fn selected(&self) -> impl Iterator<Item = &TestCase> + '_ {
        self.cases
            .iter()
            .filter(move |case| self.filter.matches(case.id()))
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn filter(&self) -> &TestFilter {
        &self.filter
    }

    /// Trials a complete run performs.
    pub fn trial_count(&self) -> u32 {
        let selected = u32::try_from(self.selected().count()).unwrap_or(u32::MAX);
        selected.saturating_mul(self.cycles)
    }
}

/// A selected case with its starting position parsed by the board model.
struct PreparedCase<'s, P> {
    case: &'s TestCase,
    start: P,
}

/// Result of a run: what was scored, and why the run stopped early if it did.
#[derive(Debug)]
pub struct SuiteOutcome {
    pub report: SuiteReport,
    pub error: Option<HarnessError>,
}

impl SuiteOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> HarnessResult<SuiteReport> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.report),
        }
    }
}

/// Runs suites against freshly spawned engines, scoring through a board model.
pub struct SuiteRunner<'b, B: BoardModel> {
    board: &'b B,
    engine: EngineConfig,
    time_per_test: Duration,
    workers: usize,
    abort: AbortHandle,
}

impl<'b, B: BoardModel> SuiteRunner<'b, B> {
    pub fn new(board: &'b B, engine: EngineConfig, time_per_test: Duration) -> Self {
        Self {
            board,
            engine,
            time_per_test,
            workers: 1,
            abort: AbortHandle::new(),
        }
    }

    pub fn from_config(board: &'b B, config: &HarnessConfig) -> HarnessResult<Self> {
        Ok(Self::new(board, config.engine_config()?, config.time_per_test()?)
            .with_workers(config.workers))
    }

    /// Engine processes used by [`SuiteRunner::run_with_workers`].
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Handle that stops the run between trials or during a search.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    fn prepare<'s>(
        &self,
        suite: &'s TestSuite,
    ) -> HarnessResult<Vec<PreparedCase<'s, B::Position>>> {
        suite
            .selected()
            .map(|case| {
                let start = self.board.parse_position(case.position()).map_err(|err| {
                    HarnessError::config(format!("{case}: {err}"))
                })?;
                Ok(PreparedCase { case, start })
            })
            .collect()
    }

    fn registered(cases: &[PreparedCase<'_, B::Position>]) -> ResultAggregator {
        let mut aggregator = ResultAggregator::new();
        for prepared in cases {
            aggregator.register(prepared.case.id(), prepared.case.name());
        }
        aggregator
    }

    /// Run every selected case for the suite's cycles on one engine.
    ///
    /// Each case runs all of its cycles before the next case starts. The
    /// report is returned even when the run stops early.
    pub fn run(&self, suite: &TestSuite) -> SuiteOutcome {
        let cases = match self.prepare(suite) {
            Ok(cases) => cases,
            Err(err) => {
                return SuiteOutcome {
                    report: ResultAggregator::new().report(),
                    error: Some(err),
                }
            }
        };
        info!(
            "running {} tests x {} cycles",
            cases.len(),
            suite.cycles()
        );

        let mut aggregator = Self::registered(&cases);
        let refs: Vec<&PreparedCase<'_, B::Position>> = cases.iter().collect();
        let error = self
            .run_cases(&refs, suite.cycles(), &self.abort, &mut aggregator)
            .err();
        if let Some(err) = &error {
            warn!("suite stopped early: {err}");
        }
        SuiteOutcome {
            report: aggregator.report(),
            error,
        }
    }

    fn run_cases(
        &self,
        cases: &[&PreparedCase<'_, B::Position>],
        cycles: u32,
        abort: &AbortHandle,
        aggregator: &mut ResultAggregator,
    ) -> HarnessResult<()> {
        let mut session: Option<EngineSession> = None;

        for prepared in cases {
            let case = prepared.case;
            for cycle in 1..=cycles {
                if abort.is_aborted() {
                    return Err(HarnessError::Aborted);
                }

                let active = match session.take() {
                    Some(active) if active.state() != SessionState::Poisoned => active,
                    stale => {
                        // Dropping a stale session kills its process.
                        drop(stale);
                        EngineSession::start(&self.engine, abort.clone())?
                    }
                };
                let active = session.insert(active);

                match self.run_trial(active, prepared) {
                    Ok(evaluation) => {
                        info!("{case} cycle {cycle}: scored {evaluation}");
                        aggregator.record(case.id(), case.name(), evaluation.score);
                    }
                    Err(err) if err.is_trial_failure() => {
                        debug!("{case} cycle {cycle}: trial failed: {err}");
                        aggregator.record(case.id(), case.name(), 0.0);
                        if err.poisons_session() {
                            session = None;
                        }
                    }
                    Err(err) => {
                        return Err(match err {
                            HarnessError::Config(message) => {
                                HarnessError::config(format!("{case}: {message}"))
                            }
                            other => other,
                        })
                    }
                }
            }
        }

        if let Some(active) = session {
            if let Err(err) = active.quit() {
                warn!("engine shutdown failed: {err}");
            }
        }
        Ok(())
    }

    fn run_trial(
        &self,
        session: &mut EngineSession,
        prepared: &PreparedCase<'_, B::Position>,
    ) -> HarnessResult<Evaluation> {
        let case = prepared.case;
        let budget = case.time_per_move().unwrap_or(self.time_per_test);

        session.new_game()?;
        session.set_time_per_move(budget)?;
        session.set_position(&self.board.position_text(&prepared.start))?;
        let best_move = session.go()?.best_move()?;
        debug!("{case}: engine played {best_move}");

        let evaluation =
            Scorer::new(self.board).evaluate(case.policy(), &prepared.start, &best_move)?;
        Ok(evaluation)
    }
}

impl<B> SuiteRunner<'_, B>
where
    B: BoardModel + Sync,
    B::Position: Sync,
{
    /// Run on as many engines as the runner was configured with.
    pub fn run_with_workers(&self, suite: &TestSuite) -> SuiteOutcome {
        self.run_parallel(suite, self.workers)
    }

    /// Spread the selected cases over `workers` engines running side by side.
    ///
    /// Cases are dealt round-robin; each worker owns its own engine process.
    /// A fatal error in one worker stops the others, and the merged report
    /// keeps suite order.
    pub fn run_parallel(&self, suite: &TestSuite, workers: usize) -> SuiteOutcome {
        if workers <= 1 {
            return self.run(suite);
        }

        let cases = match self.prepare(suite) {
            Ok(cases) => cases,
            Err(err) => {
                return SuiteOutcome {
                    report: ResultAggregator::new().report(),
                    error: Some(err),
                }
            }
        };
        info!(
            "running {} tests x {} cycles on {workers} engines",
            cases.len(),
            suite.cycles()
        );

        let run_abort = self.abort.child();
        let mut shares: Vec<Vec<&PreparedCase<'_, B::Position>>> = vec![Vec::new(); workers];
        for (index, prepared) in cases.iter().enumerate() {
            shares[index % workers].push(prepared);
        }

        let results: Vec<(ResultAggregator, Option<HarnessError>)> = thread::scope(|scope| {
            let handles: Vec<_> = shares
                .iter()
                .filter(|share| !share.is_empty())
                .map(|share| {
                    let run_abort = &run_abort;
                    scope.spawn(move || {
                        let mut aggregator = ResultAggregator::new();
                        let result =
                            self.run_cases(share, suite.cycles(), run_abort, &mut aggregator);
                        if result.is_err() {
                            run_abort.abort();
                        }
                        (aggregator, result.err())
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|payload| {
                        run_abort.abort();
                        (
                            ResultAggregator::new(),
                            Some(HarnessError::WorkerPanicked(panic_message(&*payload))),
                        )
                    })
                })
                .collect()
        });

        let mut aggregator = Self::registered(&cases);
        let mut error = None;
        for (worker_results, worker_error) in results {
            aggregator.merge(&worker_results);
            error = match (error, worker_error) {
                // Prefer the error that caused the stop over the aborts it triggered.
                (None, found) | (found @ Some(_), None) => found,
                (Some(HarnessError::Aborted), Some(found)) => Some(found),
                (Some(kept), Some(_)) => Some(kept),
            };
        }
        if let Some(err) = &error {
            warn!("suite stopped early: {err}");
        }
        SuiteOutcome {
            report: aggregator.report(),
            error,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
