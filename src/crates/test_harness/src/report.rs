use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::HarnessResult;

/// Accumulated score of one test case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub score: f64,
    pub trials: u32,
}

impl ScoreRecord {
    pub fn add(&mut self, score: f64) {
        self.score += score;
        self.trials += 1;
    }

    pub fn absorb(&mut self, other: ScoreRecord) {
        self.score += other.score;
        self.trials += other.trials;
    }
}

#[derive(Debug, Clone)]
struct Tally {
    id: u32,
    name: String,
    record: ScoreRecord,
}

/// Collects trial scores per test case, in the order tests were registered.
///
/// Records only grow. Merging two aggregators is commutative and associative,
/// so per-worker results can be combined in any order.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    tallies: Vec<Tally>,
    index: HashMap<u32, usize>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `id` has a slot; the first registration fixes report order.
    pub fn register(&mut self, id: u32, name: &str) -> &mut ScoreRecord {
        let slot = match self.index.get(&id) {
            Some(slot) => *slot,
            None => {
                self.tallies.push(Tally {
                    id,
                    name: name.to_string(),
                    record: ScoreRecord::default(),
                });
                self.index.insert(id, self.tallies.len() - 1);
                self.tallies.len() - 1
            }
        };
        &mut self.tallies[slot].record
    }

    /// Add one trial's score.
    pub fn record(&mut self, id: u32, name: &str, score: f64) {
        self.register(id, name).add(score);
    }

    pub fn get(&self, id: u32) -> Option<ScoreRecord> {
        self.index.get(&id).map(|slot| self.tallies[*slot].record)
    }

    /// Fold another aggregator's records into this one.
    pub fn merge(&mut self, other: &ResultAggregator) {
        for tally in &other.tallies {
            self.register(tally.id, &tally.name).absorb(tally.record);
        }
    }

    pub fn total(&self) -> ScoreRecord {
        let mut total = ScoreRecord::default();
        for tally in &self.tallies {
            total.absorb(tally.record);
        }
        total
    }

    /// Snapshot of everything recorded so far. Tests without trials are left out.
    pub fn report(&self) -> SuiteReport {
        let tests = self
            .tallies
            .iter()
            .filter(|tally| tally.record.trials > 0)
            .map(|tally| TestReport {
                id: tally.id,
                name: tally.name.clone(),
                score: tally.record.score,
                trials: tally.record.trials,
            })
            .collect();
        let total = self.total();
        SuiteReport {
            tests,
            score: total.score,
            trials: total.trials,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestReport {
    pub id: u32,
    pub name: String,
    pub score: f64,
    pub trials: u32,
}

/// Final (or partial) result of a suite run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteReport {
    pub tests: Vec<TestReport>,
    pub score: f64,
    pub trials: u32,
}

impl SuiteReport {
    pub fn to_json(&self) -> HarnessResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for test in &self.tests {
            writeln!(f, "{} scored {} of {}", test.name, test.score, test.trials)?;
        }
        write!(f, "scored {} of {}", self.score, self.trials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_per_test_and_total_lines() {
        let mut aggregator = ResultAggregator::new();
        for score in [1.0, 0.0, 1.0] {
            aggregator.record(1, "goal in one", score);
        }
        for score in [0.5, 0.0, 0.5] {
            aggregator.record(4, "keep the elephant", score);
        }

        let report = aggregator.report();
        assert_eq!(
            report.to_string(),
            "goal in one scored 2 of 3\nkeep the elephant scored 1 of 3\nscored 3 of 6"
        );
    }

    #[test]
    fn recording_cycles_one_at_a_time_matches_merging() {
        let trials = [(1, 1.0), (2, 0.0), (1, 0.0), (2, 0.5)];

        let mut running = ResultAggregator::new();
        for (id, score) in trials {
            running.record(id, "t", score);
        }

        let mut first = ResultAggregator::new();
        let mut second = ResultAggregator::new();
        for (id, score) in &trials[..2] {
            first.record(*id, "t", *score);
        }
        for (id, score) in &trials[2..] {
            second.record(*id, "t", *score);
        }

        let mut forward = first.clone();
        forward.merge(&second);
        let mut backward = second.clone();
        backward.merge(&first);

        assert_eq!(forward.total(), running.total());
        assert_eq!(backward.total(), running.total());
        assert_eq!(forward.get(1), running.get(1));
        assert_eq!(backward.get(2), running.get(2));
    }

    #[test]
    fn merge_is_associative() {
        let mut a = ResultAggregator::new();
        let mut b = ResultAggregator::new();
        let mut c = ResultAggregator::new();
        a.record(1, "one", 1.0);
        b.record(2, "two", 0.25);
        c.record(1, "one", 0.0);

        let mut left = a.clone();
        left.merge(&b);
        left.merge(&c);

        let mut bc = b.clone();
        bc.merge(&c);
        let mut right = a.clone();
        right.merge(&bc);

        assert_eq!(left.report(), right.report());
    }

    #[test]
    fn registered_tests_without_trials_are_omitted() {
        let mut aggregator = ResultAggregator::new();
        aggregator.register(1, "never ran");
        aggregator.record(2, "ran once", 1.0);
        let report = aggregator.report();
        assert_eq!(report.tests.len(), 1);
        assert_eq!(report.to_string(), "ran once scored 1 of 1\nscored 1 of 1");
    }

    #[test]
    fn serializes_to_json() {
        let mut aggregator = ResultAggregator::new();
        aggregator.record(3, "json", 0.5);
        let json = aggregator.report().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["tests"][0]["id"], 3);
        assert_eq!(value["score"], 0.5);
        assert_eq!(value["trials"], 1);
    }
}
