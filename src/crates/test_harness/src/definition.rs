use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::config::seconds;
use crate::error::{HarnessError, HarnessResult};
use crate::expectation::Expectation;

/// File extension of test definitions picked up by [`discover`].
pub const DEFINITION_EXTENSION: &str = "json";

/// How the engine's answer to a test is judged.
#[derive(Debug, Clone, PartialEq)]
pub enum Policy {
    /// The move must reach the mover's goal. Scores 1 or 0.
    ScoreGoal,
    /// No opponent reply may reach the opponent's goal. Scores 1 or 0.
    PreventGoal,
    /// Graded comparison of the resulting layout.
    PiecePosition(Expectation),
}

impl Policy {
    pub fn tag(&self) -> &'static str {
        match self {
            Policy::ScoreGoal => "score goal",
            Policy::PreventGoal => "prevent goal",
            Policy::PiecePosition(_) => "piece_position",
        }
    }
}

/// Policy names without parameters, as written in the `condition` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PolicyTag {
    ScoreGoal,
    PreventGoal,
    PiecePosition,
}

impl FromStr for PolicyTag {
    type Err = HarnessError;

    /// Case, `_`, `-` and repeated spaces are not significant.
    fn from_str(text: &str) -> HarnessResult<Self> {
        let normalized = text
            .to_ascii_lowercase()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match normalized.as_str() {
            "score goal" => Ok(PolicyTag::ScoreGoal),
            "prevent goal" => Ok(PolicyTag::PreventGoal),
            "piece position" => Ok(PolicyTag::PiecePosition),
            _ => Err(HarnessError::config(format!("unknown condition `{text}`"))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PositionText {
    Text(String),
    Lines(Vec<String>),
}

impl PositionText {
    fn into_text(self) -> String {
        match self {
            PositionText::Text(text) => text,
            PositionText::Lines(lines) => lines.join("\n"),
        }
    }
}

/// On-disk form of a test definition.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefinition {
    name: String,
    #[serde(default)]
    description: Option<String>,
    condition: String,
    position: PositionText,
    #[serde(default)]
    time_per_move: Option<f64>,
    #[serde(default)]
    after_piece_position: Option<String>,
}

/// One scripted scenario. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    id: u32,
    name: String,
    description: Option<String>,
    source: Option<PathBuf>,
    position: String,
    time_per_move: Option<Duration>,
    policy: Policy,
}

impl TestCase {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        position: impl Into<String>,
        policy: Policy,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            source: None,
            position: position.into(),
            time_per_move: None,
            policy,
        }
    }

    /// Override the run's time per test for this case.
    pub fn with_time_per_move(mut self, budget: Duration) -> Self {
        self.time_per_move = Some(budget);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Parse a definition; `id` comes from the definition's file name.
    pub fn from_json_str(id: u32, text: &str) -> HarnessResult<Self> {
        let raw: RawDefinition = serde_json::from_str(text)
            .map_err(|err| HarnessError::config(format!("test {id}: {err}")))?;
        Self::from_raw(id, raw).map_err(|err| match err {
            HarnessError::Config(message) => HarnessError::config(format!("test {id}: {message}")),
            other => other,
        })
    }

    fn from_raw(id: u32, raw: RawDefinition) -> HarnessResult<Self> {
        if raw.name.trim().is_empty() {
            return Err(HarnessError::config("name is empty"));
        }

        let policy = match (raw.condition.parse::<PolicyTag>()?, raw.after_piece_position) {
            (PolicyTag::PiecePosition, Some(expectation)) => {
                Policy::PiecePosition(expectation.parse()?)
            }
            (PolicyTag::PiecePosition, None) => {
                return Err(HarnessError::config(
                    "piece_position needs an after_piece_position expectation",
                ))
            }
            (_, Some(_)) => {
                return Err(HarnessError::config(format!(
                    "after_piece_position is only valid with piece_position, not `{}`",
                    raw.condition
                )))
            }
            (PolicyTag::ScoreGoal, None) => Policy::ScoreGoal,
            (PolicyTag::PreventGoal, None) => Policy::PreventGoal,
        };

        let time_per_move = match raw.time_per_move {
            Some(value) => {
                let budget = seconds("time_per_move", value)?;
                if budget.is_zero() {
                    return Err(HarnessError::config("time_per_move must be positive"));
                }
                Some(budget)
            }
            None => None,
        };

        let position = raw.position.into_text();
        let position = position.trim_matches('\n').to_string();
        if position.trim().is_empty() {
            return Err(HarnessError::config("position is empty"));
        }

        Ok(Self {
            id,
            name: raw.name.trim().to_string(),
            description: raw.description,
            source: None,
            position,
            time_per_move,
            policy,
        })
    }

    /// Load a definition file; its identifier comes from the file name.
    pub fn load(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| HarnessError::config(format!("bad test file name {}", path.display())))?;
        let id = test_id_from_name(stem)?;
        let text = fs::read_to_string(path).map_err(|err| {
            HarnessError::config(format!("could not read {}: {err}", path.display()))
        })?;
        let mut case = Self::from_json_str(id, &text).map_err(|err| match err {
            HarnessError::Config(message) => {
                HarnessError::config(format!("{}: {message}", path.display()))
            }
            other => other,
        })?;
        case.source = Some(path.to_path_buf());
        Ok(case)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// File the case was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Starting position, as written in the definition.
    pub fn position(&self) -> &str {
        &self.position
    }

    pub fn time_per_move(&self) -> Option<Duration> {
        self.time_per_move
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "test {} ({})", self.id, self.name)
    }
}

/// Identifier of a test definition named `name`.
///
/// The identifier is the leading run of ASCII digits of the name, read as a
/// decimal number: `012_goal_threat` is 12. Names without leading digits, or
/// with more than fits in a `u32`, are rejected.
pub fn test_id_from_name(name: &str) -> HarnessResult<u32> {
    let digits_end = name
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(name.len());
    let digits = &name[..digits_end];
    if digits.is_empty() {
        return Err(HarnessError::config(format!(
            "test name `{name}` does not start with a number"
        )));
    }
    digits.parse().map_err(|_| {
        HarnessError::config(format!("test number in `{name}` is out of range"))
    })
}

/// Load every definition in `dir`, ordered by file name.
///
/// Identifiers must be unique across the directory.
pub fn discover(dir: impl AsRef<Path>) -> HarnessResult<Vec<TestCase>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|err| {
        HarnessError::config(format!("could not list {}: {err}", dir.display()))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_definition = path
            .extension()
            .is_some_and(|ext| ext == DEFINITION_EXTENSION);
        if is_definition && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut seen: BTreeMap<u32, PathBuf> = BTreeMap::new();
    let mut cases = Vec::with_capacity(paths.len());
    for path in paths {
        let case = TestCase::load(&path)?;
        if let Some(previous) = seen.insert(case.id(), path.clone()) {
            return Err(HarnessError::config(format!(
                "{} and {} share test number {}",
                previous.display(),
                path.display(),
                case.id()
            )));
        }
        debug!("discovered {case} in {}", path.display());
        cases.push(case);
    }
    Ok(cases)
}
