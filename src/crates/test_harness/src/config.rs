use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HarnessError, HarnessResult};
use crate::filter::TestFilter;

/// Process-level configuration for launching the engine binary.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the engine binary to spawn.
    pub binary_path: PathBuf,
    /// Additional CLI arguments passed through to the engine.
    pub extra_args: Vec<String>,
    /// Extra environment variables applied to the child process.
    pub env: BTreeMap<String, String>,
    /// Optional working directory override for the child process.
    pub working_directory: Option<PathBuf>,
    /// Perform the `aei` / `aeiok` handshake right after spawning.
    pub handshake: bool,
    /// Upper bound on how long to wait for the handshake and `isready` syncs.
    pub startup_timeout: Duration,
    /// Slack added on top of the search time budget before a search times out.
    pub grace: Duration,
    /// How long to wait for the engine to exit after `quit` before killing it.
    pub shutdown_timeout: Duration,
}

impl EngineConfig {
    /// Create a new config targeting a specific engine binary.
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            extra_args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
            handshake: true,
            startup_timeout: Duration::from_secs(5),
            grace: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    /// Build a config from a command line: the first element is the binary.
    pub fn from_command(command: &[String]) -> HarnessResult<Self> {
        let (binary, args) = command
            .split_first()
            .ok_or_else(|| HarnessError::config("engine command is empty"))?;
        Ok(args
            .iter()
            .fold(Self::new(binary), |config, arg| config.with_arg(arg.clone())))
    }

    /// Add a passthrough CLI argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Add an environment variable override.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Override the working directory for the spawned process.
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Enable or skip the AEI handshake.
    pub fn with_handshake(mut self, handshake: bool) -> Self {
        self.handshake = handshake;
        self
    }

    /// Override the timeout used for the handshake and `isready` syncs.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Override the slack granted past the search time budget.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Override how long shutdown waits before killing the engine.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Engine command as written in a config file: a single string split on
/// whitespace, or an explicit argument list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Line(String),
    Args(Vec<String>),
}

impl CommandLine {
    pub fn to_args(&self) -> Vec<String> {
        match self {
            CommandLine::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            CommandLine::Args(args) => args.clone(),
        }
    }
}

fn default_cycles() -> u32 {
    1
}

fn default_time_per_test() -> f64 {
    2.0
}

fn default_filter() -> String {
    "all".to_string()
}

fn default_grace_seconds() -> f64 {
    10.0
}

fn default_handshake() -> bool {
    true
}

fn default_workers() -> usize {
    1
}

fn default_tests_dir() -> PathBuf {
    PathBuf::from("tests")
}

/// Run configuration for a whole suite.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Engine binary plus arguments.
    pub engine_command: CommandLine,
    /// Trials per test case.
    #[serde(default = "default_cycles")]
    pub cycles: u32,
    /// Search time budget in seconds, unless a test overrides it.
    #[serde(default = "default_time_per_test")]
    pub time_per_test: f64,
    /// `all` or a list of identifier ranges such as `2-3 5`.
    #[serde(default = "default_filter")]
    pub test_filter: String,
    #[serde(default = "default_grace_seconds")]
    pub grace_seconds: f64,
    #[serde(default = "default_handshake")]
    pub handshake: bool,
    /// Number of engine processes to run side by side.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Directory holding the test definitions.
    #[serde(default = "default_tests_dir")]
    pub tests_dir: PathBuf,
}

impl HarnessConfig {
    /// Minimal config for a given engine command, using defaults elsewhere.
    pub fn new(engine_command: CommandLine) -> Self {
        Self {
            engine_command,
            cycles: default_cycles(),
            time_per_test: default_time_per_test(),
            test_filter: default_filter(),
            grace_seconds: default_grace_seconds(),
            handshake: default_handshake(),
            workers: default_workers(),
            tests_dir: default_tests_dir(),
        }
    }

    pub fn from_json_str(text: &str) -> HarnessResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|err| HarnessError::config(format!("invalid config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; a relative `tests_dir` is resolved against the
    /// file's directory.
    pub fn load(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            HarnessError::config(format!("could not open {}: {err}", path.display()))
        })?;
        let mut config = Self::from_json_str(&text)?;
        if config.tests_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.tests_dir = parent.join(&config.tests_dir);
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.engine_command.to_args().is_empty() {
            return Err(HarnessError::config("engine_command is empty"));
        }
        if self.cycles == 0 {
            return Err(HarnessError::config("cycles must be at least 1"));
        }
        self.time_per_test()?;
        seconds("grace_seconds", self.grace_seconds)?;
        if self.workers == 0 {
            return Err(HarnessError::config("workers must be at least 1"));
        }
        self.filter()?;
        Ok(())
    }

    pub fn filter(&self) -> HarnessResult<TestFilter> {
        self.test_filter.parse()
    }

    pub fn time_per_test(&self) -> HarnessResult<Duration> {
        let budget = seconds("time_per_test", self.time_per_test)?;
        if budget.is_zero() {
            return Err(HarnessError::config("time_per_test must be positive"));
        }
        Ok(budget)
    }

    /// Process launch settings derived from this run configuration.
    pub fn engine_config(&self) -> HarnessResult<EngineConfig> {
        Ok(EngineConfig::from_command(&self.engine_command.to_args())?
            .with_handshake(self.handshake)
            .with_grace(seconds("grace_seconds", self.grace_seconds)?))
    }
}

/// Convert a non-negative number of seconds, rejecting values a `Duration`
/// cannot hold.
pub(crate) fn seconds(field: &str, value: f64) -> HarnessResult<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        HarnessError::config(format!(
            "{field} must be a non-negative number of seconds that fits a duration, got {value}"
        ))
    })
}
