use std::collections::BTreeMap;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::process::{AbortHandle, EngineProcess};
use crate::response::Response;

/// Option name carrying the per-move time budget, in seconds.
pub const TIME_PER_MOVE_OPTION: &str = "tcmove";

/// Where a session is in its newgame / setposition / go cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configured,
    PositionSet,
    Searching,
    /// A timeout or protocol violation left the output stream in an unknown
    /// place; the session accepts no further commands.
    Poisoned,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Configured => "configured",
            SessionState::PositionSet => "holding a position",
            SessionState::Searching => "searching",
            SessionState::Poisoned => "poisoned",
        }
    }
}

/// Protocol driver for one engine process.
///
/// Tests are served strictly one after another: the engine's state depends on
/// the last position it was given, so a session is never shared.
pub struct EngineSession {
    process: EngineProcess,
    state: SessionState,
    options: BTreeMap<String, String>,
    engine_id: BTreeMap<String, String>,
    protocol_version: Option<String>,
    search_time: Duration,
    startup_timeout: Duration,
    grace: Duration,
}

impl EngineSession {
    /// Spawn the engine and, if configured, complete the `aei` handshake.
    pub fn start(config: &EngineConfig, abort: AbortHandle) -> HarnessResult<Self> {
        let process = EngineProcess::spawn(config, abort)?;
        let mut session = Self {
            process,
            state: SessionState::Idle,
            options: BTreeMap::new(),
            engine_id: BTreeMap::new(),
            protocol_version: None,
            search_time: Duration::from_secs(1),
            startup_timeout: config.startup_timeout,
            grace: config.grace,
        };
        if config.handshake {
            session.handshake()?;
        }
        Ok(session)
    }

    fn handshake(&mut self) -> HarnessResult<()> {
        self.process.send("aei")?;
        loop {
            match self.receive_sync()? {
                Response::AeiOk => break,
                Response::ProtocolVersion(version) => self.protocol_version = Some(version),
                Response::Id { key, value } => {
                    self.engine_id.insert(key, value);
                }
                Response::Error(message) => {
                    return Err(HarnessError::engine_start(format!(
                        "engine refused handshake: {message}"
                    )))
                }
                other => {
                    return Err(self.poison(HarnessError::protocol(format!(
                        "unexpected `{other}` during handshake"
                    ))))
                }
            }
        }
        debug!(
            "handshake complete: protocol {:?}, id {:?}",
            self.protocol_version, self.engine_id
        );
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Values accepted through [`EngineSession::set_option`].
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    /// `id` pairs announced during the handshake (name, author, version).
    pub fn engine_id(&self) -> &BTreeMap<String, String> {
        &self.engine_id
    }

    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Search time budget used to bound [`EngineSession::go`].
    pub fn search_time(&self) -> Duration {
        self.search_time
    }

    pub fn process_id(&self) -> u32 {
        self.process.id()
    }

    fn expect_state(
        &self,
        command: &'static str,
        allowed: &[SessionState],
    ) -> HarnessResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(HarnessError::InvalidState {
                command,
                state: self.state.name(),
            })
        }
    }

    fn poison(&mut self, err: HarnessError) -> HarnessError {
        if err.poisons_session() {
            self.state = SessionState::Poisoned;
        }
        err
    }

    /// Receive a reply to a synchronous command, skipping chatter.
    fn receive_sync(&mut self) -> HarnessResult<Response> {
        loop {
            let response = match self.process.receive(self.startup_timeout) {
                Ok(response) => response,
                Err(err) => return Err(self.poison(err)),
            };
            match response {
                Response::Info(text) => debug!("engine info: {text}"),
                Response::Log(text) => debug!("engine log: {text}"),
                other => return Ok(other),
            }
        }
    }

    /// Reset the engine's game state.
    pub fn new_game(&mut self) -> HarnessResult<()> {
        self.expect_state(
            "newgame",
            &[
                SessionState::Idle,
                SessionState::Configured,
                SessionState::PositionSet,
            ],
        )?;
        self.process.send("newgame")?;
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Set a named engine option and wait for the engine to acknowledge it.
    ///
    /// The option is followed by `isready`; an `error` reply arriving before
    /// `readyok` is returned as [`HarnessError::EngineRejected`].
    pub fn set_option(&mut self, name: &str, value: &str) -> HarnessResult<()> {
        self.expect_state(
            "setoption",
            &[
                SessionState::Idle,
                SessionState::Configured,
                SessionState::PositionSet,
            ],
        )?;
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(HarnessError::config(format!("invalid option name {name:?}")));
        }
        self.process.send(&format!("setoption {name} {value}"))?;
        self.process.send("isready")?;

        let mut rejection = None;
        loop {
            match self.receive_sync()? {
                Response::ReadyOk => break,
                Response::Error(message) => {
                    rejection.get_or_insert(message);
                }
                other => {
                    return Err(self.poison(HarnessError::protocol(format!(
                        "unexpected `{other}` while waiting for readyok"
                    ))))
                }
            }
        }

        if let Some(message) = rejection {
            return Err(HarnessError::EngineRejected(format!(
                "setoption {name} {value}: {message}"
            )));
        }
        self.options.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Set the per-move time budget (`tcmove`).
    pub fn set_time_per_move(&mut self, budget: Duration) -> HarnessResult<()> {
        self.set_option(TIME_PER_MOVE_OPTION, &budget.as_secs_f64().to_string())?;
        self.search_time = budget;
        Ok(())
    }

    /// Hand the engine a serialized position.
    pub fn set_position(&mut self, position_text: &str) -> HarnessResult<()> {
        self.expect_state(
            "setposition",
            &[SessionState::Configured, SessionState::PositionSet],
        )?;
        if position_text.contains('\n') {
            return Err(HarnessError::config(
                "position text must fit on a single protocol line",
            ));
        }
        self.process.send(&format!("setposition {position_text}"))?;
        self.state = SessionState::PositionSet;
        Ok(())
    }

    /// Start a search and return the stream of its responses.
    ///
    /// The stream ends after `bestmove`, an `error` reply, or a failure. The
    /// whole search is bounded by the time budget plus the grace margin.
    pub fn go(&mut self) -> HarnessResult<SearchStream<'_>> {
        self.expect_state("go", &[SessionState::PositionSet])?;
        self.process.send("go")?;
        self.state = SessionState::Searching;
        let budget = self.search_time.saturating_add(self.grace);
        Ok(SearchStream {
            started: Instant::now(),
            budget,
            session: self,
            finished: false,
        })
    }

    /// Send `quit` and reap the engine.
    pub fn quit(self) -> HarnessResult<ExitStatus> {
        self.process.shutdown()
    }
}

/// Pull-based view over the responses to one `go`.
///
/// Responses are yielded in the order the engine wrote them. Dropping the
/// stream before it finishes leaves the engine mid-search, so the session is
/// poisoned. An `error` reply ends the stream and poisons the session too.
pub struct SearchStream<'a> {
    session: &'a mut EngineSession,
    started: Instant,
    budget: Duration,
    finished: bool,
}

impl SearchStream<'_> {
    /// Drain the stream and return the chosen move.
    ///
    /// `info` and `log` lines are passed to the debug log on the way.
    pub fn best_move(mut self) -> HarnessResult<String> {
        for response in self.by_ref() {
            match response? {
                Response::BestMove(mv) => return Ok(mv),
                Response::Error(message) => return Err(HarnessError::EngineRejected(message)),
                Response::Info(text) => debug!("engine info: {text}"),
                Response::Log(text) => debug!("engine log: {text}"),
                other => debug!("ignoring `{other}` during search"),
            }
        }
        Err(HarnessError::protocol("search ended without bestmove"))
    }

    fn fail(&mut self, err: HarnessError) -> HarnessError {
        self.finished = true;
        self.session.state = SessionState::Poisoned;
        err
    }
}

impl Iterator for SearchStream<'_> {
    type Item = HarnessResult<Response>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let remaining = self.budget.saturating_sub(self.started.elapsed());
        let response = match self.session.process.receive(remaining) {
            Ok(response) => response,
            Err(HarnessError::Timeout(_)) => {
                return Some(Err(self.fail(HarnessError::Timeout(self.budget))))
            }
            Err(err) => return Some(Err(self.fail(err))),
        };

        match response {
            Response::Info(_) | Response::Log(_) => {}
            Response::BestMove(_) => {
                self.finished = true;
                self.session.state = SessionState::Idle;
            }
            Response::Error(ref message) => {
                // The engine may still be searching and answer later, so its
                // output can no longer be matched to commands.
                warn!("engine reported an error during search: {message}");
                self.finished = true;
                self.session.state = SessionState::Poisoned;
            }
            other => {
                return Some(Err(self.fail(HarnessError::protocol(format!(
                    "unexpected `{other}` during search"
                )))))
            }
        }
        Some(Ok(response))
    }
}

impl Drop for SearchStream<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.session.state = SessionState::Poisoned;
        }
    }
}
