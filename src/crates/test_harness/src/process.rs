use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::response::{classify, Response};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cloneable flag used to cancel a running suite from another thread.
///
/// A child handle also reports aborted once its parent is aborted, which lets
/// a run stop its own workers without touching the caller's handle.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that can be aborted on its own or through `self`.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(self.flag.clone()),
        }
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.load(Ordering::SeqCst))
    }
}

/// A running engine subprocess with line-buffered stdin/stdout.
///
/// stdout is read on a background thread and handed over through a channel so
/// that [`EngineProcess::receive`] can wait with a deadline. stderr is drained
/// on its own thread and only logged. Dropping the process sends `quit`,
/// waits briefly, then kills and reaps the child.
pub struct EngineProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: mpsc::Receiver<String>,
    readers: Vec<thread::JoinHandle<()>>,
    shutdown_timeout: Duration,
    abort: AbortHandle,
    reaped: bool,
}

impl EngineProcess {
    /// Spawn the engine binary with piped stdio.
    pub fn spawn(config: &EngineConfig, abort: AbortHandle) -> HarnessResult<Self> {
        let mut cmd = Command::new(&config.binary_path);
        cmd.args(&config.extra_args);
        if let Some(dir) = &config.working_directory {
            cmd.current_dir(dir);
        }
        cmd.envs(&config.env);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|err| {
            HarnessError::engine_start(format!("{}: {err}", config.binary_path.display()))
        })?;
        debug!(
            "spawned engine {} (pid {})",
            config.binary_path.display(),
            child.id()
        );

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::engine_start("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::engine_start("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HarnessError::engine_start("failed to capture stderr"))?;

        let (line_tx, line_rx) = mpsc::channel();
        let readers = vec![spawn_line_reader(stdout, line_tx), spawn_stderr_logger(stderr)];

        Ok(Self {
            child,
            stdin: Some(stdin),
            lines: line_rx,
            readers,
            shutdown_timeout: config.shutdown_timeout,
            abort,
            reaped: false,
        })
    }

    /// Write one command line to the engine.
    pub fn send(&mut self, line: &str) -> HarnessResult<()> {
        let stdin = self.stdin.as_mut().ok_or(HarnessError::ConnectionClosed)?;
        debug!("> {line}");
        let written = writeln!(stdin, "{line}").and_then(|()| stdin.flush());
        if let Err(err) = written {
            if let Some(status) = self.child.try_wait()? {
                return Err(HarnessError::EngineExited(status));
            }
            return Err(HarnessError::Io(err));
        }
        Ok(())
    }

    /// Wait up to `timeout` for the next non-empty line and classify it.
    pub fn receive(&mut self, timeout: Duration) -> HarnessResult<Response> {
        let line = self.receive_line(timeout)?;
        classify(&line)
    }

    fn receive_line(&mut self, timeout: Duration) -> HarnessResult<String> {
        let start = Instant::now();
        loop {
            if self.abort.is_aborted() {
                return Err(HarnessError::Aborted);
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(HarnessError::Timeout(timeout));
            }

            match self.lines.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    debug!("< {line}");
                    return Ok(line.to_string());
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if let Some(status) = self.child.try_wait()? {
                        // Lines emitted just before exit may still be queued.
                        if let Ok(line) = self.lines.try_recv() {
                            debug!("< {line}");
                            return Ok(line.trim().to_string());
                        }
                        return Err(HarnessError::EngineExited(status));
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(self.closed_error());
                }
            }
        }
    }

    /// stdout hit EOF; report the exit status if the child is gone.
    fn closed_error(&mut self) -> HarnessError {
        let start = Instant::now();
        while start.elapsed() < self.shutdown_timeout {
            match self.child.try_wait() {
                Ok(Some(status)) => return HarnessError::EngineExited(status),
                Ok(None) => thread::sleep(Duration::from_millis(10)),
                Err(err) => return HarnessError::Io(err),
            }
        }
        HarnessError::ConnectionClosed
    }

    /// Whether the child process is still alive.
    pub fn is_running(&mut self) -> bool {
        !self.reaped && matches!(self.child.try_wait(), Ok(None))
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Send `quit`, wait for the engine to exit and reap it.
    pub fn shutdown(mut self) -> HarnessResult<ExitStatus> {
        self.terminate()
    }

    fn terminate(&mut self) -> HarnessResult<ExitStatus> {
        if let Some(mut stdin) = self.stdin.take() {
            let _ = writeln!(stdin, "quit").and_then(|()| stdin.flush());
            // Dropping stdin closes the pipe so engines blocked on input see EOF.
        }

        let start = Instant::now();
        let mut status = None;
        while start.elapsed() < self.shutdown_timeout {
            match self.child.try_wait() {
                Ok(Some(exited)) => {
                    status = Some(exited);
                    break;
                }
                Ok(None) => thread::sleep(Duration::from_millis(10)),
                Err(err) => {
                    // Fall through to the kill below so the child is still reaped.
                    warn!("could not poll engine (pid {}): {err}", self.child.id());
                    break;
                }
            }
        }

        let status = match status {
            Some(status) => status,
            None => {
                warn!(
                    "engine (pid {}) ignored quit for {:?}; killing it",
                    self.child.id(),
                    self.shutdown_timeout
                );
                // Force terminate if graceful shutdown did not complete.
                let _ = self.child.kill();
                self.child.wait()?
            }
        };
        self.reaped = true;
        self.join_readers();
        debug!("engine exited with {status}");
        Ok(status)
    }

    fn join_readers(&mut self) {
        for handle in self.readers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        if !self.reaped {
            if let Err(err) = self.terminate() {
                warn!("engine teardown failed: {err}");
            }
        }
    }
}

fn spawn_line_reader<R: Read + Send + 'static>(
    reader: R,
    tx: mpsc::Sender<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let buf_reader = BufReader::new(reader);
        for line in buf_reader.lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

fn spawn_stderr_logger<R: Read + Send + 'static>(reader: R) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let buf_reader = BufReader::new(reader);
        for line in buf_reader.lines().map_while(Result::ok) {
            debug!("engine stderr: {}", line.trim_end());
        }
    })
}
