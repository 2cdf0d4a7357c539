use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::debug;

/// How the stub answers `go`.
#[derive(Debug, Default)]
struct Script {
    /// Moves played in turn, one per search.
    moves: Vec<String>,
    /// `info` lines written before each answer.
    info_lines: usize,
    /// Never answer `go`.
    hang: bool,
    /// Hang on the first search ever; the marker file remembers it happened.
    hang_once: Option<PathBuf>,
    /// Answer `go` with a line that is not part of the protocol.
    garbage: bool,
    /// Exit as soon as a search starts.
    crash_on_go: bool,
    /// Write an `error` line before every answer.
    error_on_go: bool,
    /// Like `error_on_go`, but only for the first search ever.
    error_once: Option<PathBuf>,
    /// Keep running after `quit` and after stdin closes.
    ignore_quit: bool,
    /// Reply `error` to `setoption` for this option name.
    reject_option: Option<String>,
    /// Delay before answering.
    think: Duration,
    /// Append every received command to this file.
    transcript: Option<PathBuf>,
}

fn parse_args() -> Result<Script, String> {
    let mut script = Script::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().ok_or_else(|| format!("{name} needs a value"));
        match arg.as_str() {
            "--move" => script.moves.push(value("--move")?),
            "--info" => {
                script.info_lines = value("--info")?
                    .parse()
                    .map_err(|err| format!("--info: {err}"))?
            }
            "--think-ms" => {
                let millis: u64 = value("--think-ms")?
                    .parse()
                    .map_err(|err| format!("--think-ms: {err}"))?;
                script.think = Duration::from_millis(millis);
            }
            "--hang" => script.hang = true,
            "--hang-once" => script.hang_once = Some(PathBuf::from(value("--hang-once")?)),
            "--garbage" => script.garbage = true,
            "--crash-on-go" => script.crash_on_go = true,
            "--error-on-go" => script.error_on_go = true,
            "--error-once" => script.error_once = Some(PathBuf::from(value("--error-once")?)),
            "--ignore-quit" => script.ignore_quit = true,
            "--reject-option" => script.reject_option = Some(value("--reject-option")?),
            "--transcript" => script.transcript = Some(PathBuf::from(value("--transcript")?)),
            other => return Err(format!("unknown argument {other}")),
        }
    }
    if script.moves.is_empty() {
        script.moves.push("Ra2n".to_string());
    }
    Ok(script)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let script = parse_args()?;
    let mut transcript: Option<File> = match &script.transcript {
        Some(path) => Some(OpenOptions::new().create(true).append(true).open(path)?),
        None => None,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut searches = 0usize;

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        debug!("fake engine got {line:?}");
        if let Some(file) = transcript.as_mut() {
            writeln!(file, "{line}")?;
        }

        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "aei" => {
                writeln!(stdout, "protocol-version 1")?;
                writeln!(stdout, "id name fake_engine")?;
                writeln!(stdout, "id author aei_test_harness")?;
                writeln!(stdout, "aeiok")?;
            }
            "isready" => writeln!(stdout, "readyok")?,
            "newgame" | "setposition" | "stop" => {}
            "setoption" => {
                let name = rest.split_whitespace().next().unwrap_or_default();
                if script.reject_option.as_deref() == Some(name) {
                    writeln!(stdout, "error unknown option {name}")?;
                }
            }
            "go" => {
                searches += 1;
                if script.crash_on_go {
                    std::process::exit(3);
                }
                if script.hang || first_time(script.hang_once.as_deref())? {
                    stdout.flush()?;
                    continue;
                }
                writeln!(stdout, "log search {searches} started")?;
                if script.error_on_go || first_time(script.error_once.as_deref())? {
                    writeln!(stdout, "error hiccup")?;
                    stdout.flush()?;
                }
                for depth in 1..=script.info_lines {
                    writeln!(stdout, "info depth {depth}")?;
                }
                if !script.think.is_zero() {
                    stdout.flush()?;
                    thread::sleep(script.think);
                }
                if script.garbage {
                    writeln!(stdout, "checkmate in 3")?;
                } else {
                    let mv = &script.moves[(searches - 1) % script.moves.len()];
                    writeln!(stdout, "bestmove {mv}")?;
                }
            }
            "quit" if script.ignore_quit => {}
            "quit" => {
                stdout.flush()?;
                return Ok(());
            }
            other => writeln!(stdout, "error unknown command {other}")?,
        }
        stdout.flush()?;
    }
    if script.ignore_quit {
        // Outlive stdin as well, so only a kill stops us.
        loop {
            thread::sleep(Duration::from_secs(60));
        }
    }
    Ok(())
}

/// True only the first time `marker` is seen across every engine process.
fn first_time(marker: Option<&Path>) -> io::Result<bool> {
    let Some(marker) = marker else {
        return Ok(false);
    };
    if marker.exists() {
        return Ok(false);
    }
    File::create(marker)?;
    Ok(true)
}
