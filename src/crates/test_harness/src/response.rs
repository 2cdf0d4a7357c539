use std::fmt;

use crate::error::{HarnessError, HarnessResult};

/// One classified line of engine output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Search progress (`info <text>`).
    Info(String),
    /// Free-form engine chatter (`log <text>`).
    Log(String),
    /// Final answer of a search (`bestmove <move>`).
    BestMove(String),
    /// Engine-side error report (`error <text>`).
    Error(String),
    /// Handshake: `protocol-version <version>`.
    ProtocolVersion(String),
    /// Handshake: `id <key> <value>`.
    Id { key: String, value: String },
    /// Handshake completed.
    AeiOk,
    /// Reply to `isready`.
    ReadyOk,
}

impl Response {
    pub fn keyword(&self) -> &'static str {
        match self {
            Response::Info(_) => "info",
            Response::Log(_) => "log",
            Response::BestMove(_) => "bestmove",
            Response::Error(_) => "error",
            Response::ProtocolVersion(_) => "protocol-version",
            Response::Id { .. } => "id",
            Response::AeiOk => "aeiok",
            Response::ReadyOk => "readyok",
        }
    }

    /// Whether this response ends a search.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Response::BestMove(_) | Response::Error(_))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Info(text)
            | Response::Log(text)
            | Response::BestMove(text)
            | Response::Error(text)
            | Response::ProtocolVersion(text) => write!(f, "{} {text}", self.keyword()),
            Response::Id { key, value } => write!(f, "id {key} {value}"),
            Response::AeiOk | Response::ReadyOk => f.write_str(self.keyword()),
        }
    }
}

/// Classify a raw output line.
///
/// The first whitespace-delimited token selects the response kind and the rest
/// of the line (leading whitespace removed) becomes its payload. Unknown
/// keywords and malformed payloads are protocol violations.
pub fn classify(line: &str) -> HarnessResult<Response> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim_start()),
        None => (line, ""),
    };

    let response = match keyword {
        "info" => Response::Info(rest.to_string()),
        "log" => Response::Log(rest.to_string()),
        "error" => Response::Error(rest.to_string()),
        "bestmove" => {
            let mv = rest.trim();
            if mv.is_empty() {
                return Err(HarnessError::protocol("bestmove without a move"));
            }
            Response::BestMove(mv.to_string())
        }
        "protocol-version" => Response::ProtocolVersion(rest.trim().to_string()),
        "id" => {
            let (key, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if key.is_empty() {
                return Err(HarnessError::protocol("id line without a key"));
            }
            Response::Id {
                key: key.to_string(),
                value: value.trim().to_string(),
            }
        }
        "aeiok" if rest.is_empty() => Response::AeiOk,
        "readyok" if rest.is_empty() => Response::ReadyOk,
        _ => {
            return Err(HarnessError::protocol(format!(
                "unexpected engine output: {line:?}"
            )))
        }
    };

    Ok(response)
}
