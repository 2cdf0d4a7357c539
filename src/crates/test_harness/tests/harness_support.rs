#![cfg(feature = "test-support")]
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aei_test_harness::EngineConfig;
use tempfile::TempDir;

pub fn fake_engine_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_fake_engine") {
        return PathBuf::from(path);
    }

    // Fallback to the workspace target directory.
    let mut path = std::env::current_exe().expect("current exe");
    path.pop(); // deps
    path.pop(); // debug or release
    path.push("fake_engine");
    if cfg!(windows) {
        path.set_extension("exe");
    }
    path
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fake engine config with short grace and shutdown windows.
pub fn fake_engine(args: &[&str]) -> EngineConfig {
    args.iter()
        .fold(EngineConfig::new(fake_engine_path()), |config, arg| {
            config.with_arg(*arg)
        })
        .with_grace(Duration::from_millis(300))
        .with_startup_timeout(Duration::from_secs(5))
        .with_shutdown_timeout(Duration::from_millis(500))
}

/// Gold rabbit one step from goal; `Ra7n` wins, `Ra7e` does not.
pub const RABBIT_AT_A7: &str = "g Ra7 rh5";

pub fn definition(name: &str, condition: &str, position: &str, extra: &str) -> String {
    let lines: Vec<String> = position
        .split_whitespace()
        .map(|token| format!("{token:?}"))
        .collect();
    let extra = if extra.is_empty() {
        String::new()
    } else {
        format!(",\n  {extra}")
    };
    let position = lines.join(", ");
    format!(
        r#"{{
  "name": {name:?},
  "condition": {condition:?},
  "position": [{position}]{extra}
}}
"#
    )
}

/// Write `(file name, contents)` pairs into a fresh directory.
pub fn write_tests(files: &[(&str, String)]) -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    for (name, contents) in files {
        fs::write(dir.path().join(name), contents).expect("write test definition");
    }
    dir
}

pub fn read_transcript(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
