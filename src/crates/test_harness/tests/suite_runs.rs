#![cfg(feature = "test-support")]

#[path = "harness_support.rs"]
mod support;

use std::time::{Duration, Instant};

use aei_test_harness::testing::StubBoard;
use aei_test_harness::{
    discover, HarnessConfig, HarnessError, SuiteRunner, TestFilter, TestSuite,
};
use support::{definition, fake_engine, fake_engine_path, init_logging, write_tests, RABBIT_AT_A7};

fn goal_suite(cycles: u32) -> (tempfile::TempDir, TestSuite) {
    let dir = write_tests(&[(
        "01_rabbit_home.json",
        definition("rabbit home", "score goal", RABBIT_AT_A7, ""),
    )]);
    let cases = discover(dir.path()).expect("definitions should load");
    let suite = TestSuite::new(cases, cycles, TestFilter::All).expect("suite");
    (dir, suite)
}

#[test]
fn losing_move_scores_zero_over_three_cycles() {
    init_logging();
    let (_dir, suite) = goal_suite(3);
    let board = StubBoard;
    let runner = SuiteRunner::new(
        &board,
        fake_engine(&["--move", "Ra7e"]),
        Duration::from_millis(100),
    );

    let report = runner.run(&suite).into_result().expect("suite should finish");
    assert_eq!(report.to_string(), "rabbit home scored 0 of 3\nscored 0 of 3");
}

#[test]
fn winning_move_scores_every_cycle() {
    init_logging();
    let (_dir, suite) = goal_suite(2);
    let board = StubBoard;
    let runner = SuiteRunner::new(
        &board,
        fake_engine(&["--move", "Ra7n"]),
        Duration::from_millis(100),
    );

    let report = runner.run(&suite).into_result().expect("suite should finish");
    assert_eq!(report.score, 2.0);
    assert_eq!(report.trials, 2);
}

#[test]
fn illegal_engine_move_counts_as_a_failed_trial() {
    init_logging();
    let (_dir, suite) = goal_suite(2);
    let board = StubBoard;
    let runner = SuiteRunner::new(
        &board,
        fake_engine(&["--move", "Eh1n", "--move", "Ra7n"]),
        Duration::from_millis(100),
    );

    let outcome = runner.run(&suite);
    assert!(outcome.is_complete(), "{:?}", outcome.error);
    assert_eq!(outcome.report.to_string(), "rabbit home scored 1 of 2\nscored 1 of 2");
}

#[test]
fn configured_filter_and_workers_keep_discovery_order() {
    init_logging();
    let files: Vec<(String, String)> = (1..=6)
        .map(|id| {
            (
                format!("{id:02}_case.json"),
                definition(&format!("case {id}"), "score goal", RABBIT_AT_A7, ""),
            )
        })
        .collect();
    let files: Vec<(&str, String)> = files
        .iter()
        .map(|(name, contents)| (name.as_str(), contents.clone()))
        .collect();
    let dir = write_tests(&files);

    let config = HarnessConfig::from_json_str(&format!(
        r#"{{"engine_command": [{:?}, "--move", "Ra7n"], "test_filter": "5 2-3",
            "time_per_test": 0.1, "grace_seconds": 0.3, "workers": 2, "tests_dir": {:?}}}"#,
        fake_engine_path().display().to_string(),
        dir.path().display().to_string(),
    ))
    .expect("config should parse");
    let suite = TestSuite::from_config(&config).expect("suite should load");
    let board = StubBoard;
    let runner = SuiteRunner::from_config(&board, &config).expect("runner");
    assert_eq!(runner.workers(), 2);

    let report = runner
        .run_with_workers(&suite)
        .into_result()
        .expect("suite should finish");
    let names: Vec<&str> = report.tests.iter().map(|test| test.name.as_str()).collect();
    assert_eq!(names, vec!["case 2", "case 3", "case 5"]);
    assert_eq!(report.to_string().lines().last(), Some("scored 3 of 3"));
}

#[test]
fn every_policy_is_scored_through_the_engine() {
    init_logging();
    let dir = write_tests(&[
        (
            "1_score.json",
            definition("score", "score goal", "g Rc7 rh5", ""),
        ),
        (
            // Silver threatens c2-c1 and gold blocks c1 with the elephant.
            "2_prevent.json",
            definition("prevent", "prevent goal", "g Ed2 rc2", ""),
        ),
        (
            "3_layout.json",
            definition(
                "layout",
                "piece_position",
                "g Ed2 rc2",
                r#""after_piece_position": "Ed3 : 0.25 | Ec1 : 0.5""#,
            ),
        ),
    ]);
    let cases = discover(dir.path()).unwrap();
    let suite = TestSuite::new(cases, 1, TestFilter::All).unwrap();
    let board = StubBoard;
    let runner = SuiteRunner::new(
        &board,
        fake_engine(&["--move", "Rc7n", "--move", "Ed2s Ed1w", "--move", "Ed2s Ed1w"]),
        Duration::from_millis(100),
    );

    let report = runner.run(&suite).into_result().expect("suite should finish");
    assert_eq!(
        report.to_string(),
        "score scored 1 of 1\nprevent scored 1 of 1\nlayout scored 0.5 of 1\nscored 2.5 of 3"
    );
}

#[test]
fn timeouts_score_zero_without_hanging() {
    init_logging();
    let (_dir, suite) = goal_suite(2);
    let board = StubBoard;
    let runner = SuiteRunner::new(
        &board,
        fake_engine(&["--hang"]).with_grace(Duration::from_millis(200)),
        Duration::from_millis(100),
    );

    let started = Instant::now();
    let outcome = runner.run(&suite);
    assert!(outcome.is_complete(), "{:?}", outcome.error);
    assert_eq!(outcome.report.to_string(), "rabbit home scored 0 of 2\nscored 0 of 2");
    // Two trials of 0.3s plus process turnover, well under this bound.
    assert!(started.elapsed() < Duration::from_secs(8));
}

#[test]
fn fresh_engine_replaces_a_timed_out_one() {
    init_logging();
    let marker_dir = tempfile::tempdir().unwrap();
    let marker = marker_dir.path().join("hung");
    let (_dir, suite) = goal_suite(2);
    let board = StubBoard;
    let runner = SuiteRunner::new(
        &board,
        fake_engine(&["--move", "Ra7n", "--hang-once", marker.to_str().unwrap()]),
        Duration::from_millis(100),
    );

    let report = runner.run(&suite).into_result().expect("suite should finish");
    assert!(marker.exists());
    assert_eq!(report.to_string(), "rabbit home scored 1 of 2\nscored 1 of 2");
}

#[test]
fn error_reply_does_not_spill_into_the_next_test() {
    init_logging();
    let marker_dir = tempfile::tempdir().unwrap();
    let marker = marker_dir.path().join("errored");
    let dir = write_tests(&[
        ("1_a.json", definition("a", "score goal", RABBIT_AT_A7, "")),
        ("2_b.json", definition("b", "score goal", RABBIT_AT_A7, "")),
    ]);
    let suite = TestSuite::new(discover(dir.path()).unwrap(), 1, TestFilter::All).unwrap();
    let board = StubBoard;
    // The first search prints `error hiccup` and then still answers `bestmove`.
    let runner = SuiteRunner::new(
        &board,
        fake_engine(&["--move", "Ra7n", "--error-once", marker.to_str().unwrap()]),
        Duration::from_millis(100),
    );

    let outcome = runner.run(&suite);
    assert!(outcome.is_complete(), "{:?}", outcome.error);
    assert!(marker.exists());
    assert_eq!(
        outcome.report.to_string(),
        "a scored 0 of 1\nb scored 1 of 1\nscored 1 of 2"
    );
}

#[test]
fn protocol_errors_only_fail_the_trial() {
    init_logging();
    let (_dir, suite) = goal_suite(2);
    let board = StubBoard;
    let runner = SuiteRunner::new(&board, fake_engine(&["--garbage"]), Duration::from_millis(100));

    let outcome = runner.run(&suite);
    assert!(outcome.is_complete());
    assert_eq!(outcome.report.score, 0.0);
    assert_eq!(outcome.report.trials, 2);
}

#[test]
fn engine_crash_stops_the_run_and_keeps_partial_results() {
    init_logging();
    let (_dir, suite) = goal_suite(3);
    let board = StubBoard;
    let runner = SuiteRunner::new(
        &board,
        fake_engine(&["--crash-on-go"]),
        Duration::from_millis(100),
    );

    let outcome = runner.run(&suite);
    assert!(matches!(
        outcome.error,
        Some(HarnessError::EngineExited(_)) | Some(HarnessError::ConnectionClosed)
    ));
    assert_eq!(outcome.report.trials, 0);
}

#[test]
fn abort_interrupts_a_search_in_flight() {
    init_logging();
    let (_dir, suite) = goal_suite(5);
    let board = StubBoard;
    let runner = SuiteRunner::new(
        &board,
        fake_engine(&["--hang"]).with_grace(Duration::from_secs(60)),
        Duration::from_secs(60),
    );
    let abort = runner.abort_handle();

    let started = Instant::now();
    let outcome = std::thread::scope(|scope| {
        scope.spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            abort.abort();
        });
        runner.run(&suite)
    });

    assert!(matches!(outcome.error, Some(HarnessError::Aborted)));
    assert_eq!(outcome.report.trials, 0);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn workers_share_the_suite_and_keep_its_order() {
    init_logging();
    let dir = write_tests(&[
        ("1_a.json", definition("a", "score goal", RABBIT_AT_A7, "")),
        ("2_b.json", definition("b", "score goal", RABBIT_AT_A7, "")),
        ("3_c.json", definition("c", "score goal", RABBIT_AT_A7, "")),
    ]);
    let suite = TestSuite::new(discover(dir.path()).unwrap(), 2, TestFilter::All).unwrap();
    let board = StubBoard;
    let runner = SuiteRunner::new(
        &board,
        fake_engine(&["--move", "Ra7n"]),
        Duration::from_millis(100),
    );

    let report = runner
        .run_parallel(&suite, 2)
        .into_result()
        .expect("suite should finish");
    assert_eq!(
        report.to_string(),
        "a scored 2 of 2\nb scored 2 of 2\nc scored 2 of 2\nscored 6 of 6"
    );
}
