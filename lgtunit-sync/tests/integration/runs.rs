// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino::Utf8Path;
use lgtunit_sync::{
    context::TestContext,
    errors::RunError,
    events::TreeEvent,
    runner::{CancelToken, RunCoordinator, RunRequest, RunSummary, RunTarget},
    tree::{NodeAddress, NodeKind, RunState},
};
use pretty_assertions::assert_eq;
use std::{cell::RefCell, rc::Rc};

fn results_for(suite: &Utf8Path, object: &str, tests: &[(&str, u32, &str)]) -> String {
    tests
        .iter()
        .map(|(test, line, status)| {
            format!("File:{suite}/tests.lgt;Line:{line};Object:{object};Test:{test};Status:{status}\n")
        })
        .collect()
}

async fn run(
    runner: &FakeRunner,
    ws: &TestWorkspace,
    cx: &mut TestContext,
    request: &RunRequest,
) -> RunSummary {
    RunCoordinator::new(runner, &ws.config).run(cx, request).await
}

/// Runs every suite once so the tree has results to lose.
async fn populated(ws: &TestWorkspace) -> (TestContext, FakeRunner) {
    let a = ws.suite("a");
    let b = ws.suite("b");
    let (mut cx, _events) = ws.context();
    cx.add_suite_dir(&a);
    cx.add_suite_dir(&b);

    let runner = FakeRunner::new()
        .with(
            &a,
            FakeBehavior::Results(results_for(&a, "a_tests", &[
                ("ok", 3, "passed"),
                ("bad", 7, "failed (expected 1)"),
            ])),
        )
        .with(
            &b,
            FakeBehavior::Results(results_for(&b, "b_tests", &[("skip", 2, "skipped")])),
        );
    let summary = run(&runner, ws, &mut cx, &RunRequest::default()).await;
    assert!(summary.errors().next().is_none(), "populating runs succeed");
    (cx, runner)
}

#[tokio::test]
async fn run_all_reconciles_every_suite() {
    let ws = TestWorkspace::new();
    let a = ws.suite("a");
    let b = ws.suite("b");
    let (mut cx, _events) = ws.context();
    cx.add_suite_dir(&a);
    cx.add_suite_dir(&b);

    let runner = FakeRunner::new()
        .with(
            &a,
            FakeBehavior::Results(results_for(&a, "a_tests", &[
                ("ok", 3, "passed"),
                ("bad", 7, "failed (expected 1)"),
            ])),
        )
        .with(
            &b,
            FakeBehavior::Results(results_for(&b, "b_tests", &[("skip", 2, "skipped")])),
        );
    let mut reporter = RecordingReporter::default();
    let summary = {
        let mut coordinator =
            RunCoordinator::new(&runner, &ws.config).with_reporter(&mut reporter);
        coordinator.run(&mut cx, &RunRequest::default()).await
    };

    // Suites run concurrently, so dispatch order isn't fixed.
    let mut dispatched: Vec<_> = runner.dispatched().iter().map(ToString::to_string).collect();
    dispatched.sort();
    assert_eq!(dispatched, vec![format!("directory {a}"), format!("directory {b}")]);
    assert_eq!(
        summary
            .outcomes
            .iter()
            .map(|outcome| outcome.target.clone())
            .collect::<Vec<_>>(),
        vec![
            RunTarget::Directory { dir: a.clone() },
            RunTarget::Directory { dir: b.clone() },
        ]
    );
    let stats = summary.stats();
    assert_eq!((stats.passed, stats.failed, stats.skipped), (1, 1, 1));
    assert!(!summary.is_success());

    let bad = cx
        .tree()
        .get(&test_id(&a.join("tests.lgt"), "a_tests", "bad"))
        .expect("bad was reconciled");
    assert_eq!(bad.run_state, RunState::Failed);
    assert_eq!(bad.message.as_deref(), Some("failed (expected 1)"));
    assert_eq!(bad.location.line, 6);

    let file = cx
        .tree()
        .get_address(&NodeAddress::File {
            file: b.join("tests.lgt"),
        })
        .expect("b's file was reconciled");
    assert_eq!(file.run_state, RunState::Skipped);
    let parent = file.parent().and_then(|id| cx.tree().get(id));
    assert_eq!(parent.map(|node| node.kind()), Some(NodeKind::Directory));

    assert_eq!(reporter.cleared.len(), 2);
    reporter.reported.sort();
    assert_eq!(
        reporter.reported,
        vec![
            "a_tests::bad: failed (expected 1)".to_owned(),
            "b_tests::skip: skipped".to_owned(),
        ]
    );
}

#[tokio::test]
async fn selected_test_moves_through_states() {
    let ws = TestWorkspace::new();
    let a = ws.suite("a");
    let (cx, _) = populated(&ws).await;
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut cx = cx.with_observer({
        let events = events.clone();
        move |batch: &[TreeEvent]| events.borrow_mut().extend_from_slice(batch)
    });

    let bad = test_id(&a.join("tests.lgt"), "a_tests", "bad");
    let runner = FakeRunner::new().with(
        &a,
        FakeBehavior::Results(results_for(&a, "a_tests", &[
            ("ok", 3, "passed"),
            ("bad", 7, "passed"),
        ])),
    );
    let summary = run(&runner, &ws, &mut cx, &RunRequest {
        selection: vec![bad.clone()],
        ..Default::default()
    })
    .await;

    assert!(summary.is_success());
    assert_eq!(
        runner.dispatched(),
        vec![RunTarget::Test {
            file: a.join("tests.lgt"),
            object: "a_tests".into(),
            test: "bad".into(),
        }]
    );
    let states: Vec<_> = events
        .borrow()
        .iter()
        .filter_map(|event| match event {
            TreeEvent::RunStateChanged { id, state, .. } if *id == bad => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![RunState::Queued, RunState::Running, RunState::Passed]
    );
}

#[tokio::test]
async fn timeout_leaves_tree_unchanged() {
    let ws = TestWorkspace::new();
    let a = ws.suite("a");
    let (mut cx, _) = populated(&ws).await;
    let before = snapshot(cx.tree());

    let runner = FakeRunner::new().with(&a, FakeBehavior::NoMarker);
    let dir_id = NodeAddress::Directory { dir: a.clone() }.id();
    let summary = run(&runner, &ws, &mut cx, &RunRequest {
        selection: vec![dir_id],
        ..Default::default()
    })
    .await;

    assert_eq!(summary.outcomes.len(), 1);
    let error = summary.errors().next().expect("run timed out");
    assert!(matches!(error, RunError::Timeout { .. }), "{error:?}");
    assert_eq!(
        error.to_string(),
        format!("directory {a}: no completion marker after 200ms")
    );
    assert_eq!(snapshot(cx.tree()), before);
}

#[tokio::test]
async fn dispatch_failure_leaves_tree_unchanged() {
    let ws = TestWorkspace::new();
    let a = ws.suite("a");
    let (mut cx, _) = populated(&ws).await;
    let before = snapshot(cx.tree());

    let runner = FakeRunner::new().with(&a, FakeBehavior::FailDispatch);
    let summary = run(&runner, &ws, &mut cx, &RunRequest::default()).await;

    let errors: Vec<_> = summary.errors().collect();
    assert_eq!(errors.len(), 1, "only a's run fails");
    assert!(matches!(errors[0], RunError::Dispatch { .. }));
    assert_eq!(errors[0].target(), &RunTarget::Directory { dir: a.clone() });

    // b reran without writing results, and a didn't run at all.
    assert_eq!(snapshot(cx.tree()), before);
}

#[tokio::test]
async fn cancelled_runs_are_not_dispatched() {
    let ws = TestWorkspace::new();
    let (mut cx, _) = populated(&ws).await;
    let before = snapshot(cx.tree());

    let runner = FakeRunner::new();
    let cancel = CancelToken::new();
    cancel.cancel();
    let summary = run(&runner, &ws, &mut cx, &RunRequest {
        selection: Vec::new(),
        cancel,
    })
    .await;

    assert_eq!(summary.outcomes.len(), 2);
    assert!(
        summary
            .errors()
            .all(|error| matches!(error, RunError::Cancelled { .. }))
    );
    assert_eq!(runner.dispatched(), vec![]);
    assert_eq!(snapshot(cx.tree()), before);
}

#[tokio::test]
async fn missing_result_file_keeps_previous_results() {
    let ws = TestWorkspace::new();
    let a = ws.suite("a");
    let (mut cx, _) = populated(&ws).await;
    let before = snapshot(cx.tree());

    let runner = FakeRunner::new().with(&a, FakeBehavior::MarkerOnly);
    let dir_id = NodeAddress::Directory { dir: a.clone() }.id();
    let summary = run(&runner, &ws, &mut cx, &RunRequest {
        selection: vec![dir_id.clone()],
        ..Default::default()
    })
    .await;

    assert!(summary.errors().next().is_none(), "a missing file is not an error");
    let stats = summary.stats();
    assert_eq!((stats.removed, stats.tests_run()), (0, 0));
    assert_eq!(cx.tree().children(&dir_id).count(), 1);
    assert_eq!(snapshot(cx.tree()), before);
}

#[tokio::test]
async fn rerun_listing_fewer_tests_prunes_only_those() {
    let ws = TestWorkspace::new();
    let a = ws.suite("a");
    let b = ws.suite("b");
    let (mut cx, _) = populated(&ws).await;

    let runner = FakeRunner::new().with(
        &a,
        FakeBehavior::Results(results_for(&a, "a_tests", &[("ok", 3, "passed")])),
    );
    let summary = run(&runner, &ws, &mut cx, &RunRequest {
        selection: vec![NodeAddress::Directory { dir: a.clone() }.id()],
        ..Default::default()
    })
    .await;

    assert_eq!(summary.stats().removed, 1, "only bad is gone");
    let file = a.join("tests.lgt");
    assert!(cx.tree().get(&test_id(&file, "a_tests", "bad")).is_none());
    assert!(cx.tree().get(&test_id(&file, "a_tests", "ok")).is_some());
    assert!(
        cx.tree()
            .get(&test_id(&b.join("tests.lgt"), "b_tests", "skip"))
            .is_some(),
        "other suites are untouched"
    );
}
