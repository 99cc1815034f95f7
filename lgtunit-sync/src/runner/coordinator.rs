// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    CancelToken, PlannedRun, RunTarget, TestRunner,
    marker::{MarkerWait, clear_marker, wait_for_marker},
    plan_runs,
};
use crate::{
    config::{MarkerConfig, SyncConfig},
    context::{TestContext, read_result_file},
    errors::{DisplayErrorChain, RunError},
    events::RecordReporter,
    helpers::plural,
    tree::{NodeId, ReconcileStats, ResultsOrigin, RunState},
};
use camino::Utf8Path;
use futures::future::join_all;
use lgtunit_metadata::{ResultFile, ResultRecord, TestStatus};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tracing::{debug, info, warn};

/// A request to run a selection of nodes.
#[derive(Clone, Debug, Default)]
pub struct RunRequest {
    /// The nodes to run. Empty means every workspace.
    pub selection: Vec<NodeId>,

    /// Checked before each run is dispatched.
    pub cancel: CancelToken,
}

/// What happened to one planned run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The run target.
    pub target: RunTarget,

    /// Statistics from reconciling the results, or why there were none.
    pub result: Result<ReconcileStats, RunError>,
}

/// The outcomes of a run request, in plan order.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// One outcome per planned run.
    pub outcomes: Vec<RunOutcome>,
}

impl RunSummary {
    /// Returns the combined statistics of every run that produced results.
    pub fn stats(&self) -> ReconcileStats {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
            .fold(ReconcileStats::default(), |acc, stats| ReconcileStats {
                added: acc.added + stats.added,
                removed: acc.removed + stats.removed,
                passed: acc.passed + stats.passed,
                failed: acc.failed + stats.failed,
                skipped: acc.skipped + stats.skipped,
                ignored: acc.ignored + stats.ignored,
            })
    }

    /// Iterates over the runs that didn't produce results.
    pub fn errors(&self) -> impl Iterator<Item = &RunError> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err())
    }

    /// Returns true if every run produced results and no test failed.
    pub fn is_success(&self) -> bool {
        self.errors().next().is_none() && self.stats().failed == 0
    }
}

enum RunMessage {
    Started(usize),
    Finished(usize, Result<Option<String>, RunError>),
}

/// Dispatches planned runs, waits for their markers and reconciles their results.
///
/// Runs sharing a results directory write the same result file, so they are executed one after
/// the other. Runs in different results directories proceed concurrently. All tree mutations
/// happen on the task calling [`run`](Self::run).
pub struct RunCoordinator<'a, R: ?Sized> {
    runner: &'a R,
    config: &'a SyncConfig,
    reporter: Option<&'a mut dyn RecordReporter>,
}

impl<'a, R: TestRunner + ?Sized> RunCoordinator<'a, R> {
    /// Creates a new coordinator.
    pub fn new(runner: &'a R, config: &'a SyncConfig) -> Self {
        Self {
            runner,
            config,
            reporter: None,
        }
    }

    /// Sends non-passing test results to `reporter` after each run.
    pub fn with_reporter(mut self, reporter: &'a mut dyn RecordReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Runs the nodes selected by `request`.
    ///
    /// Every result-bearing node under the selection is marked queued, then running once its run
    /// is dispatched. A run that fails (or is cancelled) leaves its nodes as they were before the
    /// request.
    pub async fn run(&mut self, cx: &mut TestContext, request: &RunRequest) -> RunSummary {
        let plan = plan_runs(cx.tree(), &request.selection, self.config.results());
        if plan.is_empty() {
            debug!("nothing to run");
            return RunSummary::default();
        }
        info!("starting {} {}", plan.len(), plural::runs_str(plan.len()));

        let previous = queue(cx, &plan);

        let mut groups: BTreeMap<&Utf8Path, Vec<usize>> = BTreeMap::new();
        for (idx, run) in plan.iter().enumerate() {
            groups
                .entry(run.outputs.results_dir.as_path())
                .or_default()
                .push(idx);
        }

        let runner = self.runner;
        let marker = *self.config.marker();
        let reporter = &mut self.reporter;
        let (sender, mut receiver) = unbounded_channel();

        let dispatch = join_all(groups.into_values().map(|indexes| {
            run_group(
                runner,
                &marker,
                &plan,
                indexes,
                &request.cancel,
                sender.clone(),
            )
        }));
        drop(sender);

        let mut outcomes: Vec<Option<RunOutcome>> = plan.iter().map(|_| None).collect();
        let consume = async {
            while let Some(message) = receiver.recv().await {
                match message {
                    RunMessage::Started(idx) => {
                        let running: Vec<_> = previous[idx]
                            .iter()
                            .filter(|(id, _)| {
                                cx.tree()
                                    .get(id)
                                    .is_some_and(|node| node.run_state == RunState::Queued)
                            })
                            .map(|(id, _)| (id.clone(), RunState::Running))
                            .collect();
                        cx.set_run_states(running);
                    }
                    RunMessage::Finished(idx, result) => {
                        let run = &plan[idx];
                        let result = match result {
                            Ok(text) => Ok(apply_results(
                                cx,
                                reporter.as_deref_mut(),
                                run,
                                text.as_deref().unwrap_or_default(),
                            )),
                            Err(error) => {
                                warn!("{}", DisplayErrorChain::new(&error));
                                Err(error)
                            }
                        };

                        // Nodes the results didn't mention, or all of them if the run failed.
                        let restore: Vec<_> = previous[idx]
                            .iter()
                            .filter(|(id, _)| {
                                cx.tree()
                                    .get(id)
                                    .is_some_and(|node| node.run_state.is_pending())
                            })
                            .cloned()
                            .collect();
                        cx.set_run_states(restore);

                        outcomes[idx] = Some(RunOutcome {
                            target: run.target.clone(),
                            result,
                        });
                    }
                }
            }
        };

        tokio::join!(dispatch, consume);

        let summary = RunSummary {
            outcomes: outcomes.into_iter().flatten().collect(),
        };
        let stats = summary.stats();
        info!(
            passed = stats.passed,
            failed = stats.failed,
            skipped = stats.skipped,
            errors = summary.errors().count(),
            "finished {} {}",
            summary.outcomes.len(),
            plural::runs_str(summary.outcomes.len()),
        );
        summary
    }
}

/// Marks every result-bearing node under each run as queued, returning the states to restore
/// per run. A node under several runs is restored by the first.
fn queue(cx: &mut TestContext, plan: &[PlannedRun]) -> Vec<Vec<(NodeId, RunState)>> {
    let mut seen = BTreeSet::new();
    let previous: Vec<Vec<(NodeId, RunState)>> = plan
        .iter()
        .map(|run| {
            let tree = cx.tree();
            std::iter::once(run.node.clone())
                .chain(tree.descendants(&run.node))
                .filter_map(|id| {
                    let node = tree.get(&id)?;
                    (node.kind().has_results() && seen.insert(id.clone()))
                        .then(|| (id, node.run_state))
                })
                .collect()
        })
        .collect();

    cx.set_run_states(
        previous
            .iter()
            .flatten()
            .map(|(id, _)| (id.clone(), RunState::Queued)),
    );
    previous
}

fn apply_results(
    cx: &mut TestContext,
    reporter: Option<&mut (dyn RecordReporter + '_)>,
    run: &PlannedRun,
    text: &str,
) -> ReconcileStats {
    let origin = ResultsOrigin::new(&run.outputs.results_file);
    let file = ResultFile::parse(text);
    let report = cx.apply_result_file(&origin, Some(run.outputs.results_dir.as_path()), &file);

    if let Some(reporter) = reporter {
        reporter.clear(&origin);
        for record in &file.records {
            if let ResultRecord::TestResult(record) = record {
                if record.test_status() != TestStatus::Passed {
                    reporter.report(&origin, record);
                }
            }
        }
    }
    debug!(
        "{}: {} {} run",
        run.target,
        report.stats.tests_run(),
        plural::tests_str(report.stats.tests_run()),
    );
    report.stats
}

async fn run_group<R: TestRunner + ?Sized>(
    runner: &R,
    marker: &MarkerConfig,
    plan: &[PlannedRun],
    indexes: Vec<usize>,
    cancel: &CancelToken,
    sender: UnboundedSender<RunMessage>,
) {
    for idx in indexes {
        let result = run_one(runner, marker, idx, &plan[idx], cancel, &sender).await;
        // The receiver outlives every group.
        let _ = sender.send(RunMessage::Finished(idx, result));
    }
}

async fn run_one<R: TestRunner + ?Sized>(
    runner: &R,
    marker: &MarkerConfig,
    idx: usize,
    run: &PlannedRun,
    cancel: &CancelToken,
    sender: &UnboundedSender<RunMessage>,
) -> Result<Option<String>, RunError> {
    if cancel.is_cancelled() {
        return Err(RunError::Cancelled {
            target: run.target.clone(),
        });
    }

    clear_marker(&run.outputs.marker).await;
    run.target
        .dispatch(runner, &run.outputs)
        .map_err(|error| RunError::Dispatch {
            target: run.target.clone(),
            error,
        })?;
    let _ = sender.send(RunMessage::Started(idx));
    debug!("dispatched {}, waiting for {}", run.target, run.outputs.marker);

    match wait_for_marker(&run.outputs.marker, marker).await {
        MarkerWait::Seen => read_result_file(&run.outputs.results_file)
            .await
            .map_err(|error| RunError::ReadResults {
                target: run.target.clone(),
                error,
            }),
        MarkerWait::TimedOut => Err(RunError::Timeout {
            target: run.target.clone(),
            timeout: marker.timeout,
        }),
    }
}
