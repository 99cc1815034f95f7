// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use indoc::indoc;
use lgtunit_metadata::TestResultRecord;
use lgtunit_sync::{
    config::SyncConfig,
    context::TestContext,
    events::{RecordReporter, TreeEvent},
    runner::{RunOutputs, RunTarget, TestRunner},
    tree::{NodeAddress, NodeId, ResultsOrigin, RunState, TestTree},
};
use std::{cell::RefCell, collections::BTreeMap, io, rc::Rc, sync::Mutex};

/// A temporary workspace with fast marker polling.
pub(crate) struct TestWorkspace {
    dir: Utf8TempDir,
    pub(crate) config: SyncConfig,
}

impl TestWorkspace {
    pub(crate) fn new() -> Self {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let config_file = dir.path().join(SyncConfig::CONFIG_PATH);
        std::fs::create_dir_all(config_file.parent().expect("config file has a parent"))
            .expect("created .config");
        std::fs::write(
            &config_file,
            indoc! {r#"
                [marker]
                poll-interval = "10ms"
                timeout = "200ms"
            "#},
        )
        .expect("wrote config");

        let config = SyncConfig::from_sources(dir.path(), None, |path, unknown| {
            panic!("unknown keys in {path}: {unknown:?}")
        })
        .expect("config is valid");
        Self { dir, config }
    }

    pub(crate) fn root(&self) -> &Utf8Path {
        self.dir.path()
    }

    pub(crate) fn suite(&self, name: &str) -> Utf8PathBuf {
        let dir = self.root().join(name);
        std::fs::create_dir_all(&dir).expect("created suite dir");
        dir
    }

    /// Creates a context for this workspace, recording every published event.
    pub(crate) fn context(&self) -> (TestContext, Rc<RefCell<Vec<TreeEvent>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let cx = TestContext::new([self.root().to_owned()]).with_observer(
            move |batch: &[TreeEvent]| {
                sink.borrow_mut().extend_from_slice(batch);
            },
        );
        (cx, events)
    }
}

/// What the fake runner does when dispatched for a results directory.
#[derive(Clone, Debug)]
pub(crate) enum FakeBehavior {
    /// Writes this result file, then the marker.
    Results(String),

    /// Writes only the marker.
    MarkerOnly,

    /// Never writes the marker.
    NoMarker,

    /// Fails to start.
    FailDispatch,
}

#[derive(Debug, Default)]
pub(crate) struct FakeRunner {
    behaviors: BTreeMap<Utf8PathBuf, FakeBehavior>,
    dispatched: Mutex<Vec<RunTarget>>,
}

impl FakeRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, results_dir: &Utf8Path, behavior: FakeBehavior) -> Self {
        self.behaviors.insert(results_dir.to_owned(), behavior);
        self
    }

    pub(crate) fn dispatched(&self) -> Vec<RunTarget> {
        self.dispatched.lock().expect("lock is not poisoned").clone()
    }

    fn handle(&self, target: RunTarget, outputs: &RunOutputs) -> io::Result<()> {
        self.dispatched
            .lock()
            .expect("lock is not poisoned")
            .push(target);

        let behavior = self
            .behaviors
            .get(&outputs.results_dir)
            .cloned()
            .unwrap_or(FakeBehavior::MarkerOnly);
        match behavior {
            FakeBehavior::FailDispatch => {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "runner not executable",
                ));
            }
            FakeBehavior::NoMarker => return Ok(()),
            FakeBehavior::Results(text) => {
                std::fs::create_dir_all(&outputs.scratch_dir)?;
                std::fs::write(&outputs.results_file, text)?;
            }
            FakeBehavior::MarkerOnly => {
                std::fs::create_dir_all(&outputs.scratch_dir)?;
                // A run that wrote nothing leaves no result file behind.
                match std::fs::remove_file(&outputs.results_file) {
                    Ok(()) => {}
                    Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                    Err(error) => return Err(error),
                }
            }
        }
        std::fs::write(&outputs.marker, "")
    }
}

impl TestRunner for FakeRunner {
    fn run_all(&self, scope: &Utf8Path, outputs: &RunOutputs) -> io::Result<()> {
        self.handle(
            RunTarget::All {
                scope: scope.to_owned(),
            },
            outputs,
        )
    }

    fn run_directory(&self, dir: &Utf8Path, outputs: &RunOutputs) -> io::Result<()> {
        self.handle(
            RunTarget::Directory {
                dir: dir.to_owned(),
            },
            outputs,
        )
    }

    fn run_file(&self, file: &Utf8Path, outputs: &RunOutputs) -> io::Result<()> {
        self.handle(
            RunTarget::File {
                file: file.to_owned(),
            },
            outputs,
        )
    }

    fn run_object(&self, file: &Utf8Path, object: &str, outputs: &RunOutputs) -> io::Result<()> {
        self.handle(
            RunTarget::Object {
                file: file.to_owned(),
                object: object.into(),
            },
            outputs,
        )
    }

    fn run_test(
        &self,
        file: &Utf8Path,
        object: &str,
        test: &str,
        outputs: &RunOutputs,
    ) -> io::Result<()> {
        self.handle(
            RunTarget::Test {
                file: file.to_owned(),
                object: object.into(),
                test: test.into(),
            },
            outputs,
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    pub(crate) cleared: Vec<ResultsOrigin>,
    pub(crate) reported: Vec<String>,
}

impl RecordReporter for RecordingReporter {
    fn clear(&mut self, origin: &ResultsOrigin) {
        self.cleared.push(origin.clone());
    }

    fn report(&mut self, _origin: &ResultsOrigin, record: &TestResultRecord) {
        self.reported
            .push(format!("{}::{}: {}", record.object, record.test, record.status));
    }
}

pub(crate) fn test_id(file: &Utf8Path, object: &str, test: &str) -> NodeId {
    NodeAddress::Test {
        file: file.to_owned(),
        object: object.into(),
        test: test.into(),
    }
    .id()
}

pub(crate) type Snapshot = Vec<(String, RunState, bool, Option<String>)>;

pub(crate) fn snapshot(tree: &TestTree) -> Snapshot {
    tree.iter()
        .map(|node| {
            (
                node.id().to_string(),
                node.run_state,
                node.stale,
                node.message.clone(),
            )
        })
        .collect()
}
