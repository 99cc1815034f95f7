// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{RunOutputs, RunTarget, TestRunner};
use crate::config::RunnerConfig;
use camino::Utf8Path;
use std::{io, process::Stdio};
use tokio::process::Command;
use tracing::debug;

/// A [`TestRunner`] that spawns an external program for each run.
///
/// The program runs in the results directory and is told what to run through environment
/// variables:
///
/// - `LGTUNIT_TARGET_KIND`: `all`, `directory`, `file`, `object` or `test`.
/// - `LGTUNIT_TARGET_PATH`: the workspace root, directory or file.
/// - `LGTUNIT_OBJECT` and `LGTUNIT_TEST`: the object and test names, when targeted.
/// - `LGTUNIT_RESULTS_FILE`: where to write results.
/// - `LGTUNIT_MARKER`: the file to create once results are written.
///
/// The program is not waited for. Must be used from within a Tokio runtime.
#[derive(Clone, Debug)]
pub struct CommandTestRunner {
    config: RunnerConfig,
}

impl CommandTestRunner {
    /// Creates a new runner from config.
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    fn spawn(&self, target: &RunTarget, outputs: &RunOutputs) -> io::Result<()> {
        std::fs::create_dir_all(&outputs.scratch_dir)?;

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .current_dir(&outputs.results_dir)
            .env("LGTUNIT_TARGET_KIND", target.kind_str())
            .env("LGTUNIT_TARGET_PATH", target.path())
            .env("LGTUNIT_RESULTS_FILE", &outputs.results_file)
            .env("LGTUNIT_MARKER", &outputs.marker)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        match target {
            RunTarget::Object { object, .. } => {
                cmd.env("LGTUNIT_OBJECT", object.as_str());
            }
            RunTarget::Test { object, test, .. } => {
                cmd.env("LGTUNIT_OBJECT", object.as_str())
                    .env("LGTUNIT_TEST", test.as_str());
            }
            RunTarget::All { .. } | RunTarget::Directory { .. } | RunTarget::File { .. } => {}
        }

        let child = cmd.spawn()?;
        debug!(
            pid = child.id(),
            "started `{}` for {target}", self.config.command
        );
        Ok(())
    }
}

impl TestRunner for CommandTestRunner {
    fn run_all(&self, scope: &Utf8Path, outputs: &RunOutputs) -> io::Result<()> {
        self.spawn(
            &RunTarget::All {
                scope: scope.to_owned(),
            },
            outputs,
        )
    }

    fn run_directory(&self, dir: &Utf8Path, outputs: &RunOutputs) -> io::Result<()> {
        self.spawn(
            &RunTarget::Directory {
                dir: dir.to_owned(),
            },
            outputs,
        )
    }

    fn run_file(&self, file: &Utf8Path, outputs: &RunOutputs) -> io::Result<()> {
        self.spawn(
            &RunTarget::File {
                file: file.to_owned(),
            },
            outputs,
        )
    }

    fn run_object(&self, file: &Utf8Path, object: &str, outputs: &RunOutputs) -> io::Result<()> {
        self.spawn(
            &RunTarget::Object {
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
        self.spawn(
            &RunTarget::Test {
                file: file.to_owned(),
                object: object.into(),
                test: test.into(),
            },
            outputs,
        )
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{
        config::{MarkerConfig, SyncConfig},
        runner::marker::{MarkerWait, wait_for_marker},
    };
    use camino_tempfile::Utf8TempDir;
    use std::time::Duration;

    #[tokio::test]
    async fn spawned_command_sees_environment() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let runner = CommandTestRunner::new(RunnerConfig {
            command: "sh".to_owned(),
            args: vec![
                "-c".to_owned(),
                r#"printf '%s:%s' "$LGTUNIT_TARGET_KIND" "$LGTUNIT_TEST" > "$LGTUNIT_RESULTS_FILE" && touch "$LGTUNIT_MARKER""#
                    .to_owned(),
            ],
        });
        let outputs = SyncConfig::default_config(dir.path())
            .results()
            .outputs_for(dir.path());

        runner
            .run_test(&dir.path().join("t.lgt"), "obj", "t1", &outputs)
            .expect("spawned sh");
        let wait = wait_for_marker(
            &outputs.marker,
            &MarkerConfig {
                poll_interval: Duration::from_millis(10),
                timeout: Duration::from_secs(10),
            },
        )
        .await;

        assert_eq!(wait, MarkerWait::Seen);
        assert_eq!(
            std::fs::read_to_string(&outputs.results_file).expect("results written"),
            "test:t1"
        );
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn spawned_command_stderr_is_discarded() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let runner = CommandTestRunner::new(RunnerConfig {
            command: "sh".to_owned(),
            args: vec![
                "-c".to_owned(),
                r#"readlink /proc/self/fd/2 > "$LGTUNIT_RESULTS_FILE"; touch "$LGTUNIT_MARKER""#
                    .to_owned(),
            ],
        });
        let outputs = SyncConfig::default_config(dir.path())
            .results()
            .outputs_for(dir.path());

        runner
            .run_directory(dir.path(), &outputs)
            .expect("spawned sh");
        let wait = wait_for_marker(
            &outputs.marker,
            &MarkerConfig {
                poll_interval: Duration::from_millis(10),
                timeout: Duration::from_secs(10),
            },
        )
        .await;

        assert_eq!(wait, MarkerWait::Seen);
        assert_eq!(
            std::fs::read_to_string(&outputs.results_file).expect("results written"),
            "/dev/null\n"
        );
    }

    #[tokio::test]
    async fn missing_program_fails_dispatch() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let runner = CommandTestRunner::new(RunnerConfig {
            command: "lgtunit-sync-no-such-program".to_owned(),
            args: vec![],
        });
        let outputs = SyncConfig::default_config(dir.path())
            .results()
            .outputs_for(dir.path());
        let error = runner
            .run_all(dir.path(), &outputs)
            .expect_err("program doesn't exist");
        assert_eq!(error.kind(), io::ErrorKind::NotFound);
    }
}
