// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts, StderrStyles, clap_styles},
    reporter::FailureReporter,
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use lgtunit_metadata::LgtunitExitCode;
use lgtunit_sync::{
    config::SyncConfig,
    context::TestContext,
    coverage::FileCoverage,
    discovery::discover_workspace,
    errors::{DisplayErrorChain, RunError},
    helpers::{normalize_path, plural},
    runner::{CommandTestRunner, RunCoordinator, RunRequest, RunSummary},
    tree::{DisplayTestTree, NodeAddress, NodeKind, TestNode, TestTree},
};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::io::{self, Write};
use tracing::{info, warn};

/// Sync lgtunit test results into a test tree, and project clause coverage onto source.
#[derive(Debug, Parser)]
#[command(name = "lgtunit-sync", version, styles = clap_styles::style())]
pub struct LgtunitSyncApp {
    #[command(flatten)]
    output: OutputOpts,

    /// Config file [default: <first workspace>/.config/lgtunit-sync.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl LgtunitSyncApp {
    /// Initializes logging and color output.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code on success.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        // Tree state isn't Send, so everything runs on the main thread.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| ExpectedError::RuntimeBuildError { error })?;
        runtime.block_on(self.command.exec(self.config_file.as_deref(), output))
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile a result file into the test tree and print the tree
    Parse {
        /// The result file written by the test runner
        #[arg(value_name = "RESULTS-FILE")]
        results_file: Utf8PathBuf,

        #[command(flatten)]
        workspace: WorkspaceOpts,

        #[command(flatten)]
        format: FormatOpts,
    },

    /// Print per-clause coverage of a source file
    Coverage {
        /// The result file written by the test runner
        #[arg(value_name = "RESULTS-FILE")]
        results_file: Utf8PathBuf,

        /// The source file to project coverage onto
        #[arg(value_name = "SOURCE-FILE")]
        source_file: Utf8PathBuf,

        #[command(flatten)]
        format: FormatOpts,
    },

    /// Crawl workspaces for test objects and print the tree
    Discover {
        #[command(flatten)]
        workspace: WorkspaceOpts,

        #[command(flatten)]
        format: FormatOpts,
    },

    /// Run tests with the configured runner and print the updated tree
    ///
    /// Workspaces are crawled first. Without a selection, every test suite is run.
    Run {
        #[command(flatten)]
        workspace: WorkspaceOpts,

        #[command(flatten)]
        selection: SelectionOpts,

        #[command(flatten)]
        format: FormatOpts,
    },
}

impl Command {
    async fn exec(self, config_file: Option<&Utf8Path>, output: OutputContext) -> Result<i32> {
        let cwd = current_dir()?;
        match self {
            Self::Parse {
                results_file,
                workspace,
                format,
            } => {
                let roots = workspace.roots(&cwd);
                let config = load_config(&roots[0], config_file)?;
                let results_file = normalize_path(&cwd.join(results_file));
                if !results_file.exists() {
                    warn!("result file `{results_file}` does not exist, treating it as empty");
                }

                let mut cx = TestContext::new(roots);
                let suite_dir = config.results().results_dir_for(&results_file);
                let report = cx
                    .load_result_file(&results_file, suite_dir.as_deref())
                    .await?;
                let stats = report.stats;
                info!(
                    "{results_file}: {} {} ({} passed, {} failed, {} skipped)",
                    stats.tests_run(),
                    plural::tests_str(stats.tests_run()),
                    stats.passed,
                    stats.failed,
                    stats.skipped,
                );
                if stats.ignored > 0 {
                    warn!(
                        "ignored {} {} outside every workspace",
                        stats.ignored,
                        if stats.ignored == 1 { "record" } else { "records" },
                    );
                }

                write_tree(cx.tree(), format.message_format, output)?;
                Ok(LgtunitExitCode::OK)
            }
            Self::Coverage {
                results_file,
                source_file,
                format,
            } => {
                let results_file = normalize_path(&cwd.join(results_file));
                let source_file = normalize_path(&cwd.join(source_file));

                let mut cx = TestContext::new([cwd]);
                cx.load_result_file(&results_file, None).await?;
                let coverage = cx
                    .detailed_coverage(&source_file)
                    .await?
                    .ok_or(ExpectedError::NoCoverage { file: source_file })?;
                for line in &coverage.unresolved {
                    warn!(
                        "{}:{line}: coverage record doesn't match a clause",
                        coverage.file
                    );
                }

                write_coverage(&coverage, format.message_format, output)?;
                Ok(LgtunitExitCode::OK)
            }
            Self::Discover { workspace, format } => {
                let roots = workspace.roots(&cwd);
                let config = load_config(&roots[0], config_file)?;

                let mut cx = TestContext::new(Vec::new());
                discover(&mut cx, &roots, &config);

                write_tree(cx.tree(), format.message_format, output)?;
                Ok(LgtunitExitCode::OK)
            }
            Self::Run {
                workspace,
                selection,
                format,
            } => {
                let roots = workspace.roots(&cwd);
                let config = load_config(&roots[0], config_file)?;

                let mut cx = TestContext::new(Vec::new());
                discover(&mut cx, &roots, &config);

                let selection = match selection.address(&cwd) {
                    Some(address) => {
                        let id = address.id();
                        if !cx.tree().contains(&id) {
                            return Err(ExpectedError::SelectionNotFound {
                                description: describe(&address),
                            });
                        }
                        vec![id]
                    }
                    None => Vec::new(),
                };

                let runner = CommandTestRunner::new(config.runner().clone());
                let mut reporter = FailureReporter::default();
                let summary = {
                    let mut coordinator =
                        RunCoordinator::new(&runner, &config).with_reporter(&mut reporter);
                    coordinator
                        .run(
                            &mut cx,
                            &RunRequest {
                                selection,
                                ..Default::default()
                            },
                        )
                        .await
                };

                write_tree(cx.tree(), format.message_format, output)?;

                let styles = output.stderr_styles();
                let mut stderr = io::stderr().lock();
                if !reporter.is_empty() {
                    reporter
                        .write_to(&styles, &mut stderr)
                        .map_err(|error| ExpectedError::WriteError { error })?;
                }
                write_summary(&summary, &styles, &mut stderr)
                    .map_err(|error| ExpectedError::WriteError { error })?;

                final_status(&summary)
            }
        }
    }
}

#[derive(Debug, Args)]
struct WorkspaceOpts {
    /// Workspace root, may be repeated [default: current directory]
    #[arg(long = "workspace", short = 'w', value_name = "DIR")]
    workspaces: Vec<Utf8PathBuf>,
}

impl WorkspaceOpts {
    /// Returns absolute, normalized roots. Never empty.
    fn roots(&self, cwd: &Utf8Path) -> Vec<Utf8PathBuf> {
        if self.workspaces.is_empty() {
            return vec![cwd.to_owned()];
        }
        self.workspaces
            .iter()
            .map(|root| normalize_path(&cwd.join(root)))
            .unique()
            .collect()
    }
}

#[derive(Debug, Default, Args)]
struct SelectionOpts {
    /// Only run the tests in this file
    #[arg(long, value_name = "PATH")]
    file: Option<Utf8PathBuf>,

    /// Only run this test object of --file
    #[arg(long, requires = "file", value_name = "NAME")]
    object: Option<String>,

    /// Only run this test of --object
    #[arg(long, requires = "object", value_name = "NAME")]
    test: Option<String>,
}

impl SelectionOpts {
    fn address(&self, cwd: &Utf8Path) -> Option<NodeAddress> {
        let file = normalize_path(&cwd.join(self.file.as_ref()?));
        Some(match (&self.object, &self.test) {
            (Some(object), Some(test)) => NodeAddress::Test {
                file,
                object: object.as_str().into(),
                test: test.as_str().into(),
            },
            (Some(object), None) => NodeAddress::Object {
                file,
                object: object.as_str().into(),
            },
            (None, _) => NodeAddress::File { file },
        })
    }
}

#[derive(Debug, Args)]
struct FormatOpts {
    /// Output format
    #[arg(long, value_enum, default_value_t, value_name = "FORMAT")]
    message_format: MessageFormat,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
enum MessageFormat {
    /// A human-readable tree
    #[default]
    Human,
    /// Machine-readable JSON
    Json,
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd =
        std::env::current_dir().map_err(|error| ExpectedError::CurrentDirInvalid { error })?;
    Utf8PathBuf::try_from(cwd).map_err(|error| ExpectedError::CurrentDirNotUtf8 {
        path: error.into_path_buf().display().to_string(),
    })
}

fn load_config(workspace_root: &Utf8Path, config_file: Option<&Utf8Path>) -> Result<SyncConfig> {
    let config = SyncConfig::from_sources(workspace_root, config_file, |config_file, unknown| {
        warn!(
            "ignoring unknown configuration keys in `{config_file}`: {}",
            unknown.iter().join(", ")
        );
    })?;
    Ok(config)
}

fn discover(cx: &mut TestContext, roots: &[Utf8PathBuf], config: &SyncConfig) {
    for root in roots {
        let report = discover_workspace(cx, root, config.discovery());
        for error in &report.errors {
            warn!("{}", DisplayErrorChain::new(error));
        }
    }
}

fn describe(address: &NodeAddress) -> String {
    match address {
        NodeAddress::Workspace { root } => format!("workspace `{root}`"),
        NodeAddress::Directory { dir } => format!("directory `{dir}`"),
        NodeAddress::File { file } => format!("file `{file}`"),
        NodeAddress::Object { file, object } => format!("object `{object}` in `{file}`"),
        NodeAddress::Test { file, object, test } => {
            format!("test `{test}` of object `{object}` in `{file}`")
        }
    }
}

fn write_tree(tree: &TestTree, format: MessageFormat, output: OutputContext) -> Result<()> {
    let mut stdout = io::stdout().lock();
    match format {
        MessageFormat::Human => {
            let styles = output.tree_styles();
            let characters = output.tree_characters();
            write!(
                stdout,
                "{}",
                DisplayTestTree::new(tree, &styles, &characters)
            )
            .map_err(|error| ExpectedError::WriteError { error })?;
        }
        MessageFormat::Json => {
            write_json(&mut stdout, &tree_summary(tree))?;
        }
    }
    stdout
        .flush()
        .map_err(|error| ExpectedError::WriteError { error })
}

fn write_coverage(
    coverage: &FileCoverage,
    format: MessageFormat,
    output: OutputContext,
) -> Result<()> {
    let mut stdout = io::stdout().lock();
    match format {
        MessageFormat::Human => {
            let styles = output.stderr_styles();
            write_coverage_human(coverage, &styles, &mut stdout)
                .map_err(|error| ExpectedError::WriteError { error })?;
        }
        MessageFormat::Json => {
            write_json(&mut stdout, &coverage_summary(coverage))?;
        }
    }
    stdout
        .flush()
        .map_err(|error| ExpectedError::WriteError { error })
}

fn write_coverage_human(
    coverage: &FileCoverage,
    styles: &StderrStyles,
    mut writer: impl Write,
) -> io::Result<()> {
    let total = coverage.clauses.len();
    writeln!(
        writer,
        "{}: {}/{} {} covered",
        coverage.file.style(styles.bold),
        coverage.covered(),
        total,
        plural::clauses_str(total),
    )?;
    for clause in &coverage.clauses {
        let status = if clause.execution_count > 0 {
            "covered".style(styles.passed)
        } else {
            "uncovered".style(styles.failed)
        };
        writeln!(
            writer,
            "{status:>9} {} clause {} (lines {}-{})",
            clause.indicator,
            clause.clause_index,
            clause.range.start.line + 1,
            clause.range.end.line + 1,
        )?;
    }
    Ok(())
}

fn write_json(writer: &mut impl Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, value)
        .map_err(|error| ExpectedError::SerializeError { error })?;
    writeln!(writer).map_err(|error| ExpectedError::WriteError { error })
}

fn write_summary(
    summary: &RunSummary,
    styles: &StderrStyles,
    mut writer: impl Write,
) -> io::Result<()> {
    let stats = summary.stats();
    let abandoned = summary.errors().count();
    write!(
        writer,
        "{:>12} {} {} run: {} {}, {} {}, {} {}",
        "Summary".style(styles.bold),
        stats.tests_run(),
        plural::tests_str(stats.tests_run()),
        stats.passed.style(styles.passed),
        "passed",
        stats.failed.style(styles.failed),
        "failed",
        stats.skipped.style(styles.skipped),
        "skipped",
    )?;
    if abandoned > 0 {
        write!(
            writer,
            ", {} {} abandoned",
            abandoned.style(styles.failed),
            plural::runs_str(abandoned),
        )?;
    }
    writeln!(writer)
}

fn final_status(summary: &RunSummary) -> Result<i32> {
    let (mut timed_out, mut unreadable, mut not_dispatched) = (0, 0, 0);
    for error in summary.errors() {
        match error {
            RunError::Timeout { .. } => timed_out += 1,
            RunError::ReadResults { .. } => unreadable += 1,
            RunError::Dispatch { .. } | RunError::Cancelled { .. } => not_dispatched += 1,
        }
    }
    let stats = summary.stats();
    if timed_out + unreadable + not_dispatched > 0 {
        Err(ExpectedError::RunsAbandoned {
            timed_out,
            unreadable,
            not_dispatched,
        })
    } else if stats.failed > 0 {
        Err(ExpectedError::TestRunFailed {
            failed: stats.failed,
        })
    } else if stats.tests_run() == 0 {
        Err(ExpectedError::NoTestsRun)
    } else {
        Ok(LgtunitExitCode::OK)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct NodeSummary<'a> {
    id: &'a str,
    kind: &'static str,
    label: &'a str,
    file: &'a str,
    line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_state: Option<&'static str>,
    stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

impl<'a> NodeSummary<'a> {
    fn new(node: &'a TestNode) -> Self {
        let kind = node.kind();
        Self {
            id: node.id().as_str(),
            kind: match kind {
                NodeKind::Workspace => "workspace",
                NodeKind::Directory => "directory",
                NodeKind::File => "file",
                NodeKind::Object => "object",
                NodeKind::Test => "test",
            },
            label: &node.label,
            file: node.location.file.as_str(),
            line: node.location.line,
            parent: node.parent().map(|parent| parent.as_str()),
            run_state: kind.has_results().then(|| node.run_state.name()),
            stale: node.stale,
            message: node.message.as_deref(),
        }
    }
}

fn tree_summary(tree: &TestTree) -> Vec<NodeSummary<'_>> {
    tree.iter().map(NodeSummary::new).collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct CoverageSummary<'a> {
    file: &'a str,
    covered: usize,
    total: usize,
    clauses: Vec<ClauseSummary>,
    unresolved_lines: &'a [u32],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct ClauseSummary {
    indicator: String,
    entity: Option<String>,
    clause_index: u32,
    start_line: u32,
    end_line: u32,
    execution_count: u32,
}

fn coverage_summary(coverage: &FileCoverage) -> CoverageSummary<'_> {
    CoverageSummary {
        file: coverage.file.as_str(),
        covered: coverage.covered(),
        total: coverage.clauses.len(),
        clauses: coverage
            .clauses
            .iter()
            .map(|clause| ClauseSummary {
                indicator: clause.indicator.to_string(),
                entity: clause.indicator.entity.clone(),
                clause_index: clause.clause_index,
                start_line: clause.range.start.line,
                end_line: clause.range.end.line,
                execution_count: clause.execution_count,
            })
            .collect(),
        unresolved_lines: &coverage.unresolved,
    }
}
