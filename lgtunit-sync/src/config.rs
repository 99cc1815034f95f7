// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for lgtunit-sync.
//!
//! The embedded default config is overlaid with `.config/lgtunit-sync.toml` in the workspace
//! root, or with an explicitly given file.

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    runner::RunOutputs,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::BTreeSet, time::Duration};

/// The loaded configuration.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    workspace_root: Utf8PathBuf,
    runner: RunnerConfig,
    results: ResultsLayout,
    marker: MarkerConfig,
    discovery: DiscoveryConfig,
}

impl SyncConfig {
    /// The config file, relative to the workspace root.
    pub const CONFIG_PATH: &'static str = ".config/lgtunit-sync.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Every key in the config is listed here with its default value.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config for `workspace_root`.
    ///
    /// If `config_file` is given it must exist. Otherwise `.config/lgtunit-sync.toml` is read if
    /// present. `unknown_callback` is called with the config file and any keys that were
    /// ignored.
    pub fn from_sources(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        mut unknown_callback: impl FnMut(&Utf8Path, &BTreeSet<String>),
    ) -> Result<Self, ConfigParseError> {
        let workspace_root = workspace_root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (config, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            unknown_callback(&config_file, &unknown);
        }

        Ok(Self::from_deserialized(workspace_root, config))
    }

    /// Returns the default config.
    pub fn default_config(workspace_root: impl Into<Utf8PathBuf>) -> Self {
        let (config, _unknown) = Self::build_and_deserialize_config(&Self::make_default_config())
            .expect("default config is always valid");
        Self::from_deserialized(workspace_root.into(), config)
    }

    /// Returns the workspace root.
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Returns the test runner command.
    pub fn runner(&self) -> &RunnerConfig {
        &self.runner
    }

    /// Returns where runs write their results.
    pub fn results(&self) -> &ResultsLayout {
        &self.results
    }

    /// Returns the marker polling settings.
    pub fn marker(&self) -> &MarkerConfig {
        &self.marker
    }

    /// Returns the discovery settings.
    pub fn discovery(&self) -> &DiscoveryConfig {
        &self.discovery
    }

    fn from_deserialized(workspace_root: Utf8PathBuf, config: SyncConfigDeserialize) -> Self {
        Self {
            workspace_root,
            runner: config.runner,
            results: config.results,
            marker: config.marker,
            discovery: config.discovery,
        }
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(SyncConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: SyncConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // The path is reported by serde_path_to_error, so drop it from the config error.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SyncConfigDeserialize {
    runner: RunnerConfig,
    results: ResultsLayout,
    marker: MarkerConfig,
    discovery: DiscoveryConfig,
}

/// The program spawned for each run.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunnerConfig {
    /// The program.
    pub command: String,

    /// Extra arguments.
    pub args: Vec<String>,
}

/// Where a run writes its result file and completion marker, relative to its results directory.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResultsLayout {
    /// The scratch directory.
    pub scratch_dir: Utf8PathBuf,

    /// The result file name within the scratch directory.
    pub results_file: String,

    /// The operation name used for the marker file, `.<operation>_done`.
    pub operation: String,
}

impl ResultsLayout {
    /// Returns the output paths for a run with results directory `results_dir`.
    pub fn outputs_for(&self, results_dir: &Utf8Path) -> RunOutputs {
        let scratch_dir = results_dir.join(&self.scratch_dir);
        RunOutputs {
            results_dir: results_dir.to_owned(),
            results_file: scratch_dir.join(&self.results_file),
            marker: scratch_dir.join(format!(".{}_done", self.operation)),
            scratch_dir,
        }
    }

    /// Guesses the results directory a result file was written for: the parent of the scratch
    /// directory if the file is in one, otherwise the file's own directory.
    pub fn results_dir_for(&self, results_file: &Utf8Path) -> Option<Utf8PathBuf> {
        let mut dir = results_file.parent()?;
        if dir.ends_with(&self.scratch_dir) {
            for _ in self.scratch_dir.components() {
                dir = dir.parent()?;
            }
        }
        Some(dir.to_owned())
    }
}

/// Completion marker polling.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MarkerConfig {
    /// Delay between checks.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// How long to wait before abandoning a run.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Test discovery.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiscoveryConfig {
    /// A directory containing this file is an independent test suite.
    pub tester_file: String,

    /// Source file extensions to scan.
    pub extensions: Vec<String>,
}

impl DiscoveryConfig {
    /// Returns true if `path` has one of the configured source extensions.
    pub fn is_source_file(&self, path: &Utf8Path) -> bool {
        path.extension()
            .is_some_and(|ext| self.extensions.iter().any(|known| known == ext))
    }
}
