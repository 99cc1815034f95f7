// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The completion marker protocol.
//!
//! A runner creates an empty `.<operation>_done` file in the scratch directory after the result
//! file is fully written. The marker is removed before each dispatch and again once observed.

use crate::config::MarkerConfig;
use camino::Utf8Path;
use std::io;
use tokio::time::Instant;
use tracing::{debug, warn};

/// The outcome of waiting for a marker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum MarkerWait {
    /// The marker appeared and was removed.
    Seen,

    /// The marker didn't appear within the timeout.
    TimedOut,
}

/// Removes a marker left behind by an earlier run.
pub(crate) async fn clear_marker(marker: &Utf8Path) {
    match tokio::fs::remove_file(marker).await {
        Ok(()) => debug!("removed stale marker {marker}"),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => warn!("failed to remove marker {marker}: {error}"),
    }
}

/// Polls for `marker` at a fixed interval until it appears or the timeout elapses.
pub(crate) async fn wait_for_marker(marker: &Utf8Path, config: &MarkerConfig) -> MarkerWait {
    let deadline = Instant::now() + config.timeout;
    loop {
        if tokio::fs::try_exists(marker).await.unwrap_or(false) {
            clear_marker(marker).await;
            return MarkerWait::Seen;
        }
        let now = Instant::now();
        if now >= deadline {
            return MarkerWait::TimedOut;
        }
        tokio::time::sleep(config.poll_interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use std::time::Duration;

    const FAST: MarkerConfig = MarkerConfig {
        poll_interval: Duration::from_millis(5),
        timeout: Duration::from_millis(200),
    };

    #[tokio::test]
    async fn marker_seen_and_removed() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let marker = dir.path().join(".tests_done");

        let writer = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tokio::fs::write(&marker, "").await.expect("wrote marker");
        };
        let (wait, ()) = tokio::join!(wait_for_marker(&marker, &FAST), writer);

        assert_eq!(wait, MarkerWait::Seen);
        assert!(!marker.exists(), "marker is removed once seen");
    }

    #[tokio::test]
    async fn missing_marker_times_out() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let marker = dir.path().join(".tests_done");
        assert_eq!(
            wait_for_marker(&marker, &FAST).await,
            MarkerWait::TimedOut
        );
    }
}
