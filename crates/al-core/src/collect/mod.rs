//! Sample collector.
//!
//! Pulls lines from a [`LineSource`], parses them, and accumulates exactly
//! `quota` valid samples into a [`SampleSet`]. Blank lines and lines that
//! carry no recognized channel are skipped without counting.
//!
//! There is no collection timeout: a live source that never delivers enough
//! valid lines blocks until the round is cancelled.

use crate::cancel::CancelToken;
use crate::parse::parse_line;
use crate::transport::LineSource;
use al_common::{Sample, SampleSet};
use std::io;
use std::num::NonZeroUsize;
use thiserror::Error;
use tracing::{debug, trace};

/// Reasons a round ends without a complete sample set.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("collection aborted after {collected} of {requested} samples")]
    Aborted { collected: usize, requested: usize },

    #[error("line source ended after {collected} of {requested} samples")]
    Exhausted { collected: usize, requested: usize },

    #[error("transport read failed: {0}")]
    Transport(#[from] io::Error),
}

impl CollectError {
    /// Samples accepted before the round ended (zero for transport errors).
    pub fn collected(&self) -> usize {
        match self {
            CollectError::Aborted { collected, .. } | CollectError::Exhausted { collected, .. } => {
                *collected
            }
            CollectError::Transport(_) => 0,
        }
    }
}

/// Options for one collection round.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub quota: NonZeroUsize,
    /// Checked before every read; when set the round is aborted.
    pub cancel: Option<CancelToken>,
}

impl CollectOptions {
    pub fn new(quota: NonZeroUsize) -> Self {
        CollectOptions {
            quota,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Line counters for one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub lines_read: usize,
    pub blank_skipped: usize,
    pub noise_skipped: usize,
}

/// Collect exactly `quota` valid samples from `source`.
pub fn collect<S: LineSource + ?Sized>(
    quota: NonZeroUsize,
    source: &mut S,
) -> Result<SampleSet, CollectError> {
    collect_with(&CollectOptions::new(quota), source, |_, _| {})
}

/// Collect with options, invoking `on_sample(index, sample)` for each
/// accepted sample (`index` is zero-based).
pub fn collect_with<S, F>(
    options: &CollectOptions,
    source: &mut S,
    mut on_sample: F,
) -> Result<SampleSet, CollectError>
where
    S: LineSource + ?Sized,
    F: FnMut(usize, &Sample),
{
    let mut set = SampleSet::new(options.quota);
    let mut stats = CollectStats::default();

    while !set.is_complete() {
        if options.is_cancelled() {
            debug!(
                collected = set.filled(),
                requested = set.quota(),
                lines_read = stats.lines_read,
                "Collection aborted"
            );
            return Err(CollectError::Aborted {
                collected: set.filled(),
                requested: set.quota(),
            });
        }

        let line = match source.next_line() {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(
                    collected = set.filled(),
                    requested = set.quota(),
                    lines_read = stats.lines_read,
                    "Line source exhausted"
                );
                return Err(CollectError::Exhausted {
                    collected: set.filled(),
                    requested: set.quota(),
                });
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CollectError::Transport(e)),
        };
        stats.lines_read += 1;

        if line.trim().is_empty() {
            stats.blank_skipped += 1;
            continue;
        }

        let sample = parse_line(&line);
        if sample.is_empty() {
            trace!(line = %line, "Skipping noise line");
            stats.noise_skipped += 1;
            continue;
        }

        let index = set.filled();
        // The loop condition guarantees a free slot.
        if set.push(sample).is_err() {
            break;
        }
        on_sample(index, &sample);
    }

    debug!(
        quota = set.quota(),
        lines_read = stats.lines_read,
        blank_skipped = stats.blank_skipped,
        noise_skipped = stats.noise_skipped,
        "Round collected"
    );
    Ok(set)
}
