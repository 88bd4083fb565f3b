use std::{iter::Take, time::Duration};

use opseq_config::{Opts, SequencerOpts};
use opseq_primitives::summary::Summary;
use tokio_retry::strategy::ExponentialBackoff;

/// The runtime configuration of the [`Sequencer`](crate::Sequencer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerConfig {
    /// How long the engine is given to build a block.
    pub build_time: Duration,
    /// Whether blocks are confirmed with the combined sealing call.
    pub seal_payload: bool,
    /// Whether new blocks also become the safe head.
    pub update_safe: bool,
    /// The base delay between attempts after a temporary error.
    pub retry_base: Duration,
    /// The maximum delay between attempts.
    pub retry_max: Duration,
    /// How many times a block is retried before its attributes are dropped.
    pub max_retries: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            build_time: Duration::from_secs(1),
            seal_payload: false,
            update_safe: false,
            retry_base: Duration::from_millis(100),
            retry_max: Duration::from_secs(2),
            max_retries: 5,
        }
    }
}

impl SequencerConfig {
    /// Create a new [`SequencerConfig`] instance from the given [`Opts`].
    pub fn from_opts(opts: &Opts) -> Self {
        Self::from(&opts.sequencer)
    }

    /// Returns the delays to wait between attempts to build the same block.
    ///
    /// The first delay is twice the base delay, and each following one doubles up to the maximum.
    pub fn retry_strategy(&self) -> Take<ExponentialBackoff> {
        let base_ms = u64::try_from(self.retry_base.as_millis()).unwrap_or(u64::MAX).max(1);

        ExponentialBackoff::from_millis(2)
            .factor(base_ms)
            .max_delay(self.retry_max)
            .take(self.max_retries)
    }
}

impl From<&SequencerOpts> for SequencerConfig {
    fn from(opts: &SequencerOpts) -> Self {
        Self {
            build_time: Duration::from_millis(opts.build_time_ms),
            seal_payload: opts.seal_payload,
            update_safe: opts.update_safe,
            retry_base: Duration::from_millis(opts.retry_base_ms),
            retry_max: Duration::from_millis(opts.retry_max_ms),
            max_retries: opts.max_retries,
        }
    }
}

impl Summary for SequencerConfig {
    fn summary(&self) -> String {
        format!(
            "build_time={}ms, seal_payload={}, update_safe={}, retries={} (base={}ms, max={}ms)",
            self.build_time.as_millis(),
            self.seal_payload,
            self.update_safe,
            self.max_retries,
            self.retry_base.as_millis(),
            self.retry_max.as_millis(),
        )
    }
}
