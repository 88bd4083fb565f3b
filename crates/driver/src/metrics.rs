use std::{fmt, time::Duration};

use metrics::{counter, gauge, histogram};

use crate::block_builder::BlockInsertionSeverity;

/// A timed step of block confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequencerStep {
    /// Retrieval of the built payload.
    GetPayload,
    /// Insertion of the payload.
    NewPayload,
    /// Forkchoice update making the payload canonical.
    ForkchoiceUpdateHeads,
    /// Combined retrieval, insertion and forkchoice update.
    SealPayload,
}

impl SequencerStep {
    /// Returns the metric label of the step.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GetPayload => "getPayload",
            Self::NewPayload => "newPayload",
            Self::ForkchoiceUpdateHeads => "forkChoiceUpdateHeads",
            Self::SealPayload => "sealPayload",
        }
    }
}

impl fmt::Display for SequencerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sink for the durations of the block confirmation steps.
pub trait Metrics: Send + Sync + 'static {
    /// Records how long a step took.
    fn record_sequencer_step_time(&self, step: SequencerStep, elapsed: Duration);
}

/// The [`Metrics`] sink backed by the global [`metrics`] recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverMetrics;

impl Metrics for DriverMetrics {
    fn record_sequencer_step_time(&self, step: SequencerStep, elapsed: Duration) {
        histogram!("driver_sequencer_step_time", "step" => step.as_str())
            .record(elapsed.as_secs_f64());
    }
}

impl DriverMetrics {
    // ################ COUNTERS ################ //

    /// Increments the amount of L2 blocks sealed by the sequencer
    pub(crate) fn increment_blocks_sealed() {
        counter!("driver_l2_blocks_sealed").increment(1);
    }

    /// Increments the amount of block insertion failures by severity
    pub(crate) fn increment_insertion_failures(severity: BlockInsertionSeverity) {
        counter!("driver_block_insertion_failures", "severity" => severity.to_string())
            .increment(1);
    }

    /// Increments the amount of payload attributes dropped by the sequencer
    pub(crate) fn increment_attributes_dropped() {
        counter!("driver_payload_attributes_dropped").increment(1);
    }

    // ################ GAUGES ################ //

    /// Sets the number of the latest sealed L2 block
    pub(crate) fn set_l2_head(number: u64) {
        gauge!("driver_l2_head").set(number as f64);
    }

    /// Sets the amount of transactions included in an L2 block
    pub(crate) fn set_block_tx_count(value: usize) {
        gauge!("driver_block_tx_count_gauge").set(value as f64);
    }

    // ################ HISTOGRAMS ################ //

    /// Records the time it took to build an L2 block, retries included
    pub(crate) fn record_total_block_building_time(time_elapsed: Duration) {
        histogram!("driver_total_block_building_time").record(time_elapsed.as_secs_f64());
    }
}
