#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! opseq sequencer driver
//!
//! The driver is responsible for:
//! - Starting new L2 block builds on the execution engine
//! - Confirming built payloads, either step by step or with a single sealing call
//! - Classifying every failure by how the sequencer should recover from it

/// The block builder, responsible for starting and confirming new L2 blocks.
mod block_builder;
pub use block_builder::{BlockBuilder, BlockInsertionError, BlockInsertionSeverity, SealFailure};

/// The driver configuration.
mod config;
pub use config::SequencerConfig;

/// The metrics for the driver.
mod metrics;
pub use metrics::{DriverMetrics, Metrics, SequencerStep};

/// The sequencing loop, building one block at a time.
mod sequencer;
pub use sequencer::{AttributesSource, JsonLinesSource, Sequencer, SequencerError, StepOutcome};

#[cfg(test)]
mod test_utils;
