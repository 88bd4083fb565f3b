use std::sync::Arc;

use opseq_clients::{conductor::SequencerConductor, engine::ExecutionEngine, gossip::AsyncGossiper};

use crate::metrics::Metrics;

mod error;
pub use error::{BlockInsertionError, BlockInsertionSeverity, SealFailure};

mod confirm;
mod seal;
mod start;

/// The struct responsible for inserting new L2 blocks into the execution engine.
/// Block insertion from the sequencer perspective follows these steps:
///
/// 1. Call [`Self::start_payload`] to ask the engine to start building a block on top of the
///    given forkchoice state
/// 2. Wait for the block building time to elapse
/// 3. Call [`Self::confirm_payload`] or [`Self::confirm_payload_combined`] to retrieve, validate,
///    gossip and insert the payload, and make it the new head
///
/// Every failure is a [`BlockInsertionError`], whose [`BlockInsertionSeverity`] tells the caller
/// how to recover.
#[derive(Debug)]
pub struct BlockBuilder<E, G, C, M> {
    engine: Arc<E>,
    gossiper: G,
    conductor: C,
    metrics: M,
}

impl<E, G, C, M> BlockBuilder<E, G, C, M>
where
    E: ExecutionEngine,
    G: AsyncGossiper,
    C: SequencerConductor,
    M: Metrics,
{
    /// Create a new [`BlockBuilder`] instance.
    pub fn new(engine: E, gossiper: G, conductor: C, metrics: M) -> Self {
        Self { engine: Arc::new(engine), gossiper, conductor, metrics }
    }

    /// Get the execution engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Get the gossiper holding payloads that were announced but not yet inserted.
    pub const fn gossiper(&self) -> &G {
        &self.gossiper
    }

    /// Get the sequencer conductor.
    pub const fn conductor(&self) -> &C {
        &self.conductor
    }

    /// Get the metrics sink.
    pub const fn metrics(&self) -> &M {
        &self.metrics
    }
}
