use std::time::Instant;

use async_trait::async_trait;
use opseq_clients::{conductor::SequencerConductor, engine::ExecutionEngine, gossip::AsyncGossiper};
use opseq_primitives::{
    ForkchoiceState,
    engine::{ExecutionPayloadEnvelope, OpPayloadAttributes, PayloadInfo},
    summary::Summary,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, Lines},
    sync::mpsc,
};
use tokio_retry::RetryIf;
use tracing::{debug, error, info, warn};

use crate::{
    block_builder::{BlockBuilder, BlockInsertionError},
    config::SequencerConfig,
    metrics::{DriverMetrics, Metrics},
};

/// The source of the payload attributes of the blocks to build, usually derived from L1 data.
#[async_trait]
pub trait AttributesSource: Send {
    /// Returns the attributes of the next block, or `None` once the source is closed.
    async fn next_attributes(&mut self) -> Option<OpPayloadAttributes>;
}

#[async_trait]
impl AttributesSource for mpsc::Receiver<OpPayloadAttributes> {
    async fn next_attributes(&mut self) -> Option<OpPayloadAttributes> {
        self.recv().await
    }
}

/// An [`AttributesSource`] reading one JSON-encoded [`OpPayloadAttributes`] per line, as written
/// by a derivation process piped into the sequencer.
///
/// Blank and malformed lines are skipped. The source closes at the end of the input.
#[derive(Debug)]
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin> JsonLinesSource<R> {
    /// Create a new [`JsonLinesSource`] reading from `reader`.
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines() }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> AttributesSource for JsonLinesSource<R> {
    async fn next_attributes(&mut self) -> Option<OpPayloadAttributes> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(err) => {
                    error!(%err, "Failed to read payload attributes");
                    return None;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str(&line) {
                Ok(attributes) => return Some(attributes),
                Err(err) => warn!(%err, "Skipping malformed payload attributes"),
            }
        }
    }
}

/// Errors that the sequencer cannot recover from on its own.
#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    /// The forkchoice state of the sequencer is inconsistent with the engine. The host must
    /// [`Sequencer::reset`] it before building again.
    #[error("forkchoice state must be reset: {0}")]
    ResetRequired(#[source] BlockInsertionError),
    /// The engine sealed a payload that is structurally invalid.
    #[error("critical block insertion error: {0}")]
    Critical(#[source] BlockInsertionError),
}

/// The outcome of a [`Sequencer::step`].
#[derive(Debug)]
pub enum StepOutcome {
    /// A new block was sealed and is the new head.
    Sealed(Box<ExecutionPayloadEnvelope>),
    /// The attributes were dropped, because they or the payload built from them are invalid, or
    /// because temporary errors persisted after every retry.
    Dropped(BlockInsertionError),
    /// The attributes source is closed.
    SourceClosed,
}

/// Builds one block at a time on top of its local forkchoice state, from the attributes handed
/// by its [`AttributesSource`].
#[derive(Debug)]
pub struct Sequencer<E, G, C, M, S> {
    cfg: SequencerConfig,
    builder: BlockBuilder<E, G, C, M>,
    source: S,
    forkchoice: ForkchoiceState,
}

impl<E, G, C, M, S> Sequencer<E, G, C, M, S>
where
    E: ExecutionEngine,
    G: AsyncGossiper,
    C: SequencerConductor,
    M: Metrics,
    S: AttributesSource,
{
    /// Create a new [`Sequencer`] building on top of `forkchoice`.
    pub const fn new(
        cfg: SequencerConfig,
        builder: BlockBuilder<E, G, C, M>,
        source: S,
        forkchoice: ForkchoiceState,
    ) -> Self {
        Self { cfg, builder, source, forkchoice }
    }

    /// Returns the current forkchoice state.
    pub const fn forkchoice(&self) -> &ForkchoiceState {
        &self.forkchoice
    }

    /// Returns the block builder.
    pub const fn builder(&self) -> &BlockBuilder<E, G, C, M> {
        &self.builder
    }

    /// Replaces the forkchoice state, after the host resolved a [`SequencerError::ResetRequired`].
    pub fn reset(&mut self, forkchoice: ForkchoiceState) {
        info!(head = %forkchoice.head_block_hash, safe = %forkchoice.safe_block_hash, "Resetting forkchoice state");
        self.builder.gossiper().clear();
        self.forkchoice = forkchoice;
    }

    /// Builds a block from the next attributes of the source.
    ///
    /// Temporary errors are retried with the same attributes after an exponential backoff.
    /// Attributes are dropped on payload errors. Errors that need the host are returned.
    pub async fn step(&mut self) -> Result<StepOutcome, SequencerError> {
        let Some(attributes) = self.source.next_attributes().await else {
            return Ok(StepOutcome::SourceClosed);
        };

        let start = Instant::now();
        let forkchoice = self.forkchoice;
        let this = &*self;
        let attrs = &attributes;

        let res = RetryIf::spawn(
            self.cfg.retry_strategy(),
            move || this.build_block(forkchoice, attrs.clone()),
            |err: &BlockInsertionError| {
                DriverMetrics::increment_insertion_failures(err.severity());
                let retry = err.severity().is_temporary();
                if retry {
                    warn!(%err, "Temporary error while building block, retrying");
                }
                retry
            },
        )
        .await;

        let err = match res {
            Ok(envelope) => return Ok(self.advance(envelope, start)),
            Err(err) => err,
        };

        // A payload cached by the abandoned attributes must not be confirmed by the next build.
        self.builder.gossiper().clear();

        if err.is_critical() {
            error!(%err, "Engine sealed an invalid payload");
            return Err(SequencerError::Critical(err));
        }
        if err.severity().is_prestate() {
            error!(%err, "Forkchoice state is inconsistent with engine");
            return Err(SequencerError::ResetRequired(err));
        }

        warn!(%err, attributes = %attributes.summary(), "Dropping payload attributes");
        DriverMetrics::increment_attributes_dropped();
        Ok(StepOutcome::Dropped(err))
    }

    /// Makes `envelope` the new head.
    fn advance(&mut self, envelope: ExecutionPayloadEnvelope, start: Instant) -> StepOutcome {
        let hash = envelope.block_hash();
        self.forkchoice.head_block_hash = hash;
        if self.cfg.update_safe {
            self.forkchoice.safe_block_hash = hash;
        }

        DriverMetrics::increment_blocks_sealed();
        DriverMetrics::set_l2_head(envelope.block_number());
        DriverMetrics::set_block_tx_count(envelope.transactions().len());
        DriverMetrics::record_total_block_building_time(start.elapsed());

        StepOutcome::Sealed(Box::new(envelope))
    }

    /// Builds blocks until the attributes source is closed.
    ///
    /// On error the sequencer is left as is, so that the host can [`Self::reset`] it and run it
    /// again.
    pub async fn run(&mut self) -> Result<(), SequencerError> {
        info!(head = %self.forkchoice.head_block_hash, config = %self.cfg.summary(), "Starting sequencer");

        loop {
            match self.step().await? {
                StepOutcome::Sealed(envelope) => {
                    debug!(hash = %envelope.block_hash(), number = envelope.block_number(), "New head");
                }
                StepOutcome::Dropped(_) => {}
                StepOutcome::SourceClosed => {
                    info!("Attributes source closed, stopping sequencer");
                    return Ok(());
                }
            }
        }
    }

    /// Starts a build job, waits for the engine to fill the block and confirms it.
    async fn build_block(
        &self,
        forkchoice: ForkchoiceState,
        attributes: OpPayloadAttributes,
    ) -> Result<ExecutionPayloadEnvelope, BlockInsertionError> {
        let timestamp = attributes.timestamp();
        debug!(
            timestamp,
            deposits = attributes.deposit_count(),
            deposits_only = attributes.is_deposits_only(),
            "Building block"
        );
        let id = self.builder.start_payload(forkchoice, attributes).await?;

        tokio::time::sleep(self.cfg.build_time).await;

        let info = PayloadInfo::new(id, timestamp);
        if self.cfg.seal_payload {
            self.builder.confirm_payload_combined(forkchoice, info, self.cfg.update_safe).await
        } else {
            self.builder.confirm_payload(forkchoice, info, self.cfg.update_safe).await
        }
    }
}
