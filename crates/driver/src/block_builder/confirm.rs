use std::time::Instant;

use opseq_clients::{
    conductor::SequencerConductor,
    engine::{EngineApiError, ExecutionEngine},
    gossip::AsyncGossiper,
};
use opseq_primitives::{
    ForkchoiceState,
    engine::{EngineErrorCode, ExecutionPayloadEnvelope, ExecutionStatus, PayloadInfo},
    payload::sanity_check_payload,
    summary::Summary,
};
use tracing::{debug, info};

use super::{BlockBuilder, BlockInsertionError};
use crate::metrics::{Metrics, SequencerStep};

impl<E, G, C, M> BlockBuilder<E, G, C, M>
where
    E: ExecutionEngine,
    G: AsyncGossiper,
    C: SequencerConductor,
    M: Metrics,
{
    /// Ends the build job identified by `payload_info` and makes its payload the canonical head,
    /// using one engine call per step.
    ///
    /// If `update_safe` is true the payload also becomes the safe head.
    ///
    /// A payload still held by the gossiper from an earlier attempt is reused instead of being
    /// retrieved again. The payload is gossiped before the engine inserts it. The gossiper cache is
    /// cleared on success and on every non-temporary failure.
    pub async fn confirm_payload(
        &self,
        mut forkchoice: ForkchoiceState,
        payload_info: PayloadInfo,
        update_safe: bool,
    ) -> Result<ExecutionPayloadEnvelope, BlockInsertionError> {
        let envelope = if let Some(cached) = self.gossiper.get() {
            debug!(
                hash = %cached.block_hash(),
                number = cached.block_number(),
                parent = %cached.parent_hash(),
                txs = cached.transactions().len(),
                "Found uninserted payload from gossiper, reusing it and bypassing engine"
            );
            cached
        } else {
            let start = Instant::now();
            let res = self.engine.get_payload(payload_info).await;
            self.metrics.record_sequencer_step_time(SequencerStep::GetPayload, start.elapsed());

            // Even an unknown payload id is temporary: the whole build is attempted again.
            res.map_err(BlockInsertionError::GetPayload)?
        };

        if let Err(err) = sanity_check_payload(&envelope.execution_payload) {
            self.gossiper.clear();
            return Err(err.into());
        }

        self.conductor
            .commit_unsafe_payload(&envelope)
            .await
            .map_err(BlockInsertionError::ConductorCommit)?;

        // Gossip as soon as possible. The cache is cleared below once the outcome is final.
        self.gossiper.gossip(envelope.clone());

        let hash = envelope.block_hash();
        let start = Instant::now();
        let status = self
            .engine
            .new_payload(&envelope.execution_payload, envelope.parent_beacon_block_root)
            .await
            .map_err(BlockInsertionError::NewPayloadTransport)?;

        match status.status {
            ExecutionStatus::Valid => {}
            ExecutionStatus::Invalid |
            ExecutionStatus::InvalidBlockHash |
            ExecutionStatus::Inconsistent => {
                self.gossiper.clear();
                return Err(BlockInsertionError::NewPayloadInvalid { hash, status });
            }
            _ => return Err(BlockInsertionError::NewPayloadNotValid { hash, status }),
        }
        self.metrics.record_sequencer_step_time(SequencerStep::NewPayload, start.elapsed());

        forkchoice.head_block_hash = hash;
        if update_safe {
            forkchoice.safe_block_hash = hash;
        }

        let start = Instant::now();
        let res = match self.engine.forkchoice_updated(forkchoice, None).await {
            Ok(res) => res,
            Err(EngineApiError::Input(err)) => {
                self.gossiper.clear();
                return Err(match err.code {
                    // The payload is already inserted, so the head it builds on must be wrong.
                    EngineErrorCode::InvalidForkchoiceState => {
                        BlockInsertionError::ForkchoiceInconsistent(err)
                    }
                    _ => BlockInsertionError::ForkchoiceUnexpectedCode(err),
                });
            }
            // The cached payload is kept for the next attempt.
            Err(err) => return Err(BlockInsertionError::ForkchoiceTransport(err)),
        };

        self.gossiper.clear();
        if !res.payload_status.status.is_valid() {
            return Err(BlockInsertionError::ForkchoiceNotValid(res.payload_status));
        }
        self.metrics
            .record_sequencer_step_time(SequencerStep::ForkchoiceUpdateHeads, start.elapsed());

        info!(payload = %envelope.summary(), update_safe, "Inserted block");
        Ok(envelope)
    }
}
