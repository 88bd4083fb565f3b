use opseq_clients::{
    conductor::SequencerConductor,
    engine::{EngineApiError, ExecutionEngine},
    gossip::AsyncGossiper,
};
use opseq_primitives::{
    ForkchoiceState, PayloadId,
    engine::{EngineErrorCode, ExecutionStatus, OpPayloadAttributes},
    summary::Summary,
};
use tracing::debug;

use super::{BlockBuilder, BlockInsertionError};
use crate::metrics::Metrics;

impl<E, G, C, M> BlockBuilder<E, G, C, M>
where
    E: ExecutionEngine,
    G: AsyncGossiper,
    C: SequencerConductor,
    M: Metrics,
{
    /// Asks the engine to start building a block with the given attributes on top of the head of
    /// `forkchoice`.
    ///
    /// Returns the identifier of the build job, to be passed to one of the confirmers.
    pub async fn start_payload(
        &self,
        forkchoice: ForkchoiceState,
        attributes: OpPayloadAttributes,
    ) -> Result<PayloadId, BlockInsertionError> {
        debug!(head = %forkchoice.head_block_hash, attributes = %attributes.summary(), "Starting payload");

        let res = match self.engine.forkchoice_updated(forkchoice, Some(attributes)).await {
            Ok(res) => res,
            Err(EngineApiError::Input(err)) => {
                return Err(match err.code {
                    EngineErrorCode::InvalidForkchoiceState => {
                        BlockInsertionError::StartInconsistentForkchoice(err)
                    }
                    EngineErrorCode::InvalidPayloadAttributes => {
                        BlockInsertionError::StartInvalidAttributes(err)
                    }
                    _ => BlockInsertionError::StartUnexpectedCode(err),
                });
            }
            Err(err) => return Err(BlockInsertionError::StartTransport(err)),
        };

        match res.payload_status.status {
            ExecutionStatus::Invalid | ExecutionStatus::InvalidBlockHash => {
                Err(BlockInsertionError::StartInvalidStatus(res.payload_status))
            }
            ExecutionStatus::Valid => {
                let id = res.payload_id.ok_or(BlockInsertionError::StartMissingPayloadId)?;
                debug!(%id, "Payload build started");
                Ok(id)
            }
            _ => Err(BlockInsertionError::StartNotValid(res.payload_status)),
        }
    }
}
