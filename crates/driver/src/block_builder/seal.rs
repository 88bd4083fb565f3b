use std::{sync::Arc, time::Instant};

use opseq_clients::{
    conductor::SequencerConductor,
    engine::{EngineApiError, ExecutionEngine, SealPayloadError},
    gossip::AsyncGossiper,
};
use opseq_primitives::{
    ForkchoiceState,
    engine::{
        EngineErrorCode, ExecutionPayloadEnvelope, ExecutionStatus, PayloadInfo,
        SealPayloadResponse, SealStage,
    },
    payload::sanity_check_payload,
    summary::Summary,
    task::{ScopedTask, join_error_message},
};
use tracing::{debug, error, info};

use super::{BlockBuilder, BlockInsertionError, SealFailure};
use crate::metrics::{Metrics, SequencerStep};

impl<E, G, C, M> BlockBuilder<E, G, C, M>
where
    E: ExecutionEngine,
    G: AsyncGossiper,
    C: SequencerConductor,
    M: Metrics,
{
    /// Same as [`Self::confirm_payload`], but retrieval, insertion and the forkchoice update are
    /// performed by the engine in a single `engine_opSealPayload` call.
    ///
    /// The payload is retrieved concurrently with sealing so that it can be validated and
    /// gossiped while the engine is still inserting it. Both engine calls run on their own task,
    /// and dropping the returned future aborts them.
    pub async fn confirm_payload_combined(
        &self,
        forkchoice: ForkchoiceState,
        payload_info: PayloadInfo,
        update_safe: bool,
    ) -> Result<ExecutionPayloadEnvelope, BlockInsertionError> {
        let start = Instant::now();
        if update_safe {
            debug!(id = %payload_info.id, "Sealing payload, safe head is left to the engine");
        }

        let engine = Arc::clone(&self.engine);
        let seal_task = ScopedTask::spawn(async move {
            engine.seal_payload(payload_info, forkchoice, false).await
        });

        let engine = Arc::clone(&self.engine);
        let get_task = ScopedTask::spawn(async move { engine.get_payload(payload_info).await });

        let fetched = match get_task.join().await {
            Ok(res) => res.map_err(BlockInsertionError::SealedWithoutPayload),
            Err(err) => Err(BlockInsertionError::Task {
                task: "getPayload",
                message: join_error_message(err),
            }),
        };

        let validation = match &fetched {
            Ok(envelope) => {
                let res = sanity_check_payload(&envelope.execution_payload);
                if res.is_ok() {
                    // Sealing is already in flight and cannot be aborted.
                    if let Err(err) = self.conductor.commit_unsafe_payload(envelope).await {
                        error!(id = %payload_info.id, %err, "Failed to commit unsafe payload to conductor");
                    }
                    self.gossiper.gossip(envelope.clone());
                }
                res
            }
            Err(_) => Ok(()),
        };

        let sealed = match seal_task.join().await {
            Ok(res) => res,
            Err(err) => {
                return Err(BlockInsertionError::Task {
                    task: "sealPayload",
                    message: join_error_message(err),
                });
            }
        };
        self.check_sealed(sealed)?;

        let envelope = fetched?;
        validation.map_err(BlockInsertionError::SealedInvalidPayload)?;

        self.gossiper.clear();
        self.metrics.record_sequencer_step_time(SequencerStep::SealPayload, start.elapsed());

        info!(payload = %envelope.summary(), update_safe, "Sealed block");
        Ok(envelope)
    }

    /// Classifies the outcome of a seal call by the stage the engine failed at.
    fn check_sealed(
        &self,
        sealed: Result<SealPayloadResponse, SealPayloadError>,
    ) -> Result<(), BlockInsertionError> {
        let (stage, outcome) = match sealed {
            Ok(res) => (res.err_stage, Ok(res)),
            Err(err) => (err.stage, Err(err.source)),
        };

        match stage {
            Some(SealStage::GetPayload) => {
                let failure = match outcome {
                    Ok(res) => res.payload_status.map_or(SealFailure::Empty, SealFailure::Status),
                    Err(err) => SealFailure::Engine(err),
                };
                Err(BlockInsertionError::SealGetPayload(failure))
            }
            Some(stage @ SealStage::NewPayload) => {
                let status = match outcome {
                    Ok(res) => {
                        res.payload_status.ok_or(BlockInsertionError::SealMissingStatus(stage))?
                    }
                    Err(err) => {
                        return Err(BlockInsertionError::SealNewPayload(SealFailure::Engine(err)));
                    }
                };

                match status.status {
                    ExecutionStatus::Valid => Ok(()),
                    ExecutionStatus::Invalid | ExecutionStatus::InvalidBlockHash => {
                        error!(status = %status, "Seal payload failed to insert payload");
                        self.gossiper.clear();
                        Err(BlockInsertionError::SealNewPayloadInvalid(status))
                    }
                    _ => Err(BlockInsertionError::SealNewPayload(SealFailure::Status(status))),
                }
            }
            Some(stage @ SealStage::ForkchoiceUpdated) => {
                let status = match outcome {
                    Ok(res) => {
                        res.payload_status.ok_or(BlockInsertionError::SealMissingStatus(stage))?
                    }
                    Err(EngineApiError::Input(err)) => {
                        self.gossiper.clear();
                        return Err(match err.code {
                            EngineErrorCode::InvalidForkchoiceState => {
                                BlockInsertionError::SealForkchoiceInconsistent(err)
                            }
                            _ => BlockInsertionError::SealForkchoiceUnexpectedCode(err),
                        });
                    }
                    // The payload is inserted, the cache is kept for a retry of the head update.
                    Err(err) => return Err(BlockInsertionError::SealForkchoiceTransport(err)),
                };

                if status.status.is_valid() {
                    Ok(())
                } else {
                    self.gossiper.clear();
                    Err(BlockInsertionError::SealForkchoiceNotValid(status))
                }
            }
            None => match outcome {
                Err(err) => Err(BlockInsertionError::Seal(SealFailure::Engine(err))),
                Ok(res) => match res.payload_status {
                    None => Err(BlockInsertionError::Seal(SealFailure::Empty)),
                    Some(status) if !status.status.is_valid() => {
                        Err(BlockInsertionError::Seal(SealFailure::Status(status)))
                    }
                    Some(_) => Ok(()),
                },
            },
        }
    }
}
