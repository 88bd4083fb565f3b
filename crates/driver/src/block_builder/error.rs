use std::fmt;

use alloy_primitives::B256;
use derive_more::derive::IsVariant;
use opseq_clients::{conductor::ConductorError, engine::EngineApiError};
use opseq_primitives::{
    engine::{InputError, PayloadStatus, SealStage},
    payload::PayloadSanityError,
};

/// The retry-ability of a block insertion outcome. This is the only signal the sequencing loop
/// uses to decide how to recover from a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IsVariant)]
pub enum BlockInsertionSeverity {
    /// The block was inserted.
    Ok,
    /// The attempt may be retried as is.
    Temporary,
    /// The local view of the chain is inconsistent with the engine and must be reset.
    Prestate,
    /// The payload or its attributes are invalid and must be dropped.
    Payload,
}

impl BlockInsertionSeverity {
    /// Returns the severity of a block insertion result.
    pub fn of<T>(res: &Result<T, BlockInsertionError>) -> Self {
        match res {
            Ok(_) => Self::Ok,
            Err(err) => err.severity(),
        }
    }

    /// Returns an iterable slice of the severity names.
    pub const fn variant_names() -> &'static [&'static str; 4] {
        &["ok", "temporary", "prestate", "payload"]
    }
}

impl fmt::Display for BlockInsertionSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "ok",
            Self::Temporary => "temporary",
            Self::Prestate => "prestate",
            Self::Payload => "payload",
        };
        f.write_str(name)
    }
}

/// The failure of a sealing call that did not produce a usable payload status.
#[derive(Debug, thiserror::Error)]
pub enum SealFailure {
    /// The call failed.
    #[error(transparent)]
    Engine(#[from] EngineApiError),
    /// The engine answered with a status other than `VALID`.
    #[error("status: {0}")]
    Status(PayloadStatus),
    /// The engine answered without any content.
    #[error("got empty response")]
    Empty,
}

/// An error returned by one of the block insertion steps.
///
/// Every variant names the call that failed and maps to exactly one
/// [`BlockInsertionSeverity`], which is never [`BlockInsertionSeverity::Ok`].
#[derive(Debug, thiserror::Error)]
pub enum BlockInsertionError {
    // ============= Payload initiation ================ //
    /// The pre-block forkchoice update was rejected as inconsistent.
    #[error(
        "pre-block-creation forkchoice update was inconsistent with engine, need reset to resolve: {0}"
    )]
    StartInconsistentForkchoice(InputError),
    /// The engine refused the payload attributes.
    #[error("payload attributes are not valid, cannot build block: {0}")]
    StartInvalidAttributes(InputError),
    /// The engine returned an error code we do not classify further.
    #[error("unexpected error code in forkchoice-updated response: {0}")]
    StartUnexpectedCode(InputError),
    /// The forkchoice update starting the build could not be performed.
    #[error("failed to create new block via forkchoice: {0}")]
    StartTransport(#[source] EngineApiError),
    /// The engine considers the new head invalid.
    #[error("forkchoice update starting the build returned invalid status: {0}")]
    StartInvalidStatus(PayloadStatus),
    /// The engine started no build job.
    #[error("missing payload id in forkchoice result when expecting a valid id")]
    StartMissingPayloadId,
    /// The engine cannot start a build yet, e.g. because it is syncing.
    #[error("forkchoice update starting the build returned non-valid status: {0}")]
    StartNotValid(PayloadStatus),

    // ============= Sequential confirmation ================ //
    /// The built payload could not be retrieved.
    #[error("failed to get execution payload: {0}")]
    GetPayload(#[source] EngineApiError),
    /// The payload failed the structural checks.
    #[error("invalid execution payload: {0}")]
    InvalidPayload(#[from] PayloadSanityError),
    /// The conductor did not let this node publish the payload.
    #[error("failed to commit unsafe payload to conductor: {0}")]
    ConductorCommit(#[source] ConductorError),
    /// The payload could not be handed to the engine.
    #[error("failed to insert execution payload: {0}")]
    NewPayloadTransport(#[source] EngineApiError),
    /// The engine rejected the payload.
    #[error("engine rejected execution payload {hash}: {status}")]
    NewPayloadInvalid {
        /// The block hash of the payload.
        hash: B256,
        /// The status returned by the engine.
        status: PayloadStatus,
    },
    /// The engine did not insert the payload yet, e.g. because it is syncing.
    #[error("engine did not insert execution payload {hash}: {status}")]
    NewPayloadNotValid {
        /// The block hash of the payload.
        hash: B256,
        /// The status returned by the engine.
        status: PayloadStatus,
    },
    /// The post-insertion forkchoice update was rejected as inconsistent.
    #[error(
        "post-block-creation forkchoice update was inconsistent with engine, need reset to resolve: {0}"
    )]
    ForkchoiceInconsistent(InputError),
    /// The post-insertion forkchoice update returned an unexpected error code.
    #[error("unexpected error code in forkchoice-updated response: {0}")]
    ForkchoiceUnexpectedCode(InputError),
    /// The post-insertion forkchoice update could not be performed.
    #[error("failed to make the new L2 block canonical via forkchoice: {0}")]
    ForkchoiceTransport(#[source] EngineApiError),
    /// The post-insertion forkchoice update returned a non-valid status.
    #[error("forkchoice update after insertion returned non-valid status: {0}")]
    ForkchoiceNotValid(PayloadStatus),

    // ============= Sealed confirmation ================ //
    /// Sealing failed while retrieving the payload.
    #[error("failed to seal payload at stage getPayload: {0}")]
    SealGetPayload(SealFailure),
    /// Sealing failed while inserting the payload, and may be retried.
    #[error("failed to seal payload at stage newPayload: {0}")]
    SealNewPayload(SealFailure),
    /// Sealing failed because the engine rejected the payload.
    #[error("failed to seal payload at stage newPayload, engine rejected it: {0}")]
    SealNewPayloadInvalid(PayloadStatus),
    /// Sealing failed because the post-insertion forkchoice update was inconsistent.
    #[error(
        "post-block-creation forkchoice update was inconsistent with engine, need reset to resolve: {0}"
    )]
    SealForkchoiceInconsistent(InputError),
    /// Sealing failed with an unexpected error code at the forkchoice stage.
    #[error("unexpected error code in forkchoice-updated response: {0}")]
    SealForkchoiceUnexpectedCode(InputError),
    /// Sealing could not perform the post-insertion forkchoice update.
    #[error("failed to make the new L2 block canonical via forkchoice: {0}")]
    SealForkchoiceTransport(#[source] EngineApiError),
    /// Sealing returned a non-valid status at the forkchoice stage.
    #[error("failed to seal payload at stage forkchoiceUpdated: {0}")]
    SealForkchoiceNotValid(PayloadStatus),
    /// Sealing failed without telling at which stage.
    #[error("failed to seal payload: {0}")]
    Seal(SealFailure),
    /// Sealing reported a failing stage without any status.
    #[error("failed to seal payload at stage {0}: missing payload status")]
    SealMissingStatus(SealStage),
    /// Sealing succeeded but the payload could not be retrieved alongside it.
    #[error("failed to get payload: {0}")]
    SealedWithoutPayload(#[source] EngineApiError),
    /// Sealing succeeded for a payload that fails the structural checks.
    #[error("failed to validate payload but seal succeeded: {0}")]
    SealedInvalidPayload(#[source] PayloadSanityError),
    /// A spawned engine call panicked or was aborted.
    #[error("{task} task failed: {message}")]
    Task {
        /// The name of the task.
        task: &'static str,
        /// The panic or cancellation message.
        message: String,
    },
}

impl BlockInsertionError {
    /// Returns the severity of the error.
    pub const fn severity(&self) -> BlockInsertionSeverity {
        match self {
            Self::StartInconsistentForkchoice(_)
            | Self::ForkchoiceUnexpectedCode(_)
            | Self::SealForkchoiceUnexpectedCode(_) => BlockInsertionSeverity::Prestate,

            Self::StartInvalidAttributes(_)
            | Self::StartInvalidStatus(_)
            | Self::InvalidPayload(_)
            | Self::NewPayloadInvalid { .. }
            | Self::ForkchoiceInconsistent(_)
            | Self::ForkchoiceNotValid(_)
            | Self::SealNewPayloadInvalid(_)
            | Self::SealForkchoiceInconsistent(_)
            | Self::SealForkchoiceNotValid(_)
            | Self::SealedInvalidPayload(_) => BlockInsertionSeverity::Payload,

            Self::StartUnexpectedCode(_)
            | Self::StartTransport(_)
            | Self::StartMissingPayloadId
            | Self::StartNotValid(_)
            | Self::GetPayload(_)
            | Self::ConductorCommit(_)
            | Self::NewPayloadTransport(_)
            | Self::NewPayloadNotValid { .. }
            | Self::ForkchoiceTransport(_)
            | Self::SealGetPayload(_)
            | Self::SealNewPayload(_)
            | Self::SealForkchoiceTransport(_)
            | Self::Seal(_)
            | Self::SealMissingStatus(_)
            | Self::SealedWithoutPayload(_)
            | Self::Task { .. } => BlockInsertionSeverity::Temporary,
        }
    }

    /// Returns true if the engine reported a successful seal for a payload that is structurally
    /// invalid. The chain may already have advanced to an invalid block, so this cannot be handled
    /// as a regular payload error.
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::SealedInvalidPayload(_))
    }
}
