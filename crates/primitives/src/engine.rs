use std::{fmt, str::FromStr};

use alloy_primitives::{B256, BlockHash, BlockNumber, Bytes, U64};
use alloy_rpc_types_engine::{ExecutionPayloadV1, ExecutionPayloadV3, PayloadAttributes, PayloadId};
use serde::{Deserialize, Deserializer, Serialize};

use crate::payload::is_deposit_tx;

/// The status of a payload as reported by the execution engine.
///
/// Besides the statuses defined by the engine API, rollup execution clients may report
/// `INVALID_BLOCK_HASH` and `INCONSISTENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// The payload is valid and was applied.
    Valid,
    /// The payload is invalid.
    Invalid,
    /// The engine is syncing and cannot validate the payload yet.
    Syncing,
    /// The payload was accepted but not fully validated.
    Accepted,
    /// The block hash of the payload does not match its contents.
    InvalidBlockHash,
    /// The engine state is inconsistent with the payload.
    Inconsistent,
}

impl ExecutionStatus {
    /// Returns `true` if the status is [`Self::Valid`].
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Returns `true` if the engine rejected the payload itself, i.e. it is either
    /// [`Self::Invalid`] or [`Self::InvalidBlockHash`].
    pub const fn is_invalid(self) -> bool {
        matches!(self, Self::Invalid | Self::InvalidBlockHash)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Syncing => "SYNCING",
            Self::Accepted => "ACCEPTED",
            Self::InvalidBlockHash => "INVALID_BLOCK_HASH",
            Self::Inconsistent => "INCONSISTENT",
        };
        f.write_str(s)
    }
}

/// The result of a `newPayload` or `forkchoiceUpdated` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadStatus {
    /// The execution status of the payload.
    pub status: ExecutionStatus,
    /// The hash of the most recent valid block in the branch defined by the payload.
    #[serde(default)]
    pub latest_valid_hash: Option<B256>,
    /// An optional message explaining why the payload is not valid.
    #[serde(default)]
    pub validation_error: Option<String>,
}

impl PayloadStatus {
    /// Creates a new [`PayloadStatus`] with the given status and no extra information.
    pub const fn new(status: ExecutionStatus) -> Self {
        Self { status, latest_valid_hash: None, validation_error: None }
    }

    /// Sets the validation error message.
    pub fn with_validation_error(mut self, error: impl Into<String>) -> Self {
        self.validation_error = Some(error.into());
        self
    }
}

impl fmt::Display for PayloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status={}", self.status)?;
        if let Some(hash) = self.latest_valid_hash {
            write!(f, ", latest_valid_hash={hash}")?;
        }
        match &self.validation_error {
            Some(err) => write!(f, ", validation_error={err}"),
            None => write!(f, ", validation_error=none"),
        }
    }
}

/// The response of an `engine_forkchoiceUpdated` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkchoiceUpdated {
    /// The status of the new head.
    pub payload_status: PayloadStatus,
    /// The identifier of the payload build job, if attributes were provided.
    #[serde(default)]
    pub payload_id: Option<PayloadId>,
}

impl ForkchoiceUpdated {
    /// Creates a new [`ForkchoiceUpdated`] without a payload identifier.
    pub const fn new(payload_status: PayloadStatus) -> Self {
        Self { payload_status, payload_id: None }
    }

    /// Sets the payload identifier.
    pub const fn with_payload_id(mut self, id: PayloadId) -> Self {
        self.payload_id = Some(id);
        self
    }
}

/// Payload attributes for rollup block building.
///
/// These extend the engine API attributes with the transactions the sequencer forces at the
/// top of the block (deposits first), the `noTxPool` flag and the block gas limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpPayloadAttributes {
    /// The standard engine API payload attributes.
    #[serde(flatten)]
    pub payload_attributes: PayloadAttributes,
    /// Transactions to force-include at the top of the block, as EIP-2718 bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Bytes>>,
    /// If set, the engine must not pull transactions from its mempool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_tx_pool: Option<bool>,
    /// The gas limit of the block to build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<U64>,
}

impl OpPayloadAttributes {
    /// Returns the timestamp of the block to build.
    pub const fn timestamp(&self) -> u64 {
        self.payload_attributes.timestamp
    }

    /// Returns the number of forced transactions.
    pub fn transaction_count(&self) -> usize {
        self.transactions.as_ref().map_or(0, Vec::len)
    }

    /// Returns the number of deposit transactions among the forced transactions.
    pub fn deposit_count(&self) -> usize {
        self.transactions
            .as_ref()
            .map_or(0, |txs| txs.iter().filter(|tx| is_deposit_tx(tx).unwrap_or(false)).count())
    }

    /// Returns `true` if the attributes only allow the forced deposit transactions in the block.
    pub fn is_deposits_only(&self) -> bool {
        self.no_tx_pool.unwrap_or(false) && self.deposit_count() == self.transaction_count()
    }
}

/// A handle to an in-progress build job on the engine, plus the context needed to log it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadInfo {
    /// The identifier of the build job.
    pub id: PayloadId,
    /// The timestamp of the block being built.
    pub timestamp: u64,
}

impl PayloadInfo {
    /// Creates a new [`PayloadInfo`].
    pub const fn new(id: PayloadId, timestamp: u64) -> Self {
        Self { id, timestamp }
    }
}

/// An execution payload together with the auxiliary fields required by the engine API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayloadEnvelope {
    /// The candidate block.
    pub execution_payload: ExecutionPayloadV3,
    /// The parent beacon block root, required by `engine_newPayloadV3`.
    #[serde(default)]
    pub parent_beacon_block_root: Option<B256>,
}

impl ExecutionPayloadEnvelope {
    /// Creates a new [`ExecutionPayloadEnvelope`].
    pub const fn new(
        execution_payload: ExecutionPayloadV3,
        parent_beacon_block_root: Option<B256>,
    ) -> Self {
        Self { execution_payload, parent_beacon_block_root }
    }

    /// Returns the inner V1 payload, which holds the header fields and the transactions.
    pub const fn payload_v1(&self) -> &ExecutionPayloadV1 {
        &self.execution_payload.payload_inner.payload_inner
    }

    /// Returns the block hash of the payload.
    pub const fn block_hash(&self) -> BlockHash {
        self.payload_v1().block_hash
    }

    /// Returns the block number of the payload.
    pub const fn block_number(&self) -> BlockNumber {
        self.payload_v1().block_number
    }

    /// Returns the parent hash of the payload.
    pub const fn parent_hash(&self) -> BlockHash {
        self.payload_v1().parent_hash
    }

    /// Returns the ordered transactions of the payload.
    pub fn transactions(&self) -> &[Bytes] {
        &self.payload_v1().transactions
    }
}

/// The internal stage of an `engine_opSealPayload` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SealStage {
    /// Retrieval of the built payload.
    GetPayload,
    /// Insertion of the payload.
    NewPayload,
    /// Canonicalization of the payload through a forkchoice update.
    ForkchoiceUpdated,
}

impl SealStage {
    /// Returns the wire name of the stage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetPayload => "getPayload",
            Self::NewPayload => "newPayload",
            Self::ForkchoiceUpdated => "forkchoiceUpdated",
        }
    }
}

impl fmt::Display for SealStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`SealStage`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown seal stage: {0}")]
pub struct UnknownSealStage(pub String);

impl FromStr for SealStage {
    type Err = UnknownSealStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "getPayload" => Ok(Self::GetPayload),
            "newPayload" => Ok(Self::NewPayload),
            "forkchoiceUpdated" => Ok(Self::ForkchoiceUpdated),
            other => Err(UnknownSealStage(other.to_owned())),
        }
    }
}

/// The response of an `engine_opSealPayload` call.
///
/// If the engine failed at one of its internal stages, `err_stage` names it and
/// `payload_status` holds the status reported by that stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealPayloadResponse {
    /// The stage the engine failed at, if any.
    #[serde(default, deserialize_with = "deserialize_seal_stage")]
    pub err_stage: Option<SealStage>,
    /// The status of the last stage that ran.
    #[serde(default)]
    pub payload_status: Option<PayloadStatus>,
    /// The sealed payload, only returned if requested.
    #[serde(default)]
    pub payload: Option<ExecutionPayloadEnvelope>,
}

impl SealPayloadResponse {
    /// Creates a response for a successful seal.
    pub const fn valid() -> Self {
        Self {
            err_stage: None,
            payload_status: Some(PayloadStatus::new(ExecutionStatus::Valid)),
            payload: None,
        }
    }

    /// Creates a response for a seal that stopped at `stage` with the given status.
    pub const fn failed_at(stage: SealStage, status: PayloadStatus) -> Self {
        Self { err_stage: Some(stage), payload_status: Some(status), payload: None }
    }
}

/// Deserializes an optional seal stage, treating an empty string as no stage.
pub fn deserialize_seal_stage<'de, D>(deserializer: D) -> Result<Option<SealStage>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(stage) => stage.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Engine API error codes.
///
/// Reference: <https://github.com/ethereum/execution-apis/blob/main/src/engine/common.md#errors>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineErrorCode {
    /// `-38001`: the payload identifier is unknown to the engine.
    UnknownPayload,
    /// `-38002`: the forkchoice state is inconsistent with the engine.
    InvalidForkchoiceState,
    /// `-38003`: the payload attributes are invalid.
    InvalidPayloadAttributes,
    /// `-38004`: the request is too large.
    TooLargeRequest,
    /// `-38005`: the payload belongs to an unsupported fork.
    UnsupportedFork,
    /// `-32602`: invalid method parameters.
    InvalidParams,
    /// Any other JSON-RPC error code.
    Other(i64),
}

impl EngineErrorCode {
    /// Returns the numeric JSON-RPC error code.
    pub const fn code(self) -> i64 {
        match self {
            Self::UnknownPayload => -38001,
            Self::InvalidForkchoiceState => -38002,
            Self::InvalidPayloadAttributes => -38003,
            Self::TooLargeRequest => -38004,
            Self::UnsupportedFork => -38005,
            Self::InvalidParams => -32602,
            Self::Other(code) => code,
        }
    }
}

impl From<i64> for EngineErrorCode {
    fn from(code: i64) -> Self {
        match code {
            -38001 => Self::UnknownPayload,
            -38002 => Self::InvalidForkchoiceState,
            -38003 => Self::InvalidPayloadAttributes,
            -38004 => Self::TooLargeRequest,
            -38005 => Self::UnsupportedFork,
            -32602 => Self::InvalidParams,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for EngineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "code {code}"),
            known => write!(f, "{known:?} ({})", known.code()),
        }
    }
}

/// A structured error returned by the engine for a request it refused to process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} [{code}]")]
pub struct InputError {
    /// The error code.
    pub code: EngineErrorCode,
    /// The error message returned by the engine.
    pub message: String,
}

impl InputError {
    /// Creates a new [`InputError`].
    pub fn new(code: impl Into<EngineErrorCode>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}
