use alloy::{
    providers::{Provider, RootProvider},
    rpc::{client::RpcClient, types::BlockNumberOrTag},
    transports::{
        RpcError, TransportError, TransportErrorKind,
        http::{Http, reqwest::Url},
    },
};
use alloy_json_rpc::ErrorPayload;
use alloy_primitives::{B256, Bytes};
use alloy_rpc_types_engine::JwtSecret;
use alloy_transport_http::{
    AuthLayer, HyperClient,
    hyper_util::{client::legacy::Client, rt::TokioExecutor},
};
use async_trait::async_trait;
use derive_more::derive::Deref;
use http_body_util::Full;
use opseq_primitives::{
    ExecutionPayloadV3, ForkchoiceState,
    engine::{
        EngineErrorCode, ExecutionPayloadEnvelope, ForkchoiceUpdated, InputError,
        OpPayloadAttributes, PayloadInfo, PayloadStatus, SealPayloadResponse, SealStage,
    },
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tracing::trace;

const FORKCHOICE_UPDATED_V3: &str = "engine_forkchoiceUpdatedV3";
const GET_PAYLOAD_V3: &str = "engine_getPayloadV3";
const NEW_PAYLOAD_V3: &str = "engine_newPayloadV3";
const SEAL_PAYLOAD: &str = "engine_opSealPayload";
const GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";

/// An error returned by an [`ExecutionEngine`] call.
#[derive(Debug, thiserror::Error)]
pub enum EngineApiError {
    /// The engine answered with a structured JSON-RPC error.
    #[error("engine input error: {0}")]
    Input(#[from] InputError),
    /// The call failed before a structured answer was received.
    #[error("engine transport error: {0}")]
    Transport(TransportError),
}

impl EngineApiError {
    /// Returns the engine error code if this is a structured input error.
    pub const fn input_code(&self) -> Option<EngineErrorCode> {
        match self {
            Self::Input(err) => Some(err.code),
            Self::Transport(_) => None,
        }
    }
}

impl From<TransportError> for EngineApiError {
    fn from(err: TransportError) -> Self {
        match err {
            RpcError::ErrorResp(payload) => Self::Input(input_error(&payload)),
            other => Self::Transport(other),
        }
    }
}

fn input_error(payload: &ErrorPayload) -> InputError {
    InputError::new(payload.code, payload.message.to_string())
}

/// An error returned by [`ExecutionEngine::seal_payload`], tagged with the internal stage the
/// engine failed at, when known.
#[derive(Debug, thiserror::Error)]
#[error("seal payload failed at stage {}: {source}", display_stage(.stage))]
pub struct SealPayloadError {
    /// The stage the engine failed at.
    pub stage: Option<SealStage>,
    /// The underlying error.
    pub source: EngineApiError,
}

fn display_stage(stage: &Option<SealStage>) -> &'static str {
    stage.map_or("unknown", SealStage::as_str)
}

impl SealPayloadError {
    /// Creates a new [`SealPayloadError`].
    pub fn new(stage: Option<SealStage>, source: impl Into<EngineApiError>) -> Self {
        Self { stage, source: source.into() }
    }
}

/// The `data` field of a seal error response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SealErrorData {
    #[serde(default, deserialize_with = "opseq_primitives::engine::deserialize_seal_stage")]
    err_stage: Option<SealStage>,
}

impl From<TransportError> for SealPayloadError {
    fn from(err: TransportError) -> Self {
        let stage = match &err {
            RpcError::ErrorResp(payload) => payload
                .data
                .as_ref()
                .and_then(|raw| serde_json::from_str::<SealErrorData>(raw.get()).ok())
                .and_then(|data| data.err_stage),
            _ => None,
        };
        Self { stage, source: err.into() }
    }
}

/// The execution engine API used by the confirmation pipeline.
///
/// Every call is a network round trip and may suspend for its duration. Cancellation happens by
/// dropping the returned future.
#[async_trait]
pub trait ExecutionEngine: Send + Sync + 'static {
    /// Updates the forkchoice state of the engine. If `attributes` are given, the engine also
    /// starts building a new payload on top of the new head.
    async fn forkchoice_updated(
        &self,
        state: ForkchoiceState,
        attributes: Option<OpPayloadAttributes>,
    ) -> Result<ForkchoiceUpdated, EngineApiError>;

    /// Retrieves the payload built by the job identified by `info`.
    async fn get_payload(&self, info: PayloadInfo)
    -> Result<ExecutionPayloadEnvelope, EngineApiError>;

    /// Inserts a payload into the engine.
    async fn new_payload(
        &self,
        payload: &ExecutionPayloadV3,
        parent_beacon_block_root: Option<B256>,
    ) -> Result<PayloadStatus, EngineApiError>;

    /// Retrieves, inserts and canonicalizes the payload identified by `info` in a single call.
    ///
    /// A response carrying an `err_stage` means the engine stopped at that stage.
    async fn seal_payload(
        &self,
        info: PayloadInfo,
        state: ForkchoiceState,
        need_payload: bool,
    ) -> Result<SealPayloadResponse, SealPayloadError>;
}

/// The [`EngineClient`] is responsible for interacting with the engine API via HTTP.
/// The inner transport uses a JWT [`AuthLayer`] to authenticate requests.
#[derive(Debug, Clone, Deref)]
pub struct EngineClient {
    inner: RootProvider,
}

impl EngineClient {
    /// Creates a new [`EngineClient`] from the provided [Url] and [`JwtSecret`].
    pub fn new(url: Url, jwt: JwtSecret) -> Self {
        let hyper_client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();

        let auth_layer = AuthLayer::new(jwt);
        let service = ServiceBuilder::new().layer(auth_layer).service(hyper_client);

        let layer_transport = HyperClient::<Full<Bytes>, _>::with_service(service);
        let http_hyper = Http::with_client(layer_transport, url);
        let rpc_client = RpcClient::new(http_hyper, true);
        let inner = RootProvider::new(rpc_client);

        Self { inner }
    }

    /// Returns the hash of the block with the given tag.
    pub async fn block_hash(&self, tag: BlockNumberOrTag) -> Result<B256, EngineApiError> {
        let block: Option<BlockRef> =
            self.client().request(GET_BLOCK_BY_NUMBER, (tag, false)).await?;

        block.map(|block| block.hash).ok_or_else(|| {
            TransportErrorKind::custom_str(&format!("Block not found: {tag}")).into()
        })
    }

    /// Returns the latest, safe and finalized blocks of the engine as a forkchoice state.
    pub async fn forkchoice_state(&self) -> Result<ForkchoiceState, EngineApiError> {
        Ok(ForkchoiceState {
            head_block_hash: self.block_hash(BlockNumberOrTag::Latest).await?,
            safe_block_hash: self.block_hash(BlockNumberOrTag::Safe).await?,
            finalized_block_hash: self.block_hash(BlockNumberOrTag::Finalized).await?,
        })
    }
}

/// The fields of an `eth_getBlockByNumber` result that the sequencer needs.
#[derive(Debug, Deserialize)]
struct BlockRef {
    hash: B256,
}

#[async_trait]
impl ExecutionEngine for EngineClient {
    async fn forkchoice_updated(
        &self,
        state: ForkchoiceState,
        attributes: Option<OpPayloadAttributes>,
    ) -> Result<ForkchoiceUpdated, EngineApiError> {
        trace!(head = %state.head_block_hash, with_attributes = attributes.is_some(), "Engine: forkchoice updated");
        let res = self.client().request(FORKCHOICE_UPDATED_V3, (state, attributes)).await?;
        Ok(res)
    }

    async fn get_payload(
        &self,
        info: PayloadInfo,
    ) -> Result<ExecutionPayloadEnvelope, EngineApiError> {
        trace!(id = %info.id, timestamp = info.timestamp, "Engine: get payload");
        let res = self.client().request(GET_PAYLOAD_V3, (info.id,)).await?;
        Ok(res)
    }

    async fn new_payload(
        &self,
        payload: &ExecutionPayloadV3,
        parent_beacon_block_root: Option<B256>,
    ) -> Result<PayloadStatus, EngineApiError> {
        let block_hash = payload.payload_inner.payload_inner.block_hash;
        trace!(%block_hash, "Engine: new payload");

        // Rollup blocks carry no blobs, so the versioned hashes are always empty.
        let params =
            (payload.clone(), Vec::<B256>::new(), parent_beacon_block_root.unwrap_or_default());
        let res = self.client().request(NEW_PAYLOAD_V3, params).await?;
        Ok(res)
    }

    async fn seal_payload(
        &self,
        info: PayloadInfo,
        state: ForkchoiceState,
        need_payload: bool,
    ) -> Result<SealPayloadResponse, SealPayloadError> {
        trace!(id = %info.id, head = %state.head_block_hash, "Engine: seal payload");
        let res: Option<SealPayloadResponse> =
            self.client().request(SEAL_PAYLOAD, (info.id, state, need_payload)).await?;

        // A null result is an empty response, left to the caller to classify.
        Ok(res.unwrap_or_default())
    }
}
