//! Mock collaborators for the block builder and sequencer tests.

use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy::transports::TransportErrorKind;
use alloy_primitives::{Address, B256};
use alloy_rpc_types_engine::PayloadAttributes;
use async_trait::async_trait;
use opseq_clients::{
    conductor::{ConductorError, SequencerConductor},
    engine::{EngineApiError, ExecutionEngine, SealPayloadError},
    gossip::AsyncGossiper,
};
use opseq_primitives::{
    ExecutionPayloadV3, ForkchoiceState, PayloadId,
    engine::{
        EngineErrorCode, ExecutionPayloadEnvelope, ExecutionStatus, ForkchoiceUpdated,
        InputError, OpPayloadAttributes, PayloadInfo, PayloadStatus, SealPayloadResponse,
    },
    test_utils::{deposit_tx, envelope},
};

use crate::{
    block_builder::BlockBuilder,
    metrics::{Metrics, SequencerStep},
};

type ForkchoiceFn = Box<
    dyn Fn(ForkchoiceState, Option<OpPayloadAttributes>) -> Result<ForkchoiceUpdated, EngineApiError>
        + Send
        + Sync,
>;
type GetPayloadFn =
    Box<dyn Fn(PayloadInfo) -> Result<ExecutionPayloadEnvelope, EngineApiError> + Send + Sync>;
type NewPayloadFn =
    Box<dyn Fn(&ExecutionPayloadV3) -> Result<PayloadStatus, EngineApiError> + Send + Sync>;
type SealPayloadFn = Box<
    dyn Fn(PayloadInfo, ForkchoiceState) -> Result<SealPayloadResponse, SealPayloadError>
        + Send
        + Sync,
>;

/// The block builder used in tests.
pub(crate) type TestBuilder =
    BlockBuilder<MockEngine, RecordingGossiper, MockConductor, RecordingMetrics>;

/// Returns a block builder with default collaborators around `engine`.
pub(crate) fn builder(engine: MockEngine) -> TestBuilder {
    builder_with(engine, RecordingGossiper::default(), MockConductor::default())
}

/// Returns a block builder with the given collaborators.
pub(crate) fn builder_with(
    engine: MockEngine,
    gossiper: RecordingGossiper,
    conductor: MockConductor,
) -> TestBuilder {
    BlockBuilder::new(engine, gossiper, conductor, RecordingMetrics::default())
}

pub(crate) fn payload_id() -> PayloadId {
    PayloadId::new([0, 1, 2, 3, 4, 5, 6, 7])
}

pub(crate) fn payload_info() -> PayloadInfo {
    PayloadInfo::new(payload_id(), envelope(1).payload_v1().timestamp)
}

/// A forkchoice state whose head is the parent of [`envelope`]`(1)`.
pub(crate) fn forkchoice() -> ForkchoiceState {
    ForkchoiceState {
        head_block_hash: envelope(1).parent_hash(),
        safe_block_hash: B256::repeat_byte(0x05),
        finalized_block_hash: B256::repeat_byte(0x06),
    }
}

pub(crate) fn attributes() -> OpPayloadAttributes {
    OpPayloadAttributes {
        payload_attributes: PayloadAttributes {
            timestamp: envelope(1).payload_v1().timestamp,
            prev_randao: B256::repeat_byte(0xbb),
            suggested_fee_recipient: Address::ZERO,
            withdrawals: Some(Vec::new()),
            parent_beacon_block_root: Some(B256::repeat_byte(0xcc)),
        },
        transactions: Some(vec![deposit_tx()]),
        no_tx_pool: Some(false),
        gas_limit: None,
    }
}

pub(crate) fn transport_error() -> EngineApiError {
    EngineApiError::Transport(TransportErrorKind::custom_str("connection refused"))
}

#[derive(Debug, Default)]
struct EngineCalls {
    forkchoice: Vec<(ForkchoiceState, Option<OpPayloadAttributes>)>,
    get_payload: usize,
    new_payload: usize,
    seal_payload: Vec<(ForkchoiceState, bool)>,
    completed_seals: usize,
}

/// An [`ExecutionEngine`] answering with configurable closures.
///
/// By default every call succeeds: forkchoice updates with attributes return [`payload_id`],
/// and the built payload is [`envelope`]`(1)`.
pub(crate) struct MockEngine {
    forkchoice_updated: ForkchoiceFn,
    get_payload: GetPayloadFn,
    new_payload: NewPayloadFn,
    seal_payload: SealPayloadFn,
    seal_payload_delay: Option<Duration>,
    calls: Mutex<EngineCalls>,
}

impl fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockEngine").field("calls", &self.calls).finish_non_exhaustive()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            forkchoice_updated: Box::new(|_, attributes| {
                let res = ForkchoiceUpdated::new(PayloadStatus::new(ExecutionStatus::Valid));
                Ok(if attributes.is_some() { res.with_payload_id(payload_id()) } else { res })
            }),
            get_payload: Box::new(|_| Ok(envelope(1))),
            new_payload: Box::new(|_| Ok(PayloadStatus::new(ExecutionStatus::Valid))),
            seal_payload: Box::new(|_, _| Ok(SealPayloadResponse::valid())),
            seal_payload_delay: None,
            calls: Mutex::default(),
        }
    }
}

impl MockEngine {
    pub(crate) fn with_forkchoice_updated(
        mut self,
        f: impl Fn(ForkchoiceState, Option<OpPayloadAttributes>) -> Result<ForkchoiceUpdated, EngineApiError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.forkchoice_updated = Box::new(f);
        self
    }

    pub(crate) fn with_get_payload(
        mut self,
        f: impl Fn(PayloadInfo) -> Result<ExecutionPayloadEnvelope, EngineApiError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.get_payload = Box::new(f);
        self
    }

    pub(crate) fn with_new_payload(
        mut self,
        f: impl Fn(&ExecutionPayloadV3) -> Result<PayloadStatus, EngineApiError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.new_payload = Box::new(f);
        self
    }

    pub(crate) fn with_seal_payload(
        mut self,
        f: impl Fn(PayloadInfo, ForkchoiceState) -> Result<SealPayloadResponse, SealPayloadError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.seal_payload = Box::new(f);
        self
    }

    pub(crate) const fn with_seal_payload_delay(mut self, delay: Duration) -> Self {
        self.seal_payload_delay = Some(delay);
        self
    }

    /// Makes the engine forget the build job once its payload was retrieved, like an engine
    /// that already sealed it.
    pub(crate) fn forget_payload_after_first_get(self) -> Self {
        let served = AtomicUsize::new(0);
        self.with_get_payload(move |_| {
            if served.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(envelope(1))
            } else {
                Err(InputError::new(EngineErrorCode::UnknownPayload, "Unknown payload").into())
            }
        })
    }

    pub(crate) fn forkchoice_calls(&self) -> Vec<(ForkchoiceState, Option<OpPayloadAttributes>)> {
        self.calls.lock().unwrap().forkchoice.clone()
    }

    pub(crate) fn get_payload_calls(&self) -> usize {
        self.calls.lock().unwrap().get_payload
    }

    pub(crate) fn new_payload_calls(&self) -> usize {
        self.calls.lock().unwrap().new_payload
    }

    pub(crate) fn seal_payload_calls(&self) -> Vec<(ForkchoiceState, bool)> {
        self.calls.lock().unwrap().seal_payload.clone()
    }

    pub(crate) fn completed_seals(&self) -> usize {
        self.calls.lock().unwrap().completed_seals
    }
}

#[async_trait]
impl ExecutionEngine for MockEngine {
    async fn forkchoice_updated(
        &self,
        state: ForkchoiceState,
        attributes: Option<OpPayloadAttributes>,
    ) -> Result<ForkchoiceUpdated, EngineApiError> {
        self.calls.lock().unwrap().forkchoice.push((state, attributes.clone()));
        (self.forkchoice_updated)(state, attributes)
    }

    async fn get_payload(
        &self,
        info: PayloadInfo,
    ) -> Result<ExecutionPayloadEnvelope, EngineApiError> {
        self.calls.lock().unwrap().get_payload += 1;
        (self.get_payload)(info)
    }

    async fn new_payload(
        &self,
        payload: &ExecutionPayloadV3,
        _parent_beacon_block_root: Option<B256>,
    ) -> Result<PayloadStatus, EngineApiError> {
        self.calls.lock().unwrap().new_payload += 1;
        (self.new_payload)(payload)
    }

    async fn seal_payload(
        &self,
        info: PayloadInfo,
        state: ForkchoiceState,
        need_payload: bool,
    ) -> Result<SealPayloadResponse, SealPayloadError> {
        self.calls.lock().unwrap().seal_payload.push((state, need_payload));
        if let Some(delay) = self.seal_payload_delay {
            tokio::time::sleep(delay).await;
        }
        let res = (self.seal_payload)(info, state);
        self.calls.lock().unwrap().completed_seals += 1;
        res
    }
}

/// An [`AsyncGossiper`] that records what it was asked to gossip.
#[derive(Debug, Default)]
pub(crate) struct RecordingGossiper {
    cache: Mutex<Option<ExecutionPayloadEnvelope>>,
    gossiped: Mutex<Vec<B256>>,
}

impl RecordingGossiper {
    /// Returns a gossiper already holding `envelope`, as left by an earlier attempt.
    pub(crate) fn with_cached(envelope: ExecutionPayloadEnvelope) -> Self {
        Self { cache: Mutex::new(Some(envelope)), ..Default::default() }
    }

    /// Returns the hashes of the gossiped payloads, in order.
    pub(crate) fn gossiped(&self) -> Vec<B256> {
        self.gossiped.lock().unwrap().clone()
    }
}

impl AsyncGossiper for RecordingGossiper {
    fn gossip(&self, envelope: ExecutionPayloadEnvelope) {
        self.gossiped.lock().unwrap().push(envelope.block_hash());
        *self.cache.lock().unwrap() = Some(envelope);
    }

    fn get(&self) -> Option<ExecutionPayloadEnvelope> {
        self.cache.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.cache.lock().unwrap().take();
    }
}

/// A [`SequencerConductor`] that records commits, or refuses them.
#[derive(Debug, Default)]
pub(crate) struct MockConductor {
    fail: bool,
    commits: Mutex<Vec<B256>>,
}

impl MockConductor {
    pub(crate) fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    /// Returns the hashes of the committed payloads, in order.
    pub(crate) fn commits(&self) -> Vec<B256> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl SequencerConductor for MockConductor {
    async fn commit_unsafe_payload(
        &self,
        envelope: &ExecutionPayloadEnvelope,
    ) -> Result<(), ConductorError> {
        if self.fail {
            return Err(ConductorError::NotAllowed("not the leader".to_owned()));
        }
        self.commits.lock().unwrap().push(envelope.block_hash());
        Ok(())
    }
}

/// A [`Metrics`] sink recording every step.
#[derive(Debug, Default, Clone)]
pub(crate) struct RecordingMetrics {
    steps: Arc<Mutex<Vec<SequencerStep>>>,
}

impl RecordingMetrics {
    /// Returns the recorded steps, in order.
    pub(crate) fn steps(&self) -> Vec<SequencerStep> {
        self.steps.lock().unwrap().clone()
    }
}

impl Metrics for RecordingMetrics {
    fn record_sequencer_step_time(&self, step: SequencerStep, _elapsed: Duration) {
        self.steps.lock().unwrap().push(step);
    }
}
