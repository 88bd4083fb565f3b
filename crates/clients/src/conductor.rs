use alloy::{
    rpc::client::{ClientBuilder, RpcClient},
    transports::TransportError,
};
use async_trait::async_trait;
use opseq_primitives::engine::ExecutionPayloadEnvelope;
use tracing::trace;
use url::Url;

const COMMIT_UNSAFE_PAYLOAD: &str = "conductor_commitUnsafePayload";

/// Errors returned by a [`SequencerConductor`].
#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    /// The conductor could not be reached or refused the payload.
    #[error("conductor RPC error: {0}")]
    Rpc(#[from] TransportError),
    /// This node is not allowed to publish the payload.
    #[error("not allowed to publish payload: {0}")]
    NotAllowed(String),
}

/// The high-availability conductor, which decides whether this replica may publish a payload.
#[async_trait]
pub trait SequencerConductor: Send + Sync + 'static {
    /// Commits the payload as the tentative unsafe head. Fails if this node is not permitted to
    /// publish it.
    async fn commit_unsafe_payload(
        &self,
        envelope: &ExecutionPayloadEnvelope,
    ) -> Result<(), ConductorError>;
}

/// A conductor for nodes running without high availability. Every commit succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopConductor;

#[async_trait]
impl SequencerConductor for NoopConductor {
    async fn commit_unsafe_payload(
        &self,
        _envelope: &ExecutionPayloadEnvelope,
    ) -> Result<(), ConductorError> {
        Ok(())
    }
}

/// A JSON-RPC client for a remote conductor service.
#[derive(Debug, Clone)]
pub struct ConductorClient {
    rpc: RpcClient,
}

impl ConductorClient {
    /// Creates a new [`ConductorClient`] connected to the given HTTP URL.
    pub fn new(url: Url) -> Self {
        let rpc = ClientBuilder::default().http(url);
        Self { rpc }
    }
}

#[async_trait]
impl SequencerConductor for ConductorClient {
    async fn commit_unsafe_payload(
        &self,
        envelope: &ExecutionPayloadEnvelope,
    ) -> Result<(), ConductorError> {
        trace!(hash = %envelope.block_hash(), "Conductor: commit unsafe payload");
        self.rpc.request::<_, ()>(COMMIT_UNSAFE_PAYLOAD, (envelope.clone(),)).await?;
        Ok(())
    }
}

/// Blanket implementation so that optional conductors can be configured at runtime.
#[async_trait]
impl<C: SequencerConductor> SequencerConductor for Option<C> {
    async fn commit_unsafe_payload(
        &self,
        envelope: &ExecutionPayloadEnvelope,
    ) -> Result<(), ConductorError> {
        match self {
            Some(conductor) => conductor.commit_unsafe_payload(envelope).await,
            None => Ok(()),
        }
    }
}
