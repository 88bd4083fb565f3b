use alloy_rpc_types_engine::JwtSecret;
use clap::Parser;
use url::Url;

/// Execution engine configuration options
#[derive(Debug, Clone, Parser)]
pub struct EngineOpts {
    /// The URL of the execution engine authenticated HTTP API
    #[clap(long = "engine.url", env = "OPSEQ_ENGINE_URL", id = "engine-url")]
    pub url: Url,
    /// The JWT secret to authenticate with the execution engine
    #[clap(long = "engine.jwt-secret", env = "OPSEQ_ENGINE_JWT_SECRET")]
    pub jwt_secret: JwtSecret,
}

/// Sequencer conductor configuration options
#[derive(Debug, Clone, Parser)]
pub struct ConductorOpts {
    /// The URL of the sequencer conductor HTTP API. If not set, high availability is disabled
    /// and every payload is published without asking for permission.
    #[clap(long = "conductor.url", env = "OPSEQ_CONDUCTOR_URL", id = "conductor-url")]
    pub url: Option<Url>,
}
