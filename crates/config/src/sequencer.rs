use clap::Parser;

/// Block production configuration options
#[derive(Debug, Clone, Parser)]
pub struct SequencerOpts {
    /// How long the engine is given to build a block before it is retrieved, in milliseconds.
    #[clap(long = "sequencer.build-time-ms", env = "OPSEQ_SEQUENCER_BUILD_TIME_MS", default_value_t = 1_000)]
    pub build_time_ms: u64,
    /// Whether to confirm blocks with a single `engine_opSealPayload` call instead of separate
    /// `getPayload`, `newPayload` and `forkchoiceUpdated` calls.
    #[clap(long = "sequencer.seal-payload", env = "OPSEQ_SEQUENCER_SEAL_PAYLOAD", default_value_t = false)]
    pub seal_payload: bool,
    /// Whether new blocks also become the safe head.
    #[clap(long = "sequencer.update-safe", env = "OPSEQ_SEQUENCER_UPDATE_SAFE", default_value_t = false)]
    pub update_safe: bool,
    /// The base delay between attempts to build a block after a temporary error, in milliseconds.
    /// The delay doubles after each attempt.
    #[clap(long = "sequencer.retry-base-ms", env = "OPSEQ_SEQUENCER_RETRY_BASE_MS", default_value_t = 100)]
    pub retry_base_ms: u64,
    /// The maximum delay between attempts to build a block, in milliseconds.
    #[clap(long = "sequencer.retry-max-ms", env = "OPSEQ_SEQUENCER_RETRY_MAX_MS", default_value_t = 2_000)]
    pub retry_max_ms: u64,
    /// How many times a block is retried after a temporary error before its attributes are
    /// dropped.
    #[clap(long = "sequencer.max-retries", env = "OPSEQ_SEQUENCER_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: usize,
}
