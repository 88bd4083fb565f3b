#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! L2 rollup sequencer confirming the blocks built by an execution engine.
//!
//! Payload attributes are read from stdin, one JSON object per line.

use clap::Parser;
use eyre::WrapErr;
use tokio::io::{BufReader, stdin};
use tracing::{info, warn};

use opseq_clients::{
    conductor::ConductorClient,
    engine::EngineClient,
    gossip::{LogPublisher, PayloadGossiper},
};
use opseq_config::Opts;
use opseq_driver::{
    BlockBuilder, DriverMetrics, JsonLinesSource, Sequencer, SequencerConfig, SequencerError,
};

mod shutdown;
use shutdown::run_until_shutdown;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    if let Ok(custom_env_file) = std::env::var("ENV_FILE") {
        // Try from custom env file, and abort if it fails
        dotenvy::from_filename(custom_env_file)?;
    } else {
        // The default .env file is optional
        dotenvy::dotenv().ok();
    }

    let opts = Opts::parse();

    let log_provider = opts.telemetry.setup(&opts.instance_name)?;

    info!("opseq sequencer starting...");

    let on_shutdown = || {
        info!("opseq sequencer shutting down...");
        log_provider.shutdown();
    };

    run_until_shutdown(run(opts), on_shutdown).await
}

/// Wires the engine, conductor and gossiper into a sequencer and runs it until stdin closes.
async fn run(opts: Opts) -> eyre::Result<()> {
    let cfg = SequencerConfig::from_opts(&opts);

    let engine = EngineClient::new(opts.engine.url, opts.engine.jwt_secret);
    let forkchoice =
        engine.forkchoice_state().await.wrap_err("failed to read forkchoice state from engine")?;

    let conductor = opts.conductor.url.map(ConductorClient::new);
    if conductor.is_none() {
        info!("No conductor configured, running without high availability");
    }

    let (gossiper, gossip_task) = PayloadGossiper::new(LogPublisher);
    tokio::spawn(gossip_task.run());

    let builder = BlockBuilder::new(engine, gossiper, conductor, DriverMetrics);
    let source = JsonLinesSource::new(BufReader::new(stdin()));
    let mut sequencer = Sequencer::new(cfg, builder, source, forkchoice);

    loop {
        match sequencer.run().await {
            Ok(()) => return Ok(()),
            Err(SequencerError::ResetRequired(err)) => {
                warn!(%err, "Reloading forkchoice state from engine");
                let forkchoice = sequencer.builder().engine().forkchoice_state().await?;
                sequencer.reset(forkchoice);
            }
            Err(err @ SequencerError::Critical(_)) => return Err(err.into()),
        }
    }
}
