#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Configuration for the opseq sequencer.

use clap::{
    Parser,
    builder::{
        Styles,
        styling::{AnsiColor, Color, Style},
    },
};

mod engine;
pub use engine::{ConductorOpts, EngineOpts};

mod sequencer;
pub use sequencer::SequencerOpts;

mod telemetry;
pub use telemetry::{LogProvider, TelemetryError, TelemetryOpts};

/// CLI options for the opseq sequencer.
#[derive(Debug, Clone, Parser)]
#[command(author, version, styles = cli_styles(), about)]
pub struct Opts {
    /// A unique name for this sequencer instance, used in metrics and logs
    #[clap(long, env = "OPSEQ_INSTANCE_NAME", default_value = "opseq")]
    pub instance_name: String,
    /// Execution engine configuration options
    #[clap(flatten)]
    pub engine: EngineOpts,
    /// Sequencer conductor configuration options
    #[clap(flatten)]
    pub conductor: ConductorOpts,
    /// Block production configuration options
    #[clap(flatten)]
    pub sequencer: SequencerOpts,
    /// Telemetry-related configuration options
    #[clap(flatten)]
    pub telemetry: TelemetryOpts,
}

/// Styles for the CLI.
const fn cli_styles() -> Styles {
    Styles::styled()
        .usage(Style::new().bold().underline().fg_color(Some(Color::Ansi(AnsiColor::Yellow))))
        .header(Style::new().bold().underline().fg_color(Some(Color::Ansi(AnsiColor::Yellow))))
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .invalid(Style::new().bold().fg_color(Some(Color::Ansi(AnsiColor::Red))))
        .error(Style::new().bold().fg_color(Some(Color::Ansi(AnsiColor::Red))))
        .valid(Style::new().bold().underline().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::White))))
}
