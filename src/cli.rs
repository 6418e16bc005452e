use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::serial::DEFAULT_SERIALCOMM;

#[derive(Debug, Parser)]
#[command(
    name = "elacap",
    version,
    about = r#"
elacap talks to serial-attached embedded logic analyzers and captures
digital samples from them.

EXAMPLES:
    # See what is attached to a port:
    elacap scan --device /dev/ttyACM0

    # Capture 5000 samples at 200 kHz into capture.bin:
    elacap record --device /dev/ttyACM0

    # Capture around a rising edge on D3, keeping 25% pre-trigger history:
    elacap record --device /dev/ttyACM0 --trigger D3=rising --capture-ratio 25
"#
)]
pub struct Opt {
    #[command(subcommand)]
    pub action: Action,
}

#[derive(Debug, Subcommand)]
pub enum Action {
    /// Probe a serial port for an analyzer and print what it reports.
    Scan(ScanArgs),

    /// Run one acquisition and save the captured samples to a file.
    Record(RecordArgs),
}

#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Serial port the analyzer is attached to, e.g. /dev/ttyACM0.
    #[arg(short, long)]
    pub device: String,

    /// Serial line parameters in baud/frame notation.
    #[arg(long, default_value = DEFAULT_SERIALCOMM)]
    pub serialcomm: String,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Sample rate in Hz.
    #[arg(short, long)]
    pub rate: Option<u64>,

    /// Number of samples to capture.
    #[arg(short = 'n', long)]
    pub samples: Option<u64>,

    /// Percentage of the capture to keep from before the trigger (0-100).
    #[arg(long)]
    pub capture_ratio: Option<u64>,

    /// Trigger condition, e.g. D3=rising. Can be given multiple times;
    /// conditions are rising, falling and edge.
    #[arg(long = "trigger")]
    pub triggers: Vec<String>,

    /// Comma-separated list of channels to enable, e.g. D0,D1,D4. All
    /// channels are enabled when omitted.
    #[arg(long)]
    pub channels: Option<String>,

    /// Output filename for the raw sample bytes, one byte per sample.
    #[arg(short, long, default_value = "capture.bin")]
    pub output: PathBuf,
}
