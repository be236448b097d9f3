use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use dockmux_frame::{
    parse_buffer_capacity, DecoderConfig, StreamType, BUFFER_CAPACITY_ENV, DEFAULT_BUFFER_CAPACITY,
};

use crate::exit::{io_error, CliResult};
use crate::output::OutputFormat;

pub mod demux;
pub mod inspect;
pub mod version;
pub mod wrap;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write stdout and stderr payloads of an attach stream to this process's
    /// stdout and stderr.
    Demux(DemuxArgs),
    /// Print decoded payload chunks or per-stream totals.
    Inspect(InspectArgs),
    /// Frame raw input as a single stream.
    Wrap(WrapArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Demux(args) => demux::run(args),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Wrap(args) => wrap::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone, Copy)]
pub struct DecoderArgs {
    /// Decoder buffer size in bytes; payloads are delivered in slices no larger than this.
    #[arg(
        long,
        value_name = "BYTES",
        env = BUFFER_CAPACITY_ENV,
        value_parser = parse_buffer_capacity,
        default_value_t = DEFAULT_BUFFER_CAPACITY
    )]
    pub buffer_capacity: usize,
}

impl DecoderArgs {
    pub fn config(self) -> DecoderConfig {
        DecoderConfig::with_capacity(self.buffer_capacity)
    }
}

#[derive(Args, Debug)]
pub struct DemuxArgs {
    /// Attach stream to read. Default: stdin.
    pub input: Option<PathBuf>,
    #[command(flatten)]
    pub decoder: DecoderArgs,
    /// Also copy stdin-typed payloads to stdout.
    #[arg(long)]
    pub include_stdin: bool,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Attach stream to read. Default: stdin.
    pub input: Option<PathBuf>,
    #[command(flatten)]
    pub decoder: DecoderArgs,
    /// Only print chunk and byte counts per stream.
    #[arg(long)]
    pub summary: bool,
}

#[derive(Args, Debug)]
pub struct WrapArgs {
    /// Raw data to frame. Default: stdin.
    pub input: Option<PathBuf>,
    /// Stream type to tag frames with (stdin, stdout, stderr, or 0-2).
    #[arg(long, short = 's', default_value = "stdout", value_parser = parse_stream)]
    pub stream: StreamType,
    /// Maximum payload bytes per frame.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_BUFFER_CAPACITY, value_parser = parse_frame_size)]
    pub frame_size: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_stream(raw: &str) -> Result<StreamType, String> {
    if let Ok(tag) = raw.parse::<u8>() {
        return StreamType::try_from(tag).map_err(|err| err.to_string());
    }
    StreamType::ALL
        .into_iter()
        .find(|stream| stream.as_str().eq_ignore_ascii_case(raw))
        .ok_or_else(|| format!("unknown stream {raw:?}, expected stdin, stdout, or stderr"))
}

fn parse_frame_size(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("frame size must be at least 1".to_string()),
        Ok(size) => Ok(size),
        Err(err) => Err(err.to_string()),
    }
}

/// Open `path`, or stdin when it is absent or `-`.
pub fn open_input(path: Option<&Path>) -> CliResult<Box<dyn Read>> {
    match path {
        None => Ok(Box::new(io::stdin().lock())),
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdin().lock())),
        Some(path) => {
            let file = File::open(path)
                .map_err(|err| io_error(&format!("cannot open {}", path.display()), err))?;
            Ok(Box::new(file))
        }
    }
}
