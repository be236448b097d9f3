use std::io::{self, Write};

use dockmux_frame::{Demuxer, StreamType};
use tracing::{debug, trace};

use crate::cmd::{open_input, DemuxArgs};
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};

pub fn run(args: DemuxArgs) -> CliResult<i32> {
    let input = open_input(args.input.as_deref())?;
    let demuxer = Demuxer::with_config(input, args.decoder.config())
        .map_err(|err| frame_error("invalid decoder settings", err))?;

    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    let mut chunks = 0usize;

    for chunk in demuxer {
        let chunk = chunk.map_err(|err| frame_error("decode failed", err))?;
        let sink: &mut dyn Write = match chunk.stream {
            StreamType::Stdout => &mut stdout,
            StreamType::Stderr => &mut stderr,
            StreamType::Stdin if args.include_stdin => &mut stdout,
            StreamType::Stdin => {
                trace!(len = chunk.payload.len(), "skipping stdin payload");
                continue;
            }
        };
        sink.write_all(&chunk.payload)
            .map_err(|err| io_error(&format!("write {} failed", chunk.stream), err))?;
        chunks += 1;
    }

    stdout.flush().map_err(|err| io_error("flush stdout failed", err))?;
    stderr.flush().map_err(|err| io_error("flush stderr failed", err))?;
    debug!(chunks, "input exhausted");
    Ok(SUCCESS)
}
