use dockmux_frame::Demuxer;

use crate::cmd::{open_input, InspectArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_totals, ChunkPrinter, OutputFormat, StreamTotals};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let input = open_input(args.input.as_deref())?;
    let demuxer = Demuxer::with_config(input, args.decoder.config())
        .map_err(|err| frame_error("invalid decoder settings", err))?;

    let mut totals = [StreamTotals::default(); 3];
    let mut printer = (!args.summary).then(|| ChunkPrinter::new(format));

    for (index, chunk) in demuxer.enumerate() {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                // Keep what was decoded before the bad header visible.
                if let Some(printer) = printer {
                    printer.finish();
                }
                return Err(frame_error("decode failed", err));
            }
        };

        let slot = &mut totals[usize::from(chunk.stream.tag())];
        slot.chunks += 1;
        slot.bytes += chunk.payload.len();

        if let Some(printer) = printer.as_mut() {
            printer.print(index, &chunk);
        }
    }

    match printer {
        Some(printer) => printer.finish(),
        None => print_totals(&totals, format),
    }
    Ok(SUCCESS)
}
