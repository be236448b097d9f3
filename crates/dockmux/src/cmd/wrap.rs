use std::io::{self, ErrorKind, Read};

use dockmux_frame::FrameWriter;
use tracing::debug;

use crate::cmd::{open_input, WrapArgs};
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};

pub fn run(args: WrapArgs) -> CliResult<i32> {
    let mut input = open_input(args.input.as_deref())?;
    let mut writer = FrameWriter::new(io::stdout().lock());
    let mut buf = vec![0u8; args.frame_size];
    let mut frames = 0usize;

    loop {
        let filled = fill(&mut input, &mut buf).map_err(|err| io_error("read failed", err))?;
        if filled == 0 {
            break;
        }
        writer
            .send(args.stream, &buf[..filled])
            .map_err(|err| frame_error("write failed", err))?;
        frames += 1;
        if filled < buf.len() {
            break;
        }
    }

    writer
        .flush()
        .map_err(|err| frame_error("flush failed", err))?;
    debug!(frames, stream = %args.stream, "input framed");
    Ok(SUCCESS)
}

/// Read until `buf` is full or the input ends, so frames only come up short at EOF.
fn fill(input: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some((first, rest)) = self.0.split_first() else {
                return Ok(0);
            };
            buf[0] = *first;
            self.0 = rest;
            Ok(1)
        }
    }

    #[test]
    fn fill_gathers_short_reads() {
        let mut input = Trickle(b"abcdefg");
        let mut buf = [0u8; 4];
        assert_eq!(fill(&mut input, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(fill(&mut input, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"efg");
        assert_eq!(fill(&mut input, &mut buf).unwrap(), 0);
    }
}
