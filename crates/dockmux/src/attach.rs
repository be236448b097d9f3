//! Per-stream channels over a tokio attach connection.
//!
//! [`split`] frames an `AsyncRead` with [`DemuxCodec`] on a background task
//! and routes each payload to the channel for its stream type. Channels are
//! bounded, so a slow consumer throttles reads from the connection.

use std::sync::Arc;

use bytes::Bytes;
use dockmux_frame::{DecoderConfig, DemuxCodec, FrameError, Result, StreamType};
use dockmux_mix::{mix, Mix, Next, Source};
use futures_util::future::join_all;
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace};

/// Default number of payloads buffered per stream channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// One item on a stream channel. A decode or I/O error is delivered to every
/// open channel as its last item.
pub type Payload = std::result::Result<Bytes, Arc<FrameError>>;

/// Outcome of the routing task.
pub type RouteResult = std::result::Result<(), Arc<FrameError>>;

/// Settings for [`split`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachConfig {
    /// Decoder settings for the connection.
    pub decoder: DecoderConfig,
    /// Payloads buffered per stream before the reader waits. Zero is treated
    /// as one.
    pub channel_capacity: usize,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            decoder: DecoderConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// The three stream channels of a split connection.
///
/// Each receiver ends once the connection reaches EOF or fails; on failure the
/// error arrives as the final `Err` item. Dropping a receiver discards further
/// data for that stream without affecting the others. Once all three are
/// dropped the routing task stops reading and releases the connection.
#[derive(Debug)]
pub struct Attached {
    pub stdin: mpsc::Receiver<Payload>,
    pub stdout: mpsc::Receiver<Payload>,
    pub stderr: mpsc::Receiver<Payload>,
    /// Completes when the connection is exhausted or abandoned; carries the
    /// same error the channels saw.
    pub task: JoinHandle<RouteResult>,
}

impl Attached {
    /// Merge the three channels into one fair `(StreamType, Bytes)` stream.
    ///
    /// A decode error ends the merged stream with an `Err` item.
    pub fn into_mix(self) -> (Mix<StreamType, Route>, JoinHandle<RouteResult>) {
        let merged = mix([
            (StreamType::Stdin, Route(self.stdin)),
            (StreamType::Stdout, Route(self.stdout)),
            (StreamType::Stderr, Route(self.stderr)),
        ]);
        (merged, self.task)
    }
}

/// A stream channel as a [`Source`]; a routed error fails the read.
#[derive(Debug)]
pub struct Route(pub mpsc::Receiver<Payload>);

impl Source for Route {
    type Item = Bytes;
    type Error = Arc<FrameError>;

    async fn read(&mut self) -> std::result::Result<Next<Bytes>, Arc<FrameError>> {
        self.0.recv().await.transpose().map(Next::from)
    }
}

/// Split an attach connection into per-stream channels.
///
/// Fails only if `config.decoder` is invalid.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
pub fn split<R>(reader: R, config: AttachConfig) -> Result<Attached>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let codec = DemuxCodec::with_config(config.decoder)?;
    let capacity = config.channel_capacity.max(1);

    let (stdin_tx, stdin) = mpsc::channel(capacity);
    let (stdout_tx, stdout) = mpsc::channel(capacity);
    let (stderr_tx, stderr) = mpsc::channel(capacity);

    let task = tokio::spawn(route(
        FramedRead::new(reader, codec),
        [Some(stdin_tx), Some(stdout_tx), Some(stderr_tx)],
    ));

    Ok(Attached {
        stdin,
        stdout,
        stderr,
        task,
    })
}

/// Indexed by stream tag.
type Routes = [Option<mpsc::Sender<Payload>>; 3];

async fn route<R>(mut frames: FramedRead<R, DemuxCodec>, mut routes: Routes) -> RouteResult
where
    R: AsyncRead + Unpin,
{
    loop {
        let next = tokio::select! {
            next = frames.next() => next,
            () = all_closed(&routes) => {
                debug!("all receivers dropped, releasing connection");
                return Ok(());
            }
        };

        let chunk = match next {
            None => return Ok(()),
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => {
                debug!(error = %err, "attach connection failed");
                let err = Arc::new(err);
                fail(&routes, &err).await;
                return Err(err);
            }
        };

        let slot = &mut routes[usize::from(chunk.stream.tag())];
        let Some(tx) = slot else {
            continue;
        };

        trace!(stream = %chunk.stream, len = chunk.payload.len(), "routing payload");
        if tx.send(Ok(chunk.payload)).await.is_err() {
            debug!(stream = %chunk.stream, "receiver dropped, discarding stream");
            *slot = None;
            if routes.iter().all(Option::is_none) {
                return Ok(());
            }
        }
    }
}

/// Resolves once every remaining receiver has been dropped.
async fn all_closed(routes: &Routes) {
    join_all(routes.iter().flatten().map(mpsc::Sender::closed)).await;
}

/// Deliver `err` to every open channel. Closed channels are skipped.
async fn fail(routes: &Routes, err: &Arc<FrameError>) {
    let sends = routes.iter().flatten().map(|tx| tx.send(Err(Arc::clone(err))));
    join_all(sends).await;
}
