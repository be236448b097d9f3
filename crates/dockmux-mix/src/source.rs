use std::convert::Infallible;
use std::future::Future;

use futures_core::{Stream, TryStream};
use futures_util::{StreamExt, TryStreamExt};

/// Outcome of one read from a [`Source`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next<T> {
    /// The source produced a value.
    Item(T),
    /// The read completed without a value; the source is still open.
    Pass,
    /// The source is exhausted and will not be read again.
    Done,
}

impl<T> From<Option<T>> for Next<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Next::Done, Next::Item)
    }
}

/// An independently paced producer of values.
///
/// `mix` keeps exactly one `read` in flight per open source, so an
/// implementation never sees overlapping calls.
pub trait Source {
    type Item;
    type Error;

    /// Wait for the next value, a pass, or exhaustion.
    fn read(&mut self) -> impl Future<Output = Result<Next<Self::Item>, Self::Error>> + Send;
}

/// Adapts any [`Stream`] into a [`Source`]; the stream ending means exhaustion.
#[derive(Debug)]
pub struct StreamSource<S>(pub S);

impl<S> Source for StreamSource<S>
where
    S: Stream + Unpin + Send,
    S::Item: Send,
{
    type Item = S::Item;
    type Error = Infallible;

    async fn read(&mut self) -> Result<Next<S::Item>, Infallible> {
        Ok(self.0.next().await.into())
    }
}

/// Adapts a fallible [`TryStream`] into a [`Source`]; errors propagate to the
/// consumer of the mixed stream.
#[derive(Debug)]
pub struct TryStreamSource<S>(pub S);

impl<S> Source for TryStreamSource<S>
where
    S: TryStream + Unpin + Send,
    S::Ok: Send,
    S::Error: Send,
{
    type Item = S::Ok;
    type Error = S::Error;

    async fn read(&mut self) -> Result<Next<S::Ok>, S::Error> {
        Ok(self.0.try_next().await?.into())
    }
}

#[cfg(feature = "tokio")]
mod channel {
    use std::convert::Infallible;

    use tokio::sync::mpsc;

    use super::{Next, Source};

    impl<T: Send> Source for mpsc::Receiver<T> {
        type Item = T;
        type Error = Infallible;

        async fn read(&mut self) -> Result<Next<T>, Infallible> {
            Ok(self.recv().await.into())
        }
    }

    impl<T: Send> Source for mpsc::UnboundedReceiver<T> {
        type Item = T;
        type Error = Infallible;

        async fn read(&mut self) -> Result<Next<T>, Infallible> {
            Ok(self.recv().await.into())
        }
    }
}
