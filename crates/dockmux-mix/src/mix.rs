use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::stream::{FusedStream, Stream};
use futures_util::future::{BoxFuture, FutureExt};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::trace;

use crate::source::{Next, Source};

/// Passes absorbed by one `poll_next` before yielding to the executor.
const MAX_PASSES_PER_POLL: usize = 32;

type ReadOutput<K, S> = (
    K,
    S,
    Result<Next<<S as Source>::Item>, <S as Source>::Error>,
);

/// Merge several sources into one stream of `(key, value)` pairs.
///
/// Each source's values come out in the order it produced them. When more
/// than one source has a value ready, the next one is chosen uniformly at
/// random, so a fast source cannot starve the others. The stream ends once
/// every source is exhausted. If a source fails, the error is yielded and the
/// stream ends; reads still in flight on other sources are dropped.
pub fn mix<K, S, I>(sources: I) -> Mix<K, S>
where
    I: IntoIterator<Item = (K, S)>,
    K: Clone + Send + 'static,
    S: Source + Send + 'static,
{
    mix_with_rng(sources, StdRng::from_os_rng())
}

/// Like [`mix`], with a caller-supplied RNG for reproducible tie-breaking.
pub fn mix_with_rng<K, S, I>(sources: I, rng: StdRng) -> Mix<K, S>
where
    I: IntoIterator<Item = (K, S)>,
    K: Clone + Send + 'static,
    S: Source + Send + 'static,
{
    let in_flight = sources
        .into_iter()
        .map(|(key, source)| arm(key, source))
        .collect();
    Mix { in_flight, rng }
}

/// Start the next read on `source`. The future owns the source and hands it
/// back with the result so it can be re-armed.
fn arm<K, S>(key: K, mut source: S) -> BoxFuture<'static, ReadOutput<K, S>>
where
    K: Send + 'static,
    S: Source + Send + 'static,
{
    async move {
        let result = source.read().await;
        (key, source, result)
    }
    .boxed()
}

/// Stream returned by [`mix`].
#[must_use = "streams do nothing unless polled"]
pub struct Mix<K, S: Source> {
    in_flight: Vec<BoxFuture<'static, ReadOutput<K, S>>>,
    rng: StdRng,
}

impl<K, S: Source> Mix<K, S> {
    /// Number of sources that have not reported exhaustion.
    pub fn open_sources(&self) -> usize {
        self.in_flight.len()
    }
}

impl<K, S: Source> fmt::Debug for Mix<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mix")
            .field("open_sources", &self.in_flight.len())
            .finish()
    }
}

impl<K, S> Stream for Mix<K, S>
where
    K: Clone + Send + 'static,
    S: Source + Send + 'static,
{
    type Item = Result<(K, S::Item), S::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let mut passes = 0usize;

        loop {
            if this.in_flight.is_empty() {
                return Poll::Ready(None);
            }

            // A first-ready scan in a fixed order would always favour the
            // earliest entries; permute before every scan.
            this.in_flight.shuffle(&mut this.rng);
            let ready = this
                .in_flight
                .iter_mut()
                .enumerate()
                .find_map(|(idx, read)| match read.poll_unpin(cx) {
                    Poll::Ready(output) => Some((idx, output)),
                    Poll::Pending => None,
                });

            let Some((idx, (key, source, result))) = ready else {
                return Poll::Pending;
            };
            drop(this.in_flight.swap_remove(idx));

            match result {
                Ok(Next::Item(value)) => {
                    this.in_flight.push(arm(key.clone(), source));
                    return Poll::Ready(Some(Ok((key, value))));
                }
                Ok(Next::Pass) => {
                    this.in_flight.push(arm(key, source));
                    passes += 1;
                    if passes >= MAX_PASSES_PER_POLL {
                        cx.waker().wake_by_ref();
                        return Poll::Pending;
                    }
                }
                Ok(Next::Done) => {
                    trace!(open = this.in_flight.len(), "source exhausted");
                }
                Err(err) => {
                    this.in_flight.clear();
                    return Poll::Ready(Some(Err(err)));
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.in_flight.is_empty() {
            (0, Some(0))
        } else {
            (0, None)
        }
    }
}

impl<K, S> FusedStream for Mix<K, S>
where
    K: Clone + Send + 'static,
    S: Source + Send + 'static,
{
    fn is_terminated(&self) -> bool {
        self.in_flight.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use futures_util::stream::{self, StreamExt};

    use super::*;
    use crate::source::{StreamSource, TryStreamSource};

    fn group<K: Ord, T>(items: Vec<(K, T)>) -> BTreeMap<K, Vec<T>> {
        let mut out: BTreeMap<K, Vec<T>> = BTreeMap::new();
        for (key, value) in items {
            out.entry(key).or_default().push(value);
        }
        out
    }

    fn seeded(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[tokio::test]
    async fn reads_every_value_from_every_source() {
        let mixed = mix(vec![
            ("a", StreamSource(stream::iter(vec!["testA"]))),
            ("b", StreamSource(stream::iter(vec!["testB1", "testB2"]))),
            ("c", StreamSource(stream::iter(vec!["testC"]))),
        ]);
        let items: Vec<_> = mixed.map(|item| item.unwrap()).collect().await;

        let grouped = group(items);
        assert_eq!(grouped["a"], vec!["testA"]);
        assert_eq!(grouped["b"], vec!["testB1", "testB2"]);
        assert_eq!(grouped["c"], vec!["testC"]);
    }

    #[tokio::test]
    async fn runs_until_the_last_source_ends() {
        let mut mixed = mix(vec![
            ("a", StreamSource(stream::iter(Vec::<&str>::new()))),
            ("b", StreamSource(stream::iter(vec!["b1", "b2", "b3", "b4"]))),
            ("c", StreamSource(stream::iter(vec!["c1"]))),
        ]);
        assert_eq!(mixed.open_sources(), 3);

        let mut items = Vec::new();
        while let Some(item) = mixed.next().await {
            items.push(item.unwrap());
        }
        assert!(mixed.is_terminated());
        assert_eq!(mixed.open_sources(), 0);

        let grouped = group(items);
        assert!(!grouped.contains_key("a"));
        assert_eq!(grouped["b"], vec!["b1", "b2", "b3", "b4"]);
        assert_eq!(grouped["c"], vec!["c1"]);
    }

    #[tokio::test]
    async fn no_sources_ends_immediately() {
        let mut mixed = mix(Vec::<(u8, StreamSource<stream::Iter<std::vec::IntoIter<u8>>>)>::new());
        assert!(mixed.is_terminated());
        assert!(mixed.next().await.is_none());
    }

    #[tokio::test]
    async fn ready_sources_share_the_output_evenly() {
        let n_items = 1000usize;
        let mixed = mix_with_rng(
            vec![
                ("a", StreamSource(stream::iter(0..n_items))),
                ("b", StreamSource(stream::iter(0..n_items))),
            ],
            seeded(0x5eed),
        );

        let first_half: Vec<_> = mixed.take(n_items).map(|item| item.unwrap()).collect().await;
        let hits_a = first_half.iter().filter(|(key, _)| *key == "a").count();
        let share = hits_a as f64 / n_items as f64;
        assert!((share - 0.5).abs() < 0.05, "share of a: {share}");
    }

    #[tokio::test]
    async fn slow_source_is_not_starved() {
        let slow = stream::iter(0..5u32).then(|i| async move {
            tokio::time::sleep(Duration::from_millis(2)).await;
            i
        });
        let fast = stream::iter(100..10_000u32);
        let mixed = mix(vec![
            ("slow", StreamSource(slow.boxed())),
            ("fast", StreamSource(fast.boxed())),
        ]);

        let items: Vec<_> = mixed.map(|item| item.unwrap()).collect().await;
        let grouped = group(items);
        assert_eq!(grouped["slow"], vec![0, 1, 2, 3, 4]);
        assert_eq!(grouped["fast"].len(), 9_900);
    }

    #[tokio::test]
    async fn error_is_yielded_then_stream_ends() {
        let failing = stream::iter(vec![Ok(1u8), Err("boom")]);
        let healthy = stream::iter(vec![Ok(10u8), Ok(11), Ok(12)]).chain(stream::pending());
        let mut mixed = mix(vec![
            ("failing", TryStreamSource(failing.boxed())),
            ("healthy", TryStreamSource(healthy.boxed())),
        ]);

        let mut seen = Vec::new();
        let mut error = None;
        while let Some(item) = mixed.next().await {
            match item {
                Ok(pair) => seen.push(pair),
                Err(err) => error = Some(err),
            }
        }
        assert_eq!(error, Some("boom"));
        assert!(seen.contains(&("failing", 1)));
        assert!(mixed.is_terminated());
    }

    struct Passing {
        script: Vec<Next<&'static str>>,
    }

    impl Source for Passing {
        type Item = &'static str;
        type Error = std::convert::Infallible;

        async fn read(&mut self) -> Result<Next<&'static str>, Self::Error> {
            tokio::task::yield_now().await;
            Ok(if self.script.is_empty() {
                Next::Done
            } else {
                self.script.remove(0)
            })
        }
    }

    #[tokio::test]
    async fn passes_are_skipped_and_source_stays_open() {
        let source = Passing {
            script: vec![Next::Pass, Next::Item("x"), Next::Pass, Next::Pass, Next::Item("y")],
        };
        let items: Vec<_> = mix(vec![(1u8, source)])
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(items, vec![(1, "x"), (1, "y")]);
    }

    /// Passes forever when `left` is `None`, otherwise counts down to exhaustion.
    struct Countdown {
        left: Option<u8>,
    }

    impl Source for Countdown {
        type Item = u8;
        type Error = std::convert::Infallible;

        async fn read(&mut self) -> Result<Next<u8>, Self::Error> {
            Ok(match &mut self.left {
                None => Next::Pass,
                Some(0) => Next::Done,
                Some(n) => {
                    *n -= 1;
                    Next::Item(*n)
                }
            })
        }
    }

    #[test]
    fn endless_passes_yield_to_the_executor() {
        let mut mixed = mix(vec![("idle", Countdown { left: None })]);
        assert!(mixed.next().now_or_never().is_none());
        assert_eq!(mixed.open_sources(), 1);
    }

    #[tokio::test]
    async fn endless_passes_do_not_block_other_sources() {
        let mixed = mix(vec![
            ("idle", Countdown { left: None }),
            ("busy", Countdown { left: Some(3) }),
        ]);
        let items: Vec<_> = tokio::time::timeout(
            Duration::from_secs(5),
            mixed.take(3).map(|item| item.unwrap()).collect::<Vec<_>>(),
        )
        .await
        .expect("busy source should be drained");
        assert_eq!(items, vec![("busy", 2), ("busy", 1), ("busy", 0)]);
    }

    #[tokio::test]
    async fn silent_source_suspends_the_stream() {
        let quiet = stream::iter(vec![1u8]).chain(stream::pending());
        let mut mixed = mix(vec![("quiet", StreamSource(quiet.boxed()))]);

        assert_eq!(mixed.next().await.unwrap().unwrap(), ("quiet", 1));
        let waited = tokio::time::timeout(Duration::from_millis(20), mixed.next()).await;
        assert!(waited.is_err());
        assert!(!mixed.is_terminated());
    }
}
