//! Delayed, batched pong sequence served by the ping endpoint.

use crate::domain::model::{Pong, PongBatch, Signal};
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

pub const BATCH_SIZE: usize = 2;

pub type BatchStream = Finally<Pin<Box<dyn Stream<Item = PongBatch> + Send>>>;

/// 產生 1..=times 的序列，每個元素發出前先等待 `delay`
///
/// The stream is lazy: nothing is scheduled until it is polled, and the
/// delays are sequential, so element `n` is ready at roughly `n * delay`.
pub fn delayed_sequence(times: u64, delay: Duration) -> impl Stream<Item = u64> + Send {
    stream::iter(1..=times).then(move |n| async move {
        tokio::time::sleep(delay).await;
        n
    })
}

/// The full endpoint pipeline: delayed numbers, mapped to pongs, grouped in
/// batches of [`BATCH_SIZE`], logging the terminal signal once.
pub fn pong_batches(times: u64, delay: Duration) -> BatchStream {
    let batches: Pin<Box<dyn Stream<Item = PongBatch> + Send>> = Box::pin(
        delayed_sequence(times, delay)
            .map(|n| {
                tracing::warn!("creating Pong {}", n);
                Pong::numbered(n)
            })
            .chunks(BATCH_SIZE),
    );

    batches.do_finally(|signal| tracing::info!("End {}", signal))
}

type FinallyHook = Box<dyn FnOnce(Signal) + Send>;

/// Runs a hook exactly once when the inner stream ends ([`Signal::Complete`])
/// or is dropped before ending ([`Signal::Cancel`]).
pub struct Finally<S> {
    inner: S,
    hook: Option<FinallyHook>,
}

impl<S> Finally<S> {
    pub fn new<F>(inner: S, hook: F) -> Self
    where
        F: FnOnce(Signal) + Send + 'static,
    {
        Self {
            inner,
            hook: Some(Box::new(hook)),
        }
    }

    fn fire(&mut self, signal: Signal) {
        if let Some(hook) = self.hook.take() {
            hook(signal);
        }
    }
}

impl<S: Stream + Unpin> Stream for Finally<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(None) => {
                this.fire(Signal::Complete);
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S> Drop for Finally<S> {
    fn drop(&mut self) {
        self.fire(Signal::Cancel);
    }
}

pub trait FinallyExt: Stream + Sized {
    fn do_finally<F>(self, hook: F) -> Finally<Self>
    where
        F: FnOnce(Signal) + Send + 'static,
    {
        Finally::new(self, hook)
    }
}

impl<S: Stream> FinallyExt for S {}
