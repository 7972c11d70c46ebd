//! Consumer side of the bridge
//!
//! [`EventStream`] is a lazy, cancellable stream fed by an [`Emitter`]. The
//! subscribe action (vendor listener registration) runs on the first poll;
//! dropping the stream runs the teardown the subscribe action registered.
//!
//! Besides the `futures::Stream` implementation, the stream offers a few
//! conveniences for non-async or latency-sensitive consumers: timeouts,
//! non-blocking receive, batching and a blocking iterator.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::FusedStream;
use futures::{Stream, StreamExt};
use tokio::runtime::Handle;
use tokio::time::error::Elapsed;

use crate::config::{Backpressure, BridgeConfig};
use crate::emitter::{Emitter, Shared};
use crate::error::StreamError;

/// Action run on first poll; registers the vendor listener.
pub type SubscribeFn<T, E> = Box<dyn FnOnce(Emitter<T, E>) + Send>;

/// Lazy, cancellable stream over vendor callbacks
///
/// Yields `Ok(element)` for every forwarded callback and at most one
/// `Err(error)`, after which the stream ends.
pub struct EventStream<T, E = StreamError> {
    /// Pending subscribe action, `None` once subscribed
    subscribe: Option<SubscribeFn<T, E>>,

    /// Queue and teardown shared with the emitter
    shared: Arc<Shared<T, E>>,

    /// Whether `None` has been returned
    finished: bool,
}

impl<T, E> EventStream<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create a stream with the given backpressure policy.
    ///
    /// `subscribe` runs once, on the first poll, and must register the vendor
    /// listener and its removal via [`Emitter::set_cancellation`].
    pub fn create<F>(backpressure: Backpressure, subscribe: F) -> Self
    where
        F: FnOnce(Emitter<T, E>) + Send + 'static,
    {
        Self::build(backpressure, false, subscribe)
    }

    /// Create a stream honouring every setting of a bridge configuration,
    /// including re-dispatch onto `observe_on`.
    pub fn from_config<F>(config: &BridgeConfig, subscribe: F) -> Self
    where
        F: FnOnce(Emitter<T, E>) + Send + 'static,
    {
        let stream = Self::build(config.backpressure, config.log_events, subscribe);
        match &config.observe_on {
            Some(handle) => stream.observe_on(handle.clone()),
            None => stream,
        }
    }

    fn build<F>(backpressure: Backpressure, log_events: bool, subscribe: F) -> Self
    where
        F: FnOnce(Emitter<T, E>) + Send + 'static,
    {
        Self {
            subscribe: Some(Box::new(subscribe)),
            shared: Arc::new(Shared::new(backpressure, log_events)),
            finished: false,
        }
    }

    /// Re-dispatch every element onto a task on `handle`, preserving order.
    ///
    /// The upstream listener is attached when the returned stream is first
    /// polled. Dropping the returned stream aborts the forwarding task, which
    /// drops this stream and detaches its listener. If the runtime behind
    /// `handle` shuts down first, the returned stream completes.
    pub fn observe_on(self, handle: Handle) -> EventStream<T, E> {
        let backpressure = self.shared.backpressure();
        let log_events = self.shared.log_events();

        EventStream::build(backpressure, log_events, move |emitter: Emitter<T, E>| {
            let mut forward = ForwardGuard {
                emitter: emitter.clone(),
                finished: false,
            };
            let mut upstream = self;
            let task = handle.spawn(async move {
                while let Some(item) = upstream.next().await {
                    match item {
                        Ok(value) => forward.emitter.on_next(value),
                        Err(error) => {
                            forward.finished = true;
                            forward.emitter.on_error(error);
                            return;
                        }
                    }
                }
                forward.finished = true;
                forward.emitter.on_completed();
            });
            emitter.set_cancellation(move || task.abort());
        })
    }

    /// Keep only elements matching `predicate`.
    ///
    /// Filtering happens on the consumer side; no additional vendor listener
    /// is attached.
    pub fn filter<P>(self, predicate: P) -> FilteredEventStream<T, E>
    where
        P: Fn(&T) -> bool + Send + 'static,
    {
        FilteredEventStream::new(self, predicate)
    }

    /// Wait for the next element, giving up after `timeout`.
    pub async fn next_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Result<T, E>>, Elapsed> {
        tokio::time::timeout(timeout, self.next()).await
    }

    /// Take the next element if one is already queued.
    ///
    /// Returns `None` both when nothing is queued yet and when the stream has
    /// ended; [`is_terminated`](Self::is_terminated) tells the two apart.
    pub fn try_recv(&mut self) -> Option<Result<T, E>> {
        if self.finished {
            return None;
        }
        self.ensure_subscribed();
        match self.shared.try_pop() {
            Some(Some(item)) => Some(item),
            Some(None) => {
                self.finished = true;
                None
            }
            None => None,
        }
    }

    /// Wait for one element, then take whatever else is already queued, up
    /// to `max_count` elements or until `max_wait` has passed.
    pub async fn next_batch(&mut self, max_count: usize, max_wait: Duration) -> Vec<Result<T, E>> {
        let mut batch = Vec::new();
        let start = tokio::time::Instant::now();

        match self.next_timeout(max_wait).await {
            Ok(Some(first)) => batch.push(first),
            _ => return batch,
        }

        while batch.len() < max_count && start.elapsed() < max_wait {
            match self.try_recv() {
                Some(item) => batch.push(item),
                None => break,
            }
        }

        batch
    }
}

impl<T, E> EventStream<T, E> {
    fn ensure_subscribed(&mut self) {
        if let Some(subscribe) = self.subscribe.take() {
            subscribe(Emitter::new(Arc::clone(&self.shared)));
        }
    }

    /// Whether the vendor listener has been registered.
    pub fn is_subscribed(&self) -> bool {
        self.subscribe.is_none()
    }

    /// Whether the stream has ended and every element was consumed.
    pub fn is_terminated(&self) -> bool {
        self.finished || self.shared.is_terminated()
    }

    /// Counters for this stream.
    pub fn stats(&self) -> StreamStats {
        self.shared.stats()
    }

    /// Blocking iterator over the stream, for synchronous consumers.
    ///
    /// Each `next()` parks the calling thread until an element arrives. Do not
    /// use it on a runtime thread that also drives the vendor callbacks.
    pub fn blocking_iter(&mut self) -> BlockingIter<'_, Self> {
        BlockingIter::new(self)
    }
}

impl<T, E> Stream for EventStream<T, E> {
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        this.ensure_subscribed();

        match this.shared.poll_pop(cx) {
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl<T, E> FusedStream for EventStream<T, E> {
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

/// Completes a re-dispatched stream whose forwarding task was dropped before
/// upstream ended
struct ForwardGuard<T, E> {
    emitter: Emitter<T, E>,
    finished: bool,
}

impl<T, E> Drop for ForwardGuard<T, E> {
    fn drop(&mut self) {
        if !self.finished && !self.emitter.is_cancelled() {
            tracing::debug!("Forwarding task dropped before upstream ended, completing stream");
            self.emitter.on_completed();
        }
    }
}

impl<T, E> Drop for EventStream<T, E> {
    fn drop(&mut self) {
        if self.is_subscribed() && !self.shared.is_disposed() {
            tracing::debug!("Event stream dropped by consumer, detaching listener");
        }
        self.shared.dispose();
    }
}

/// Event stream that applies a predicate to elements
///
/// Errors and completion always pass through.
pub struct FilteredEventStream<T, E = StreamError> {
    inner: EventStream<T, E>,
    predicate: Box<dyn Fn(&T) -> bool + Send>,
}

impl<T, E> FilteredEventStream<T, E> {
    fn new<P>(inner: EventStream<T, E>, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + 'static,
    {
        Self {
            inner,
            predicate: Box::new(predicate),
        }
    }

    /// Counters of the underlying stream, before filtering.
    pub fn stats(&self) -> StreamStats {
        self.inner.stats()
    }

    /// Whether the vendor listener has been registered.
    pub fn is_subscribed(&self) -> bool {
        self.inner.is_subscribed()
    }

    /// Blocking iterator over the filtered elements.
    pub fn blocking_iter(&mut self) -> BlockingIter<'_, Self> {
        BlockingIter::new(self)
    }
}

impl<T, E> Stream for FilteredEventStream<T, E> {
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(value))) => {
                    if (this.predicate)(&value) {
                        return Poll::Ready(Some(Ok(value)));
                    }
                    // Element doesn't match filter, continue
                }
                other => return other,
            }
        }
    }
}

impl<T, E> FusedStream for FilteredEventStream<T, E> {
    fn is_terminated(&self) -> bool {
        self.inner.finished
    }
}

/// Blocking iterator over a stream
pub struct BlockingIter<'a, S> {
    stream: &'a mut S,
}

impl<'a, S> BlockingIter<'a, S> {
    fn new(stream: &'a mut S) -> Self {
        Self { stream }
    }
}

impl<'a, S> Iterator for BlockingIter<'a, S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn next(&mut self) -> Option<Self::Item> {
        futures::executor::block_on(self.stream.next())
    }
}

/// Statistics for an event stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Elements accepted from the vendor
    pub events_received: u64,

    /// Elements handed to the consumer
    pub events_delivered: u64,

    /// Elements dropped by the backpressure policy
    pub events_dropped: u64,

    /// Callbacks that arrived after teardown and were ignored
    pub events_discarded: u64,
}

impl StreamStats {
    /// Get the delivery rate (events delivered / events received)
    pub fn delivery_rate(&self) -> f64 {
        if self.events_received == 0 {
            1.0
        } else {
            self.events_delivered as f64 / self.events_received as f64
        }
    }
}

impl fmt::Display for StreamStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Event Stream Stats:")?;
        writeln!(f, "  Events received: {}", self.events_received)?;
        writeln!(f, "  Events delivered: {}", self.events_delivered)?;
        writeln!(f, "  Events dropped: {}", self.events_dropped)?;
        writeln!(f, "  Events discarded: {}", self.events_discarded)?;
        writeln!(f, "  Delivery rate: {:.1}%", self.delivery_rate() * 100.0)?;
        Ok(())
    }
}
