//! Emitter side of an event stream.
//!
//! Vendor listeners hold an [`Emitter`] and push into it from whatever thread
//! the vendor calls them on. Pushing never blocks beyond a short queue lock;
//! the consumer's task is woken and pops the element on its own context.
//!
//! Each stream owns exactly one teardown (the vendor listener removal). It
//! runs once, on whichever comes first: completion, error, or the consumer
//! dropping the stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::task::AtomicWaker;
use parking_lot::Mutex;

use crate::config::Backpressure;
use crate::stream::StreamStats;

type Teardown = Box<dyn FnOnce() + Send>;

enum Terminal<E> {
    Completed,
    /// `None` once the error has been handed to the consumer
    Failed(Option<E>),
}

struct State<T, E> {
    queue: VecDeque<T>,
    terminal: Option<Terminal<E>>,
    stats: StreamStats,
}

/// State shared between the vendor-facing emitter and the consumer's stream.
pub(crate) struct Shared<T, E> {
    state: Mutex<State<T, E>>,
    waker: AtomicWaker,
    teardown: Mutex<Option<Teardown>>,
    disposed: AtomicBool,
    backpressure: Backpressure,
    log_events: bool,
}

impl<T, E> Shared<T, E> {
    pub(crate) fn new(backpressure: Backpressure, log_events: bool) -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                terminal: None,
                stats: StreamStats::default(),
            }),
            waker: AtomicWaker::new(),
            teardown: Mutex::new(None),
            disposed: AtomicBool::new(false),
            backpressure,
            log_events,
        }
    }

    /// Run the teardown if it has not run yet. Later calls are no-ops.
    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let teardown = self.teardown.lock().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    pub(crate) fn backpressure(&self) -> Backpressure {
        self.backpressure
    }

    pub(crate) fn log_events(&self) -> bool {
        self.log_events
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn stats(&self) -> StreamStats {
        self.state.lock().stats.clone()
    }

    pub(crate) fn is_terminated(&self) -> bool {
        let state = self.state.lock();
        state.queue.is_empty() && state.terminal.is_some()
    }

    /// Pop the next element without waiting.
    ///
    /// `None` means nothing is queued yet; `Some(None)` means the stream ended.
    pub(crate) fn try_pop(&self) -> Option<Option<Result<T, E>>> {
        let mut state = self.state.lock();
        if let Some(item) = state.queue.pop_front() {
            state.stats.events_delivered += 1;
            return Some(Some(Ok(item)));
        }
        match state.terminal.as_mut() {
            None => None,
            Some(Terminal::Completed) => Some(None),
            Some(Terminal::Failed(error)) => Some(error.take().map(Err)),
        }
    }

    pub(crate) fn poll_pop(&self, cx: &mut Context<'_>) -> Poll<Option<Result<T, E>>> {
        if let Some(next) = self.try_pop() {
            return Poll::Ready(next);
        }
        self.waker.register(cx.waker());
        // An emit may have landed between the first check and registration.
        match self.try_pop() {
            Some(next) => Poll::Ready(next),
            None => Poll::Pending,
        }
    }
}

/// Push side of an event stream, handed to vendor listeners.
///
/// Cloning is cheap; all clones feed the same stream. Anything emitted after
/// the stream terminated or was dropped is discarded.
pub struct Emitter<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Emitter<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> Emitter<T, E> {
    pub(crate) fn new(shared: Arc<Shared<T, E>>) -> Self {
        Self { shared }
    }

    /// Deliver an element.
    pub fn on_next(&self, value: T) {
        {
            let mut state = self.shared.state.lock();
            if state.terminal.is_some() || self.shared.is_disposed() {
                state.stats.events_discarded += 1;
                tracing::trace!("Discarding element emitted after stream teardown");
                return;
            }

            state.stats.events_received += 1;
            match self.shared.backpressure {
                Backpressure::Buffer => state.queue.push_back(value),
                Backpressure::Latest => {
                    let replaced = state.queue.len() as u64;
                    state.queue.clear();
                    state.queue.push_back(value);
                    state.stats.events_dropped += replaced;
                }
                Backpressure::Bounded(capacity) => {
                    if state.queue.len() >= capacity {
                        state.stats.events_dropped += 1;
                        tracing::warn!(
                            "Stream buffer full ({} elements), dropping newest element",
                            capacity
                        );
                        return;
                    }
                    state.queue.push_back(value);
                }
            }

            if self.shared.log_events {
                tracing::trace!(
                    "Forwarded element, {} queued for consumer",
                    state.queue.len()
                );
            }
        }
        self.shared.waker.wake();
    }

    /// Terminate the stream with an error and detach the vendor listener.
    pub fn on_error(&self, error: E) {
        if !self.terminate(Terminal::Failed(Some(error))) {
            tracing::trace!("Discarding error emitted after stream teardown");
        }
    }

    /// Terminate the stream successfully and detach the vendor listener.
    pub fn on_completed(&self) {
        if !self.terminate(Terminal::Completed) {
            tracing::trace!("Discarding completion emitted after stream teardown");
        }
    }

    /// Register the action that detaches the vendor listener.
    ///
    /// If the stream was already torn down (the vendor called back
    /// synchronously during registration, or the consumer went away), the
    /// action runs immediately.
    pub fn set_cancellation<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let previous = {
            let mut slot = self.shared.teardown.lock();
            if self.shared.is_disposed() {
                drop(slot);
                teardown();
                return;
            }
            slot.replace(Box::new(teardown))
        };
        if let Some(previous) = previous {
            previous();
        }
    }

    /// Whether the consumer is gone or the stream has terminated.
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_disposed()
    }

    fn terminate(&self, terminal: Terminal<E>) -> bool {
        {
            let mut state = self.shared.state.lock();
            if state.terminal.is_some() || self.shared.is_disposed() {
                state.stats.events_discarded += 1;
                return false;
            }
            state.terminal = Some(terminal);
        }
        self.shared.dispose();
        self.shared.waker.wake();
        true
    }
}
