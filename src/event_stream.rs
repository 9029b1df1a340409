use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task;

use async_channel::{Receiver, Sender};
use futures_core::Stream;

/// Sends events from "foreign" callbacks to at most one [`EventStream`].
///
/// Subscribing again replaces the current subscriber: the previous stream ends without running its cancel hook.
pub(crate) struct EventSink<T> {
    inner: Arc<Mutex<SinkState<T>>>,
}

struct SinkState<T> {
    next_token: u64,
    subscriber: Option<Subscriber<T>>,
}

struct Subscriber<T> {
    token: u64,
    sender: Sender<T>,
}

impl<T: Send + 'static> EventSink<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkState {
                next_token: 0,
                subscriber: None,
            })),
        }
    }

    /// Attaches a new subscriber.
    ///
    /// `on_cancel` runs if the returned stream is dropped while it is still the active subscriber, i.e. before the
    /// sink closed it and before another subscriber replaced it.
    pub fn subscribe(&self, on_cancel: impl FnOnce() + Send + 'static) -> EventStream<T> {
        let (sender, receiver) = async_channel::unbounded();
        let mut state = self.inner.lock().unwrap();
        state.next_token += 1;
        let token = state.next_token;
        // dropping the previous sender ends the previous stream
        state.subscriber = Some(Subscriber { token, sender });
        EventStream {
            receiver: Box::pin(receiver),
            cancel: Some(CancelHook {
                sink: Arc::downgrade(&self.inner),
                token,
                on_cancel: Box::new(on_cancel),
            }),
        }
    }

    /// Delivers `value` to the subscriber. Returns `false` if there was nobody to deliver it to.
    pub fn publish(&self, value: T) -> bool {
        let mut state = self.inner.lock().unwrap();
        let Some(subscriber) = &state.subscriber else {
            return false;
        };
        if subscriber.sender.try_send(value).is_ok() {
            true
        } else {
            state.subscriber = None;
            false
        }
    }

    /// Ends the subscriber's stream after any events already queued. Returns `false` if there was no subscriber.
    pub fn close(&self) -> bool {
        self.inner.lock().unwrap().subscriber.take().is_some()
    }

    #[cfg(test)]
    pub fn has_subscriber(&self) -> bool {
        self.inner.lock().unwrap().subscriber.is_some()
    }
}

struct CancelHook<T> {
    sink: Weak<Mutex<SinkState<T>>>,
    token: u64,
    on_cancel: Box<dyn FnOnce() + Send + 'static>,
}

/// A stream of events published by the bridge.
///
/// The stream ends when the producer terminates it (e.g. on disconnect or when discovery finishes). Dropping the
/// stream before that cancels the underlying operation.
pub struct EventStream<T> {
    receiver: Pin<Box<Receiver<T>>>,
    cancel: Option<CancelHook<T>>,
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Option<T>> {
        self.get_mut().receiver.as_mut().poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.receiver.size_hint()
    }
}

impl<T> std::fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").field("queued", &self.receiver.len()).finish()
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        let Some(hook) = self.cancel.take() else {
            return;
        };
        let Some(sink) = hook.sink.upgrade() else {
            return;
        };
        let cancelled = {
            let mut state = sink.lock().unwrap();
            let active = matches!(&state.subscriber, Some(s) if s.token == hook.token);
            if active {
                state.subscriber = None;
            }
            active
        };
        // the sink lock is released before the hook runs; hooks usually call back into the owner of the sink
        if cancelled {
            (hook.on_cancel)();
        }
    }
}
