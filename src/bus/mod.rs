//! The message bus.
//!
//! Elements post messages from any thread; the application reads them on its
//! own. Posting never blocks. Messages are delivered in the order they were
//! posted, each exactly once, through one of three consumers:
//!
//! - blocking pops ([`Bus::timed_pop_filtered`] and friends),
//! - a watch dispatched by a [`MainLoop`](crate::mainloop::MainLoop),
//! - an async [`Stream`](futures::Stream) from [`Bus::stream`].
//!
//! ```rust
//! use padflow::bus::{Bus, Message, MessageType};
//! use padflow::caps::Structure;
//! use padflow::clock::ClockTime;
//!
//! let bus = Bus::new();
//! bus.post(Message::application(Structure::new("hello")));
//! let msg = bus
//!     .timed_pop_filtered(Some(ClockTime::ZERO), MessageType::APPLICATION)
//!     .unwrap();
//! assert_eq!(msg.type_(), MessageType::APPLICATION);
//! ```

mod message;

pub use message::{Message, MessageType, MessageView};

use crate::clock::ClockTime;
use crate::error::{Error, Result};
use crate::mainloop::{MainContext, SourceId};
use crate::observability::record_bus_message;
use futures::Stream;
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};
use tracing::trace;

struct WatchSlot {
    context: MainContext,
    source: SourceId,
}

#[derive(Default)]
struct BusState {
    queue: VecDeque<Message>,
    flushing: bool,
    watch: Option<WatchSlot>,
    wakers: Vec<Waker>,
}

struct BusInner {
    state: Mutex<BusState>,
    cond: Condvar,
}

/// A multi-producer message queue. Clones share the same queue.
#[derive(Clone)]
pub struct Bus(Arc<BusInner>);

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.0.state.lock().unwrap();
        f.debug_struct("Bus")
            .field("pending", &st.queue.len())
            .field("flushing", &st.flushing)
            .finish()
    }
}

impl Bus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self(Arc::new(BusInner {
            state: Mutex::new(BusState::default()),
            cond: Condvar::new(),
        }))
    }

    /// Post a message. Returns false when the bus is flushing.
    pub fn post(&self, message: Message) -> bool {
        let (wakers, context) = {
            let mut st = self.0.state.lock().unwrap();
            if st.flushing {
                trace!(message = %message, "bus flushing, message dropped");
                return false;
            }
            record_bus_message(message.type_().name());
            trace!(seqnum = message.seqnum(), kind = message.type_().name(), src = ?message.src_name(), "post");
            st.queue.push_back(message);
            (
                std::mem::take(&mut st.wakers),
                st.watch.as_ref().map(|w| w.context.clone()),
            )
        };
        self.0.cond.notify_all();
        for waker in wakers {
            waker.wake();
        }
        if let Some(context) = context {
            context.wakeup();
        }
        true
    }

    /// Take the oldest message without waiting.
    pub fn pop(&self) -> Option<Message> {
        self.0.state.lock().unwrap().queue.pop_front()
    }

    /// Take the oldest message of one of `types`, dropping older messages of
    /// other types, without waiting.
    pub fn pop_filtered(&self, types: MessageType) -> Option<Message> {
        self.timed_pop_filtered(Some(ClockTime::ZERO), types)
    }

    /// Take the oldest message, waiting up to `timeout` (forever when
    /// `None`).
    pub fn timed_pop(&self, timeout: Option<ClockTime>) -> Option<Message> {
        self.timed_pop_filtered(timeout, MessageType::ANY)
    }

    /// Wait up to `timeout` (forever when `None`) for a message of one of
    /// `types`. Messages of other types are dropped.
    ///
    /// Returns `None` on timeout and when the bus is set flushing.
    pub fn timed_pop_filtered(
        &self,
        timeout: Option<ClockTime>,
        types: MessageType,
    ) -> Option<Message> {
        let deadline = timeout.map(|t| Instant::now() + Duration::from(t));
        let mut st = self.0.state.lock().unwrap();
        loop {
            while let Some(message) = st.queue.pop_front() {
                if types.contains(message.type_()) {
                    return Some(message);
                }
                trace!(kind = message.type_().name(), "dropping unfiltered message");
            }
            if st.flushing {
                return None;
            }
            st = match deadline {
                None => self.0.cond.wait(st).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.0.cond.wait_timeout(st, deadline - now).unwrap().0
                }
            };
        }
    }

    /// Whether messages are waiting.
    pub fn have_pending(&self) -> bool {
        !self.0.state.lock().unwrap().queue.is_empty()
    }

    /// Number of waiting messages.
    pub fn pending(&self) -> usize {
        self.0.state.lock().unwrap().queue.len()
    }

    /// While flushing, pending messages are dropped, posts are rejected and
    /// blocked pops return `None`.
    pub fn set_flushing(&self, flushing: bool) {
        let wakers = {
            let mut st = self.0.state.lock().unwrap();
            st.flushing = flushing;
            if flushing {
                st.queue.clear();
            }
            std::mem::take(&mut st.wakers)
        };
        self.0.cond.notify_all();
        for waker in wakers {
            waker.wake();
        }
    }

    /// Dispatch messages to `handler` from `context`'s main loop.
    ///
    /// The handler runs on the thread iterating the context. Returning
    /// `ControlFlow::Break` removes the watch; so does dropping the guard.
    /// A bus has at most one watch.
    pub fn add_watch<F>(&self, context: &MainContext, handler: F) -> Result<BusWatchGuard>
    where
        F: FnMut(&Bus, &Message) -> ControlFlow<()> + Send + 'static,
    {
        let mut st = self.0.state.lock().unwrap();
        if st.watch.is_some() {
            return Err(Error::Element("bus already has a watch".into()));
        }
        let source = context.add_bus_watch(self.clone(), Box::new(handler));
        st.watch = Some(WatchSlot {
            context: context.clone(),
            source,
        });
        let pending = !st.queue.is_empty();
        drop(st);
        if pending {
            context.wakeup();
        }
        Ok(BusWatchGuard {
            bus: self.clone(),
            context: context.clone(),
            source,
        })
    }

    pub(crate) fn clear_watch(&self, source: SourceId) {
        let mut st = self.0.state.lock().unwrap();
        if st.watch.as_ref().is_some_and(|w| w.source == source) {
            st.watch = None;
        }
    }

    /// Messages as an async stream. The stream never ends; combine it with a
    /// condition on the messages (EOS, error) to stop.
    pub fn stream(&self) -> BusStream {
        BusStream { bus: self.clone() }
    }
}

/// Removes a bus watch when dropped.
#[must_use = "the watch is removed when the guard is dropped"]
pub struct BusWatchGuard {
    bus: Bus,
    context: MainContext,
    source: SourceId,
}

impl Drop for BusWatchGuard {
    fn drop(&mut self) {
        self.context.remove(self.source);
        self.bus.clear_watch(self.source);
    }
}

/// Stream of bus messages; see [`Bus::stream`].
pub struct BusStream {
    bus: Bus,
}

impl Stream for BusStream {
    type Item = Message;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        let mut st = self.bus.0.state.lock().unwrap();
        if let Some(message) = st.queue.pop_front() {
            return Poll::Ready(Some(message));
        }
        if !st.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            st.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
