//! A single-threaded event loop.
//!
//! A [`MainContext`] holds sources: bus watches, idle callbacks and
//! timeouts. [`MainLoop::run`] iterates the context on the calling thread
//! until [`MainLoop::quit`] is called from anywhere. Other threads wake the
//! loop through a `kanal` channel; the loop sleeps in `recv_timeout` until the
//! next timeout is due.
//!
//! ```rust
//! use padflow::mainloop::{MainContext, MainLoop};
//! use std::ops::ControlFlow;
//! use std::time::Duration;
//!
//! let context = MainContext::new();
//! let main_loop = MainLoop::new(&context);
//! let quit = main_loop.clone();
//! context.timeout_add(Duration::from_millis(5), move || {
//!     quit.quit();
//!     ControlFlow::Break(())
//! });
//! main_loop.run();
//! ```

use crate::bus::{Bus, Message};
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::trace;

pub(crate) type WatchHandler = Box<dyn FnMut(&Bus, &Message) -> ControlFlow<()> + Send>;
type Callback = Box<dyn FnMut() -> ControlFlow<()> + Send>;

/// Identifies a source attached to a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

enum SourceKind {
    BusWatch { bus: Bus, handler: WatchHandler },
    Idle(Callback),
    Timeout {
        interval: Duration,
        deadline: Instant,
        callback: Callback,
    },
}

struct Source {
    id: SourceId,
    kind: SourceKind,
}

enum Wakeup {
    Wake,
}

#[derive(Default)]
struct Sources {
    active: Vec<Source>,
    dispatching: HashSet<SourceId>,
    removed: HashSet<SourceId>,
}

impl Sources {
    fn is_removed(&self, id: SourceId) -> bool {
        self.removed.contains(&id)
    }
}

struct ContextInner {
    tx: kanal::Sender<Wakeup>,
    rx: kanal::Receiver<Wakeup>,
    sources: Mutex<Sources>,
    next_id: AtomicU64,
}

/// Set of sources dispatched by a main loop. Clones share the same context.
#[derive(Clone)]
pub struct MainContext(Arc<ContextInner>);

impl Default for MainContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MainContext {
    /// Create an empty context.
    pub fn new() -> Self {
        let (tx, rx) = kanal::unbounded();
        Self(Arc::new(ContextInner {
            tx,
            rx,
            sources: Mutex::new(Sources::default()),
            next_id: AtomicU64::new(1),
        }))
    }

    /// Wake the thread iterating this context.
    pub fn wakeup(&self) {
        let _ = self.0.tx.send(Wakeup::Wake);
    }

    fn attach(&self, kind: SourceKind) -> SourceId {
        let id = SourceId(self.0.next_id.fetch_add(1, Ordering::Relaxed));
        self.0.sources.lock().unwrap().active.push(Source { id, kind });
        self.wakeup();
        id
    }

    pub(crate) fn add_bus_watch(&self, bus: Bus, handler: WatchHandler) -> SourceId {
        self.attach(SourceKind::BusWatch { bus, handler })
    }

    /// Call `f` on every iteration until it returns `Break`.
    pub fn idle_add<F>(&self, f: F) -> SourceId
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        self.attach(SourceKind::Idle(Box::new(f)))
    }

    /// Call `f` every `interval` until it returns `Break`.
    pub fn timeout_add<F>(&self, interval: Duration, f: F) -> SourceId
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        self.attach(SourceKind::Timeout {
            interval,
            deadline: Instant::now() + interval,
            callback: Box::new(f),
        })
    }

    /// Run `f` once on the loop thread.
    pub fn invoke<F>(&self, f: F) -> SourceId
    where
        F: FnOnce() + Send + 'static,
    {
        let mut f = Some(f);
        self.idle_add(move || {
            if let Some(f) = f.take() {
                f();
            }
            ControlFlow::Break(())
        })
    }

    /// Remove a source. Safe to call from inside a handler; the source is
    /// not called again once this returns.
    ///
    /// Returns false when `id` is not attached.
    pub fn remove(&self, id: SourceId) -> bool {
        let mut sources = self.0.sources.lock().unwrap();
        let before = sources.active.len();
        sources.active.retain(|s| s.id != id);
        if sources.active.len() != before {
            return true;
        }
        sources.dispatching.contains(&id) && sources.removed.insert(id)
    }

    /// Dispatch ready sources once. With `may_block`, sleep until something
    /// is ready first. Returns whether anything was dispatched.
    pub fn iteration(&self, may_block: bool) -> bool {
        let mut dispatched = self.dispatch();
        if !dispatched && may_block {
            self.wait();
            dispatched = self.dispatch();
        }
        dispatched
    }

    fn dispatch(&self) -> bool {
        let mut taken = {
            let mut sources = self.0.sources.lock().unwrap();
            let taken = std::mem::take(&mut sources.active);
            sources.dispatching = taken.iter().map(|s| s.id).collect();
            taken
        };
        let now = Instant::now();
        let mut dispatched = false;
        let is_removed = |id: SourceId| self.0.sources.lock().unwrap().is_removed(id);

        taken.retain_mut(|source| {
            if is_removed(source.id) {
                return false;
            }
            match &mut source.kind {
                SourceKind::BusWatch { bus, handler } => {
                    // Removal from inside the handler stops delivery at once.
                    while !is_removed(source.id) {
                        let Some(message) = bus.pop() else {
                            break;
                        };
                        dispatched = true;
                        trace!(seqnum = message.seqnum(), "dispatching bus message");
                        if handler(bus, &message).is_break() {
                            bus.clear_watch(source.id);
                            return false;
                        }
                    }
                    true
                }
                SourceKind::Idle(callback) => {
                    dispatched = true;
                    callback().is_continue()
                }
                SourceKind::Timeout {
                    interval,
                    deadline,
                    callback,
                } => {
                    if now < *deadline {
                        return true;
                    }
                    dispatched = true;
                    *deadline = now + *interval;
                    callback().is_continue()
                }
            }
        });

        let mut sources = self.0.sources.lock().unwrap();
        sources.dispatching.clear();
        let removed = std::mem::take(&mut sources.removed);
        taken.retain(|s| !removed.contains(&s.id));
        // Sources attached during dispatch go after the existing ones.
        taken.append(&mut sources.active);
        sources.active = taken;
        dispatched
    }

    fn wait(&self) {
        let timeout = {
            let sources = self.0.sources.lock().unwrap();
            if sources
                .active
                .iter()
                .any(|s| matches!(s.kind, SourceKind::Idle(_)))
            {
                return;
            }
            sources
                .active
                .iter()
                .filter_map(|s| match &s.kind {
                    SourceKind::Timeout { deadline, .. } => Some(*deadline),
                    _ => None,
                })
                .min()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
        };
        let _ = match timeout {
            Some(timeout) => self.0.rx.recv_timeout(timeout).ok(),
            None => self.0.rx.recv().ok(),
        };
        while let Ok(Some(_)) = self.0.rx.try_recv() {}
    }
}

/// Runs a context until told to quit.
#[derive(Clone)]
pub struct MainLoop {
    context: MainContext,
    running: Arc<AtomicBool>,
}

impl MainLoop {
    /// Create a loop over `context`.
    pub fn new(context: &MainContext) -> Self {
        Self {
            context: context.clone(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The loop's context.
    pub fn context(&self) -> &MainContext {
        &self.context
    }

    /// Iterate the context on this thread until [`quit`](Self::quit).
    pub fn run(&self) {
        self.running.store(true, Ordering::Release);
        while self.running.load(Ordering::Acquire) {
            self.context.iteration(true);
        }
    }

    /// Stop [`run`](Self::run). May be called from any thread.
    pub fn quit(&self) {
        self.running.store(false, Ordering::Release);
        self.context.wakeup();
    }

    /// Whether the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::Structure;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_idle_runs_until_break() {
        let context = MainContext::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        context.idle_add(move || {
            if c.fetch_add(1, Ordering::SeqCst) == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        for _ in 0..5 {
            context.iteration(false);
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_invoke_runs_once() {
        let context = MainContext::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        context.invoke(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        for _ in 0..3 {
            context.iteration(false);
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bus_watch_dispatch_and_removal() {
        let context = MainContext::new();
        let bus = Bus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let guard = bus
            .add_watch(&context, move |_, msg| {
                s.lock().unwrap().push(msg.seqnum());
                ControlFlow::Continue(())
            })
            .unwrap();
        assert!(bus.add_watch(&context, |_, _| ControlFlow::Continue(())).is_err());

        bus.post(Message::application(Structure::new("one")));
        bus.post(Message::application(Structure::new("two")));
        assert!(context.iteration(true));
        assert_eq!(seen.lock().unwrap().len(), 2);

        drop(guard);
        bus.post(Message::application(Structure::new("three")));
        assert!(!context.iteration(false));
        assert!(bus.have_pending());
        assert!(bus.add_watch(&context, |_, _| ControlFlow::Break(())).is_ok());
    }

    #[test]
    fn test_guard_dropped_in_handler_stops_delivery() {
        let context = MainContext::new();
        let bus = Bus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<crate::bus::BusWatchGuard>>> = Arc::default();

        let c = calls.clone();
        let own_guard = slot.clone();
        let guard = bus
            .add_watch(&context, move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
                own_guard.lock().unwrap().take();
                ControlFlow::Continue(())
            })
            .unwrap();
        *slot.lock().unwrap() = Some(guard);

        for name in ["one", "two", "three"] {
            bus.post(Message::application(Structure::new(name)));
        }
        context.iteration(false);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.pending(), 2);
        context.iteration(false);
        assert_eq!(bus.pending(), 2);
    }

    #[test]
    fn test_remove_reports_unknown_ids() {
        let context = MainContext::new();
        let id = context.idle_add(|| ControlFlow::Continue(()));
        assert!(context.remove(id));
        assert!(!context.remove(id));

        // A source removing itself while it runs.
        let inner = context.clone();
        let own_id = Arc::new(Mutex::new(None));
        let seen = own_id.clone();
        let results = Arc::new(Mutex::new(Vec::new()));
        let r = results.clone();
        let id = context.idle_add(move || {
            let id = seen.lock().unwrap().expect("id stored before dispatch");
            r.lock().unwrap().push(inner.remove(id));
            r.lock().unwrap().push(inner.remove(id));
            ControlFlow::Continue(())
        });
        *own_id.lock().unwrap() = Some(id);
        context.iteration(false);
        context.iteration(false);
        assert_eq!(*results.lock().unwrap(), [true, false]);
    }

    #[test]
    fn test_quit_from_other_thread() {
        let context = MainContext::new();
        let main_loop = MainLoop::new(&context);
        let remote = main_loop.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            remote.quit();
        });
        main_loop.run();
        assert!(!main_loop.is_running());
        handle.join().unwrap();
    }
}
