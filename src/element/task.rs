//! Streaming threads owned by elements.

use std::io;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// A worker thread that can be started and joined repeatedly.
#[derive(Default)]
pub(crate) struct Task {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Task {
    /// Spawn `body` on a thread named `name`. A previous run must have been
    /// joined.
    pub(crate) fn start<F>(&self, name: &str, body: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.handle.lock().unwrap();
        if slot.is_some() {
            return Err(io::Error::other(format!("task {name} already running")));
        }
        let handle = thread::Builder::new().name(name.to_string()).spawn(body)?;
        debug!(task = name, "task started");
        *slot = Some(handle);
        Ok(())
    }

    /// Wait for the thread to exit. Joining from the task's own thread only
    /// detaches it.
    pub(crate) fn join(&self) {
        let Some(handle) = self.handle.lock().unwrap().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        let name = handle.thread().name().unwrap_or("unnamed").to_string();
        if handle.join().is_err() {
            warn!(task = %name, "task panicked");
        } else {
            debug!(task = %name, "task joined");
        }
    }

    pub(crate) fn is_started(&self) -> bool {
        self.handle.lock().unwrap().is_some()
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_start_join_restart() {
        let task = Task::default();
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let r = runs.clone();
            task.start("test-task", move || {
                r.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
            assert!(task.is_started());
            task.join();
            assert!(!task.is_started());
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_double_start_rejected() {
        let task = Task::default();
        let (tx, rx) = kanal::bounded::<()>(0);
        task.start("busy", move || {
            let _ = rx.recv();
        })
        .unwrap();
        assert!(task.start("busy", || {}).is_err());
        drop(tx);
        task.join();
    }
}
