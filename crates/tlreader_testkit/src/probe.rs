//! A scripted liveness probe.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tlreader_core::{ReaderError, ReaderResult, StorageProbe};
use tlreader_storage::StorageError;

/// A probe that replays queued outcomes and can be held mid-probe.
///
/// Share it with an `Arc`: the monitor owns one handle, the test keeps
/// another to script outcomes and read counters.
#[derive(Debug)]
pub struct ScriptedProbe {
    script: Mutex<VecDeque<bool>>,
    default_up: AtomicBool,
    held: Mutex<bool>,
    released: Condvar,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    closes: AtomicUsize,
}

impl ScriptedProbe {
    /// Creates a probe that succeeds until told otherwise.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            default_up: AtomicBool::new(true),
            held: Mutex::new(false),
            released: Condvar::new(),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        })
    }

    /// Queues outcomes; `true` succeeds, `false` fails.
    pub fn push(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.script.lock().extend(outcomes);
    }

    /// Sets the outcome used once the queue is empty.
    pub fn set_default(&self, up: bool) {
        self.default_up.store(up, Ordering::SeqCst);
    }

    /// Makes subsequent probes block until [`ScriptedProbe::release`].
    pub fn hold(&self) {
        *self.held.lock() = true;
    }

    /// Unblocks held probes.
    pub fn release(&self) {
        *self.held.lock() = false;
        self.released.notify_all();
    }

    /// Number of probes started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of probes observed running at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Waits until at least `calls` probes have started.
    pub fn wait_for_calls(&self, calls: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.calls() < calls {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

impl StorageProbe for ScriptedProbe {
    fn probe(&self) -> ReaderResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let up = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_up.load(Ordering::SeqCst));
        {
            let mut held = self.held.lock();
            while *held {
                self.released.wait(&mut held);
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        if up {
            Ok(())
        } else {
            Err(ReaderError::Io(StorageError::Unreachable(
                "scripted probe failure".into(),
            )))
        }
    }

    fn close(&self) -> ReaderResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
