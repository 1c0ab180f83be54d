//! Background liveness monitoring.
//!
//! A [`LivenessMonitor`] owns one [`StorageProbe`] and a cached verdict. A
//! dedicated thread runs the probe immediately on start and then at a fixed
//! rate; the outcome of each probe replaces the verdict with a single atomic
//! store. Foreground callers consult the verdict with
//! [`LivenessMonitor::check_storage_is_up`], which is one atomic load.
//!
//! ## Guarantees
//!
//! - At most one probe runs at a time. A cycle that finds another probe in
//!   flight is skipped, never queued.
//! - A probe that overruns its interval causes the missed ticks to be
//!   skipped, so a hung backend never produces a burst of catch-up probes.
//! - Probe errors and panics never escape the worker; they become a `down`
//!   verdict.
//! - After [`LivenessMonitor::stop`] returns, no probe runs, the verdict is
//!   never written again, and the probe has been closed exactly once.

use crate::error::{ReaderError, ReaderResult};
use crate::probe::StorageProbe;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tlreader_storage::StorageError;
use tracing::{debug, info, warn};

/// Label used when none is given.
pub const DEFAULT_STORAGE_LABEL: &str = "storage";

/// Name of the probe thread.
pub const MONITOR_THREAD_NAME: &str = "storage-monitor";

/// Result of one probe cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The probe succeeded; the verdict is now up.
    Up,
    /// The probe failed; the verdict is now down.
    Down,
    /// No probe ran: another was in flight or the monitor is stopped.
    Skipped,
}

/// Counters describing the monitor's history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Probes that completed.
    pub probes_run: u64,
    /// Completed probes that failed.
    pub probes_failed: u64,
    /// Cycles or ticks that did not run a probe.
    pub probes_skipped: u64,
    /// Failures since the last success.
    pub consecutive_failures: u64,
    /// Completion time of the last probe.
    pub last_probe: Option<SystemTime>,
    /// Message of the last failure, cleared on success.
    pub last_error: Option<String>,
}

struct Shared {
    label: String,
    probe: Box<dyn StorageProbe>,
    storage_down: AtomicBool,
    probe_in_flight: AtomicBool,
    retired: AtomicBool,
    stopped: AtomicBool,
    probe_closed: AtomicBool,
    stats: Mutex<MonitorStats>,
}

impl Shared {
    fn run_cycle(&self) -> ProbeOutcome {
        if self.stopped.load(Ordering::Acquire) {
            return ProbeOutcome::Skipped;
        }
        if self
            .probe_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.stats.lock().probes_skipped += 1;
            debug!(storage = %self.label, "probe already in flight, skipping");
            return ProbeOutcome::Skipped;
        }

        let failure = match panic::catch_unwind(AssertUnwindSafe(|| self.probe.probe())) {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(payload) => Some(format!("probe panicked: {}", panic_message(payload.as_ref()))),
        };
        let was_down = self.storage_down.swap(failure.is_some(), Ordering::AcqRel);

        let outcome = {
            let mut stats = self.stats.lock();
            stats.probes_run += 1;
            stats.last_probe = Some(SystemTime::now());
            match failure {
                None => {
                    stats.consecutive_failures = 0;
                    stats.last_error = None;
                    ProbeOutcome::Up
                }
                Some(error) => {
                    stats.probes_failed += 1;
                    stats.consecutive_failures += 1;
                    warn!(
                        storage = %self.label,
                        consecutive_failures = stats.consecutive_failures,
                        error = %error,
                        "storage probe failed"
                    );
                    stats.last_error = Some(error);
                    ProbeOutcome::Down
                }
            }
        };

        match (was_down, outcome) {
            (true, ProbeOutcome::Up) => info!(storage = %self.label, "storage is up again"),
            (false, ProbeOutcome::Down) => warn!(storage = %self.label, "storage is down"),
            _ => debug!(storage = %self.label, ?outcome, "storage probe finished"),
        }

        self.probe_in_flight.store(false, Ordering::Release);
        outcome
    }

    /// Takes the in-flight flag for good, waiting out a running probe.
    fn retire_probe(&self) {
        while self
            .probe_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            thread::sleep(Duration::from_millis(1));
        }
        self.retired.store(true, Ordering::Release);
    }
}

struct Worker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodically probes storage and caches whether it is reachable.
///
/// The verdict starts as up, so reads are admitted until the first probe
/// says otherwise.
pub struct LivenessMonitor {
    shared: Arc<Shared>,
    interval: Duration,
    worker: Mutex<Option<Worker>>,
}

impl LivenessMonitor {
    /// Creates a monitor labelled [`DEFAULT_STORAGE_LABEL`].
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::InvalidConfig`] if `interval` is zero.
    pub fn new(probe: Box<dyn StorageProbe>, interval: Duration) -> ReaderResult<Self> {
        Self::with_label(probe, interval, DEFAULT_STORAGE_LABEL)
    }

    /// Creates a monitor whose errors and logs name the storage `label`.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::InvalidConfig`] if `interval` is zero.
    pub fn with_label(
        probe: Box<dyn StorageProbe>,
        interval: Duration,
        label: impl Into<String>,
    ) -> ReaderResult<Self> {
        if interval.is_zero() {
            return Err(ReaderError::InvalidConfig(
                "monitor interval must be positive".into(),
            ));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                label: label.into(),
                probe,
                storage_down: AtomicBool::new(false),
                probe_in_flight: AtomicBool::new(false),
                retired: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                probe_closed: AtomicBool::new(false),
                stats: Mutex::new(MonitorStats::default()),
            }),
            interval,
            worker: Mutex::new(None),
        })
    }

    /// Starts the probe thread. The first probe runs immediately.
    ///
    /// Calling `start` on a running monitor does nothing.
    ///
    /// # Errors
    ///
    /// - [`ReaderError::IllegalState`] if the monitor was stopped
    /// - [`ReaderError::Io`] if the thread cannot be spawned
    pub fn start(&self) -> ReaderResult<()> {
        let mut worker = self.worker.lock();
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(ReaderError::IllegalState {
                operation: "start monitor",
                state: "stopped".into(),
            });
        }
        if worker.is_some() {
            debug!(storage = %self.shared.label, "monitor already running");
            return Ok(());
        }

        let (shutdown, signal) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name(MONITOR_THREAD_NAME.into())
            .spawn(move || {
                let mut next_tick = Instant::now();
                loop {
                    shared.run_cycle();
                    next_tick += interval;
                    let mut missed = 0;
                    while next_tick <= Instant::now() {
                        next_tick += interval;
                        missed += 1;
                    }
                    if missed > 0 {
                        shared.stats.lock().probes_skipped += missed;
                        debug!(storage = %shared.label, missed, "probe overran its interval");
                    }
                    match signal.recv_timeout(next_tick.saturating_duration_since(Instant::now())) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(StorageError::from)?;

        info!(
            storage = %self.shared.label,
            interval_ms = self.interval.as_millis() as u64,
            "storage monitor started"
        );
        *worker = Some(Worker { shutdown, handle });
        Ok(())
    }

    /// Stops the probe thread and closes the probe.
    ///
    /// Waits for an in-flight probe to finish. Safe to call before
    /// [`LivenessMonitor::start`] and more than once.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            // The worker also exits if the sender is dropped.
            let _ = worker.shutdown.send(());
            if worker.handle.join().is_err() {
                warn!(storage = %self.shared.label, "monitor thread panicked");
            }
        }

        if self.shared.probe_closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.retire_probe();
        if let Err(e) = self.shared.probe.close() {
            warn!(storage = %self.shared.label, error = %e, "failed to close probe");
        }
        info!(storage = %self.shared.label, "storage monitor stopped");
    }

    /// Runs one probe cycle on the calling thread.
    ///
    /// This is the cycle the probe thread runs on every tick.
    pub fn run_probe_cycle(&self) -> ProbeOutcome {
        self.shared.run_cycle()
    }

    /// Fails fast if the last probe found storage down.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::StorageUnavailable`] while the verdict is down.
    pub fn check_storage_is_up(&self) -> ReaderResult<()> {
        if self.shared.storage_down.load(Ordering::Acquire) {
            return Err(ReaderError::StorageUnavailable {
                storage: self.shared.label.clone(),
                cause: format!("{} is down", self.shared.label),
            });
        }
        Ok(())
    }

    /// Returns the cached verdict.
    pub fn is_storage_up(&self) -> bool {
        !self.shared.storage_down.load(Ordering::Acquire)
    }

    /// Returns true while a probe is in flight.
    pub fn is_probing(&self) -> bool {
        self.shared.probe_in_flight.load(Ordering::Acquire)
            && !self.shared.retired.load(Ordering::Acquire)
    }

    /// Returns a snapshot of the monitor's counters.
    pub fn stats(&self) -> MonitorStats {
        self.shared.stats.lock().clone()
    }

    /// Storage label.
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Probe interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true while the probe thread is running.
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for LivenessMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessMonitor")
            .field("label", &self.shared.label)
            .field("interval", &self.interval)
            .field("storage_up", &self.is_storage_up())
            .field("running", &self.is_running())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::Receiver;

    #[derive(Default)]
    struct Switch {
        fail: AtomicBool,
        panic: AtomicBool,
        calls: AtomicUsize,
        closes: AtomicUsize,
    }

    struct SwitchProbe(Arc<Switch>);

    impl StorageProbe for SwitchProbe {
        fn probe(&self) -> ReaderResult<()> {
            self.0.calls.fetch_add(1, Ordering::SeqCst);
            if self.0.panic.load(Ordering::SeqCst) {
                panic!("backend exploded");
            }
            if self.0.fail.load(Ordering::SeqCst) {
                return Err(ReaderError::Io(StorageError::Unreachable("down".into())));
            }
            Ok(())
        }

        fn close(&self) -> ReaderResult<()> {
            self.0.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn monitor(interval: Duration) -> (LivenessMonitor, Arc<Switch>) {
        let switch = Arc::new(Switch::default());
        let monitor =
            LivenessMonitor::new(Box::new(SwitchProbe(switch.clone())), interval).unwrap();
        (monitor, switch)
    }

    /// Blocks inside `probe` until released.
    struct GateProbe {
        entered: Mutex<Sender<()>>,
        release: Mutex<Receiver<()>>,
    }

    impl StorageProbe for GateProbe {
        fn probe(&self) -> ReaderResult<()> {
            let _ = self.entered.lock().send(());
            let _ = self.release.lock().recv();
            Ok(())
        }

        fn close(&self) -> ReaderResult<()> {
            Ok(())
        }
    }

    #[test]
    fn zero_interval_is_rejected() {
        let result = LivenessMonitor::new(
            Box::new(SwitchProbe(Arc::default())),
            Duration::ZERO,
        );
        assert!(matches!(result, Err(ReaderError::InvalidConfig(_))));
    }

    #[test]
    fn verdict_starts_up() {
        let (monitor, switch) = monitor(Duration::from_secs(60));
        assert!(monitor.is_storage_up());
        monitor.check_storage_is_up().unwrap();
        assert_eq!(switch.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn verdict_follows_last_probe() {
        let (monitor, switch) = monitor(Duration::from_secs(60));
        switch.fail.store(true, Ordering::SeqCst);
        assert_eq!(monitor.run_probe_cycle(), ProbeOutcome::Down);
        let err = monitor.check_storage_is_up().unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(err.to_string(), "storage unavailable: storage is down");

        switch.fail.store(false, Ordering::SeqCst);
        assert_eq!(monitor.run_probe_cycle(), ProbeOutcome::Up);
        monitor.check_storage_is_up().unwrap();

        let stats = monitor.stats();
        assert_eq!(stats.probes_run, 2);
        assert_eq!(stats.probes_failed, 1);
        assert_eq!(stats.consecutive_failures, 0);
        assert!(stats.last_error.is_none());
    }

    #[test]
    fn panicking_probe_means_down() {
        let (monitor, switch) = monitor(Duration::from_secs(60));
        switch.panic.store(true, Ordering::SeqCst);
        assert_eq!(monitor.run_probe_cycle(), ProbeOutcome::Down);
        assert!(!monitor.is_storage_up());
        let error = monitor.stats().last_error.unwrap();
        assert!(error.contains("backend exploded"), "{error}");

        // The in-flight flag was released despite the panic
        switch.panic.store(false, Ordering::SeqCst);
        assert_eq!(monitor.run_probe_cycle(), ProbeOutcome::Up);
    }

    #[test]
    fn concurrent_cycle_is_skipped() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let monitor = Arc::new(
            LivenessMonitor::new(
                Box::new(GateProbe {
                    entered: Mutex::new(entered_tx),
                    release: Mutex::new(release_rx),
                }),
                Duration::from_secs(60),
            )
            .unwrap(),
        );

        let background = {
            let monitor = Arc::clone(&monitor);
            thread::spawn(move || monitor.run_probe_cycle())
        };
        entered_rx.recv().unwrap();
        assert_eq!(monitor.run_probe_cycle(), ProbeOutcome::Skipped);
        release_tx.send(()).unwrap();
        assert_eq!(background.join().unwrap(), ProbeOutcome::Up);
        assert_eq!(monitor.stats().probes_skipped, 1);
        assert_eq!(monitor.stats().probes_run, 1);
    }

    #[test]
    fn start_probes_immediately_and_is_idempotent() {
        let (monitor, switch) = monitor(Duration::from_secs(3600));
        switch.fail.store(true, Ordering::SeqCst);
        monitor.start().unwrap();
        monitor.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while monitor.is_storage_up() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!monitor.is_storage_up());
        monitor.stop();
        assert_eq!(switch.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_closes_probe_once() {
        let (monitor, switch) = monitor(Duration::from_millis(10));
        monitor.stop();
        monitor.start().unwrap_err();
        monitor.stop();
        drop(monitor);
        assert_eq!(switch.closes.load(Ordering::SeqCst), 1);
        assert_eq!(switch.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn no_probe_after_stop() {
        let (monitor, switch) = monitor(Duration::from_millis(5));
        monitor.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        monitor.stop();
        assert!(!monitor.is_running());

        let calls = switch.calls.load(Ordering::SeqCst);
        assert!(calls >= 1);
        assert_eq!(monitor.run_probe_cycle(), ProbeOutcome::Skipped);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(switch.calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn stopped_monitor_is_not_probing() {
        let (monitor, _switch) = monitor(Duration::from_secs(60));
        assert_eq!(monitor.run_probe_cycle(), ProbeOutcome::Up);
        assert!(!monitor.is_probing());
        monitor.stop();
        assert!(!monitor.is_probing());
        assert_eq!(monitor.run_probe_cycle(), ProbeOutcome::Skipped);
        assert!(!monitor.is_probing());
    }

    #[test]
    fn probe_thread_is_named() {
        struct NameProbe(Mutex<Option<String>>);
        impl StorageProbe for NameProbe {
            fn probe(&self) -> ReaderResult<()> {
                *self.0.lock() = thread::current().name().map(str::to_string);
                Ok(())
            }
            fn close(&self) -> ReaderResult<()> {
                Ok(())
            }
        }

        let probe = Arc::new(NameProbe(Mutex::new(None)));
        let monitor =
            LivenessMonitor::new(Box::new(probe.clone()), Duration::from_secs(3600)).unwrap();
        monitor.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while monitor.stats().probes_run == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        monitor.stop();
        assert_eq!(probe.0.lock().as_deref(), Some(MONITOR_THREAD_NAME));
    }
}
