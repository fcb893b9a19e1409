//! Periodic scanning on background threads.
//!
//! A trigger thread waits for the armed deadline and hands a unit of work to
//! a worker thread through a single-slot channel. The worker runs the scan,
//! then arms the next deadline `interval` after the scan finished, so scans
//! never overlap and the effective period is `scan time + interval`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use log::{debug, error, warn};
use crate::keypad::{EventSink, KeyIdentity, KeypadError, KeypadResult, PinMatrix, ScanEngine};

/// Where the scheduler is in its cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SchedulerState {
    /// Before the first arm. The worker re-arms straight into `TriggerPending`.
    Idle,
    /// The next scan fires at the given instant.
    TriggerPending(Instant),
    /// A scan has been handed to the worker and has not finished.
    Scanning,
    /// Shut down; nothing fires any more.
    Stopped,
}

/// Delays driving the scan loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ScanTiming {
    /// Delay before the very first scan.
    pub initial_delay: Duration,
    /// Delay between the end of one scan and the start of the next.
    pub interval: Duration,
}

impl Default for ScanTiming {
    fn default() -> Self {
        ScanTiming {
            initial_delay: Duration::from_millis(100),
            interval: Duration::from_millis(30),
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SchedulerState>,
    wake: Condvar,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        // The state is a plain enum, always valid even if a holder panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type Released<K> = (Box<dyn PinMatrix>, Box<dyn EventSink<K>>);

/// Owns the trigger and worker threads of a running keypad.
#[derive(Debug)]
pub struct Scheduler<K> {
    shared: Arc<Shared>,
    engine: Arc<ScanEngine<K>>,
    trigger: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<Released<K>>>,
}

impl<K: KeyIdentity> Scheduler<K> {
    /// Arms the first scan `timing.initial_delay` from now and starts both threads.
    ///
    /// The worker takes ownership of `matrix` and `sink` until [Scheduler::stop].
    pub fn start(
        engine: Arc<ScanEngine<K>>,
        matrix: Box<dyn PinMatrix>,
        sink: Box<dyn EventSink<K>>,
        timing: ScanTiming,
    ) -> KeypadResult<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(SchedulerState::Idle),
            wake: Condvar::new(),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });
        let (work_tx, work_rx) = mpsc::sync_channel(1);

        let worker = {
            let shared = shared.clone();
            let engine = engine.clone();
            thread::Builder::new()
                .name("keypad-scan".to_string())
                .spawn(move || run_worker(&shared, &engine, matrix, sink, work_rx, timing.interval))
                .map_err(|e| KeypadError::Spawn("scan worker", e.kind()))?
        };

        *shared.lock() = SchedulerState::TriggerPending(Instant::now() + timing.initial_delay);

        let trigger = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("keypad-trigger".to_string())
                .spawn(move || run_trigger(&shared, work_tx))
        };
        let trigger = match trigger {
            Ok(trigger) => trigger,
            Err(e) => {
                // The unsent work channel went down with the closure, so the worker exits by itself.
                *shared.lock() = SchedulerState::Stopped;
                if let Ok((matrix, _sink)) = worker.join() {
                    matrix.release();
                }
                return Err(KeypadError::Spawn("scan trigger", e.kind()));
            }
        };

        debug!("Scheduler started, first scan in {:?}.", timing.initial_delay);
        Ok(Scheduler {
            shared,
            engine,
            trigger: Some(trigger),
            worker: Some(worker),
        })
    }

    pub fn engine(&self) -> &ScanEngine<K> {
        &self.engine
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.lock()
    }

    /// Number of scans that ran to the end.
    pub fn completed_scans(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// Number of scans dropped because of a hardware error.
    pub fn failed_scans(&self) -> u64 {
        self.shared.failed.load(Ordering::Relaxed)
    }

    /// Cancels the pending trigger, waits for a running scan to finish and
    /// hands back the matrix and the sink.
    ///
    /// Returns `None` if the scheduler was already stopped.
    pub fn stop(&mut self) -> Option<Released<K>> {
        let released = match self.halt()? {
            Ok(released) => Some(released),
            Err(_) => {
                error!("Scan worker thread panicked; its lines were released while unwinding.");
                None
            }
        };
        debug!("Scheduler stopped after {} scans ({} failed).", self.completed_scans(), self.failed_scans());
        released
    }
}

impl<K> Scheduler<K> {
    fn halt(&mut self) -> Option<thread::Result<Released<K>>> {
        {
            let mut state = self.shared.lock();
            *state = SchedulerState::Stopped;
            self.shared.wake.notify_all();
        }

        if let Some(trigger) = self.trigger.take() {
            if trigger.join().is_err() {
                error!("Scan trigger thread panicked.");
            }
        }

        self.worker.take().map(JoinHandle::join)
    }
}

impl<K> Drop for Scheduler<K> {
    fn drop(&mut self) {
        if let Some(Ok((matrix, _sink))) = self.halt() {
            matrix.release();
        }
    }
}

/// Waits for the armed deadline and hands one unit of work to the worker.
fn run_trigger(shared: &Shared, work: SyncSender<()>) {
    let mut state = shared.lock();
    loop {
        match *state {
            SchedulerState::Stopped => break,
            SchedulerState::TriggerPending(deadline) => {
                let now = Instant::now();
                if now < deadline {
                    state = shared
                        .wake
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                    continue;
                }

                *state = SchedulerState::Scanning;
                match work.try_send(()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(())) => warn!("Scan requested while one is still queued."),
                    Err(TrySendError::Disconnected(())) => {
                        warn!("Scan worker is gone, stopping the trigger.");
                        *state = SchedulerState::Stopped;
                        break;
                    }
                }
            }
            SchedulerState::Idle | SchedulerState::Scanning => {
                state = shared.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
        }
    }
    debug!("Scan trigger exiting.");
}

/// Runs queued scans and re-arms the trigger after each one.
fn run_worker<K: KeyIdentity>(
    shared: &Shared,
    engine: &ScanEngine<K>,
    matrix: Box<dyn PinMatrix>,
    mut sink: Box<dyn EventSink<K>>,
    work: Receiver<()>,
    interval: Duration,
) -> Released<K> {
    while work.recv().is_ok() {
        if *shared.lock() == SchedulerState::Stopped {
            break;
        }

        match engine.scan(&*matrix, &mut *sink) {
            Ok(()) => {
                shared.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Scan of {:?} failed, dropping this cycle: {}", matrix, e);
            }
        }

        let mut state = shared.lock();
        if *state == SchedulerState::Scanning {
            *state = SchedulerState::TriggerPending(Instant::now() + interval);
            shared.wake.notify_all();
        }
    }
    debug!("Scan worker exiting.");
    (matrix, sink)
}
