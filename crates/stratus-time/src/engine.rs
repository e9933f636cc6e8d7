//! Clock Engine - process start date, global date, and per-thread clocks
//!
//! The poll loop of every worker drives its [`ThreadClock`]:
//!
//! ```text
//! clock.entering_poll();
//! let (timeout, interrupted) = poller.wait(max_wait);
//! clock.update_date(max_wait, interrupted);
//! clock.leaving_poll(timeout, interrupted);
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use stratus_core::{AtomicPackedClock, PackedClock, ThreadNum};
use tracing::{debug, trace, warn};

use crate::{
    ClockAnomaly, ClockSource, GlobalClock, IdleMeter, IsoTimeCache, LocalClock, SignalTimer,
    SystemClockSource,
};

/// Clock engine configuration
#[derive(Clone, Debug)]
pub struct ClockConfig {
    /// Margin above the announced wait before a wall date counts as a
    /// forward jump
    pub max_forward_jump: Duration,
    /// Minimum sample before an idle percentage is published
    pub idle_sample_window: Duration,
    /// Signal delivered by the refresh timer
    pub timer_signal: i32,
    /// Period of the refresh timer
    pub timer_interval: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        ClockConfig {
            max_forward_jump: Duration::from_millis(100),
            idle_sample_window: Duration::from_millis(500),
            timer_signal: libc::SIGALRM,
            timer_interval: Duration::from_secs(1),
        }
    }
}

impl ClockConfig {
    /// Looser tolerances for hosts with coarse or noisy clocks
    pub fn coarse() -> Self {
        ClockConfig {
            max_forward_jump: Duration::from_millis(250),
            idle_sample_window: Duration::from_secs(1),
            timer_signal: libc::SIGALRM,
            timer_interval: Duration::from_millis(250),
        }
    }
}

/// What a thread publishes for other threads to read
///
/// Diagnostics only: nothing here orders events across threads.
#[derive(Debug, Default)]
pub struct ThreadSlot {
    idle_pct: AtomicU32,
    cpu_time: AtomicU64,
    mono_time: AtomicU64,
    now: AtomicPackedClock,
    alive: AtomicBool,
}

impl ThreadSlot {
    pub fn idle_pct(&self) -> u32 {
        self.idle_pct.load(Ordering::Relaxed)
    }

    pub fn cpu_time(&self) -> u64 {
        self.cpu_time.load(Ordering::Relaxed)
    }

    pub fn mono_time(&self) -> u64 {
        self.mono_time.load(Ordering::Relaxed)
    }

    pub fn now(&self) -> PackedClock {
        self.now.load()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

/// Process-wide clock state
pub struct ClockEngine {
    source: Arc<dyn ClockSource>,
    config: ClockConfig,
    global: GlobalClock,
    /// Process start date, wall-clock
    start_wall: PackedClock,
    /// Process start date, internal monotonic
    start_monotonic: PackedClock,
    threads: RwLock<Vec<Arc<ThreadSlot>>>,
}

impl ClockEngine {
    /// Capture the process start date and seed the global date with it
    pub fn new(source: Arc<dyn ClockSource>, config: ClockConfig) -> Arc<Self> {
        let date = match source.wall() {
            Some(date) => date,
            None => {
                warn!("wall clock unavailable at startup, falling back to monotonic ticks");
                source.monotonic().unwrap_or(PackedClock::ZERO)
            }
        };
        debug!(start = %date, "clock engine initialised");

        Arc::new(ClockEngine {
            source,
            config,
            global: GlobalClock::new(date),
            start_wall: date,
            start_monotonic: date,
            threads: RwLock::new(Vec::new()),
        })
    }

    /// Engine over the kernel clocks with default configuration
    pub fn system() -> Arc<Self> {
        Self::new(Arc::new(SystemClockSource), ClockConfig::default())
    }

    /// Create the clock of a new worker thread.
    ///
    /// The thread starts at the current global date, then refreshes once.
    pub fn register_thread(self: &Arc<Self>) -> ThreadClock {
        let slot = Arc::new(ThreadSlot::default());
        slot.alive.store(true, Ordering::Release);

        let num = {
            let mut threads = self.threads.write();
            threads.push(Arc::clone(&slot));
            ThreadNum(threads.len() - 1)
        };

        let start = self.global.now();
        let wall = self.source.wall().unwrap_or(start);
        let mut clock = ThreadClock {
            engine: Arc::clone(self),
            num,
            slot,
            local: LocalClock::new(start, wall, self.config.max_forward_jump),
            idle: IdleMeter::new(wall, self.config.idle_sample_window),
            prev_cpu_time: 0,
            prev_mono_time: 0,
            iso: IsoTimeCache::new(),
            _not_sync: PhantomData,
        };
        clock.update_date(Duration::ZERO, true);
        debug!(thread = %num, now = %clock.now(), "thread clock registered");
        clock
    }

    /// Current global date
    #[inline]
    pub fn global_now(&self) -> PackedClock {
        self.global.now()
    }

    pub fn start_wall(&self) -> PackedClock {
        self.start_wall
    }

    pub fn start_monotonic(&self) -> PackedClock {
        self.start_monotonic
    }

    /// Time since process start, on the global date
    pub fn uptime(&self) -> Duration {
        self.global.now() - self.start_monotonic
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn source(&self) -> &dyn ClockSource {
        self.source.as_ref()
    }

    /// Average idle percentage over live threads, 0 when there are none
    pub fn report_idle(&self) -> u32 {
        let threads = self.threads.read();
        let (total, live) = threads
            .iter()
            .filter(|slot| slot.is_alive())
            .fold((0u64, 0u64), |(total, live), slot| {
                (total + slot.idle_pct() as u64, live + 1)
            });
        if live == 0 {
            0
        } else {
            (total / live) as u32
        }
    }

    /// CPU time of thread `thr` as of its last poll transition
    pub fn now_cpu_time_thread(&self, thr: ThreadNum) -> u64 {
        self.slot(thr).map_or(0, |slot| slot.cpu_time())
    }

    /// Last monotonic date published by thread `thr`
    pub fn thread_now(&self, thr: ThreadNum) -> Option<PackedClock> {
        self.slot(thr).map(|slot| slot.now())
    }

    /// Number of registered threads still alive
    pub fn live_threads(&self) -> usize {
        self.threads.read().iter().filter(|s| s.is_alive()).count()
    }

    fn slot(&self, thr: ThreadNum) -> Option<Arc<ThreadSlot>> {
        self.threads.read().get(thr.0).cloned()
    }
}

impl std::fmt::Debug for ClockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockEngine")
            .field("global", &self.global.now())
            .field("start_wall", &self.start_wall)
            .field("threads", &self.threads.read().len())
            .finish()
    }
}

/// Clock state owned by one worker thread
///
/// Not `Sync`: only the owning thread updates it.
pub struct ThreadClock {
    engine: Arc<ClockEngine>,
    num: ThreadNum,
    slot: Arc<ThreadSlot>,
    local: LocalClock,
    idle: IdleMeter,
    prev_cpu_time: u64,
    prev_mono_time: u64,
    iso: IsoTimeCache,
    _not_sync: PhantomData<Cell<()>>,
}

impl ThreadClock {
    pub fn num(&self) -> ThreadNum {
        self.num
    }

    pub fn engine(&self) -> &Arc<ClockEngine> {
        &self.engine
    }

    pub fn local(&self) -> &LocalClock {
        &self.local
    }

    /// Internal monotonic date of this thread
    #[inline]
    pub fn now(&self) -> PackedClock {
        self.local.monotonic_now()
    }

    /// Last wall-clock date read by this thread
    #[inline]
    pub fn date(&self) -> PackedClock {
        self.local.wall_now()
    }

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.local.monotonic_now().as_millis()
    }

    /// Refresh the thread's dates from the clock source
    pub fn update_local_date(&mut self, max_wait: Duration, interrupted: bool) -> Option<ClockAnomaly> {
        self.local
            .refresh(self.engine.source.as_ref(), max_wait, interrupted)
    }

    /// Publish the thread's date to the global date, catching up if behind
    pub fn update_global_date(&mut self) -> PackedClock {
        let now = self.engine.global.publish(&mut self.local);
        self.slot.now.store(now);
        now
    }

    /// Local refresh followed by global publish, once per loop iteration
    pub fn update_date(&mut self, max_wait: Duration, interrupted: bool) -> Option<ClockAnomaly> {
        let anomaly = self.update_local_date(max_wait, interrupted);
        self.update_global_date();
        anomaly
    }

    /// The thread is about to block in the poller
    pub fn entering_poll(&mut self) {
        let date = self
            .engine
            .source
            .wall()
            .unwrap_or_else(|| self.local.wall_now());
        self.local.set_poll_anchor(date);
        let run = self.idle.entering_poll(date);
        trace!(thread = %self.num, run_us = run.as_micros() as u64, "entering poll");
        self.sample_cpu();
    }

    /// The thread woke up after waiting at most `timeout`.
    ///
    /// Expects `update_date` to have run since the wake-up.
    pub fn leaving_poll(&mut self, timeout: Duration, interrupted: bool) {
        let cap = (!interrupted).then(|| timeout + self.engine.config.max_forward_jump);
        if let Some(pct) = self.idle.leaving_poll(self.local.wall_now(), cap) {
            self.slot.idle_pct.store(pct, Ordering::Relaxed);
            trace!(thread = %self.num, idle_pct = pct, "idle sample");
        }
        self.sample_cpu();
    }

    /// Idle percentage last published by this thread
    pub fn idle_pct(&self) -> u32 {
        self.slot.idle_pct()
    }

    /// Running time accumulated between poll calls
    pub fn busy_time(&self) -> Duration {
        self.idle.busy_time()
    }

    /// Monotonic ticks in nanoseconds, fresh read. 0 if unavailable.
    pub fn now_mono_time(&self) -> u64 {
        self.engine.source.monotonic().map_or(0, PackedClock::as_nanos)
    }

    /// Monotonic ticks as of the last poll transition
    pub fn now_mono_time_fast(&self) -> u64 {
        self.prev_mono_time
    }

    /// CPU time of the calling thread in nanoseconds, fresh read.
    /// Falls back to the process CPU time, 0 if neither is available.
    pub fn now_cpu_time(&self) -> u64 {
        let source = self.engine.source.as_ref();
        source
            .thread_cpu_ns()
            .or_else(|| source.process_cpu_ns())
            .unwrap_or(0)
    }

    /// CPU time as of the last poll transition
    pub fn now_cpu_time_fast(&self) -> u64 {
        self.prev_cpu_time
    }

    /// Arm the periodic refresh timer from the engine configuration.
    ///
    /// Failure only makes refreshes less regular, so it is logged and
    /// reported as `None`.
    pub fn setup_signal_timer(&self) -> Option<SignalTimer> {
        let cfg = &self.engine.config;
        match SignalTimer::setup(cfg.timer_signal, self.num.0 as i32, cfg.timer_interval) {
            Ok(timer) => Some(timer),
            Err(e) => {
                warn!(thread = %self.num, error = %e, "cannot arm clock refresh timer");
                None
            }
        }
    }

    /// Current wall date as `YYYY-mm-ddTHH:MM:SS.uuuuuu+hh:mm`, fresh read.
    /// `pad` appends a trailing space.
    pub fn timeofday_as_iso_us(&mut self, pad: bool) -> String {
        let date = self
            .engine
            .source
            .wall()
            .unwrap_or_else(|| self.local.wall_now());
        self.iso.format(date, pad)
    }

    fn sample_cpu(&mut self) {
        self.prev_cpu_time = self.now_cpu_time();
        self.prev_mono_time = self.now_mono_time();
        self.slot.cpu_time.store(self.prev_cpu_time, Ordering::Relaxed);
        self.slot.mono_time.store(self.prev_mono_time, Ordering::Relaxed);
    }
}

impl Drop for ThreadClock {
    fn drop(&mut self) {
        self.slot.alive.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ThreadClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadClock")
            .field("num", &self.num)
            .field("now", &self.local.monotonic_now())
            .field("date", &self.local.wall_now())
            .finish()
    }
}
