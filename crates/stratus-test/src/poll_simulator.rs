//! Poll Loop Simulator - worker clocks under a scripted clock source
//!
//! Simulates:
//! - Several workers sharing one process clock engine
//! - Busy/sleep cycles of their poll loops
//! - Wall clock jumps, monotonic regressions and outages

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stratus_core::PackedClock;
use stratus_time::{ClockAnomaly, ClockConfig, ClockEngine, ManualClockSource, ThreadClock};

/// Clock source misbehaviour injected at every sleep
#[derive(Clone, Debug)]
pub struct ClockFaultModel {
    /// Probability that the wall clock jumps forward during a sleep
    pub wall_jump_prob: f64,
    /// Size of a wall clock jump
    pub wall_jump: Duration,
    /// Probability that the monotonic source steps backward by one second
    pub mono_regress_prob: f64,
    /// Probability that the monotonic source is unreadable for one refresh
    pub mono_outage_prob: f64,
}

impl ClockFaultModel {
    /// Well-behaved clocks
    pub fn none() -> Self {
        ClockFaultModel {
            wall_jump_prob: 0.0,
            wall_jump: Duration::ZERO,
            mono_regress_prob: 0.0,
            mono_outage_prob: 0.0,
        }
    }

    /// NTP stepping the wall clock now and then
    pub fn jumpy_wall() -> Self {
        ClockFaultModel {
            wall_jump_prob: 0.05,
            wall_jump: Duration::from_secs(30),
            ..Self::none()
        }
    }

    /// Monotonic source that cannot be trusted
    pub fn broken_monotonic() -> Self {
        ClockFaultModel {
            mono_regress_prob: 0.05,
            mono_outage_prob: 0.05,
            ..Self::none()
        }
    }

    /// Everything at once
    pub fn hostile() -> Self {
        ClockFaultModel {
            wall_jump_prob: 0.05,
            wall_jump: Duration::from_secs(5),
            mono_regress_prob: 0.05,
            mono_outage_prob: 0.05,
        }
    }
}

/// Poll loop shape of one worker
#[derive(Clone, Debug)]
pub struct WorkerProfile {
    /// Longest run between two waits
    pub max_busy: Duration,
    /// Timeout passed to the poller
    pub max_wait: Duration,
    /// Probability that a wait is cut short by an event
    pub wake_prob: f64,
}

impl WorkerProfile {
    /// Mostly sleeping worker
    pub fn idle() -> Self {
        WorkerProfile {
            max_busy: Duration::from_micros(200),
            max_wait: Duration::from_millis(5),
            wake_prob: 0.1,
        }
    }

    /// Worker woken up by traffic most of the time
    pub fn loaded() -> Self {
        WorkerProfile {
            max_busy: Duration::from_millis(4),
            max_wait: Duration::from_millis(1),
            wake_prob: 0.9,
        }
    }
}

struct SimulatedWorker {
    clock: ThreadClock,
    profile: WorkerProfile,
}

/// Simulation scenario
pub struct PollSimulator {
    source: Arc<ManualClockSource>,
    engine: Arc<ClockEngine>,
    workers: Vec<SimulatedWorker>,
    faults: ClockFaultModel,
    rng: StdRng,
    elapsed: Duration,
}

impl PollSimulator {
    pub fn new(config: ClockConfig, faults: ClockFaultModel, seed: u64) -> Self {
        let source = Arc::new(ManualClockSource::default());
        let engine = ClockEngine::new(source.clone(), config);
        PollSimulator {
            source,
            engine,
            workers: Vec::new(),
            faults,
            rng: StdRng::seed_from_u64(seed),
            elapsed: Duration::ZERO,
        }
    }

    /// Register a worker thread
    pub fn add_worker(&mut self, profile: WorkerProfile) {
        let clock = self.engine.register_thread();
        self.workers.push(SimulatedWorker { clock, profile });
    }

    pub fn engine(&self) -> &Arc<ClockEngine> {
        &self.engine
    }

    pub fn source(&self) -> &ManualClockSource {
        &self.source
    }

    /// Simulated time elapsed, as seen by a perfect clock
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Run loop iterations until `duration` of simulated time has passed
    pub fn run(&mut self, duration: Duration) -> SimulationResult {
        let mut result = SimulationResult::new();
        let end = self.elapsed + duration;
        while self.elapsed < end {
            self.tick(&mut result);
        }
        result.finalize(&self.engine);
        result
    }

    /// One loop iteration of every worker
    fn tick(&mut self, result: &mut SimulationResult) {
        let before = self.engine.global_now();

        // run
        let busy = self.random_up_to(self.max_busy());
        self.pass(busy);
        for w in &mut self.workers {
            w.clock.entering_poll();
        }

        // sleep
        let max_wait = self.workers.iter().map(|w| w.profile.max_wait).max().unwrap_or_default();
        let mut interrupted = Vec::with_capacity(self.workers.len());
        for i in 0..self.workers.len() {
            let p = self.workers[i].profile.wake_prob;
            interrupted.push(self.rng.gen_bool(p));
        }
        let slept = if interrupted.iter().any(|&i| i) {
            self.random_up_to(max_wait)
        } else {
            max_wait
        };
        self.pass(slept);
        self.inject_faults();

        // wake up
        for (w, &intr) in self.workers.iter_mut().zip(&interrupted) {
            let anomaly = w.clock.update_date(w.profile.max_wait, intr);
            w.clock.leaving_poll(w.profile.max_wait, intr);
            result.record_anomaly(anomaly);
            result.record_skew(self.engine.global_now(), w.clock.now());
        }
        self.source.set_monotonic_available(true);

        let after = self.engine.global_now();
        if after < before {
            result.global_regressions += 1;
        }
        result.total_ticks += 1;
    }

    fn max_busy(&self) -> Duration {
        self.workers.iter().map(|w| w.profile.max_busy).max().unwrap_or_default()
    }

    fn random_up_to(&mut self, max: Duration) -> Duration {
        let us = max.as_micros() as u64;
        Duration::from_micros(self.rng.gen_range(0..=us))
    }

    fn pass(&mut self, d: Duration) {
        self.source.advance(d);
        self.elapsed += d;
    }

    fn inject_faults(&mut self) {
        let f = self.faults.clone();
        if f.wall_jump_prob > 0.0 && self.rng.gen_bool(f.wall_jump_prob) {
            self.source.advance_wall(f.wall_jump);
        }
        if f.mono_regress_prob > 0.0 && self.rng.gen_bool(f.mono_regress_prob) {
            let mono = self.source.peek_monotonic();
            self.source.set_monotonic(mono.saturating_sub(Duration::from_secs(1)));
        }
        if f.mono_outage_prob > 0.0 && self.rng.gen_bool(f.mono_outage_prob) {
            self.source.set_monotonic_available(false);
        }
    }
}

/// Simulation result and statistics
#[derive(Debug, Default)]
pub struct SimulationResult {
    /// Loop iterations executed
    pub total_ticks: u64,
    /// Times the global date was seen going backward (must stay 0)
    pub global_regressions: u64,
    /// Refreshes without any anomaly
    pub clean_refreshes: u64,
    pub monotonic_unavailable: u64,
    pub monotonic_regressed: u64,
    pub wall_unavailable: u64,
    pub wall_jumps: u64,
    /// Largest lag of a thread behind the global date right after publish
    pub max_skew: Duration,
    /// Process idle percentage at the end of the run
    pub idle_pct: u32,
    /// Process uptime at the end of the run
    pub uptime: Duration,
}

impl SimulationResult {
    pub fn new() -> Self {
        SimulationResult::default()
    }

    fn record_anomaly(&mut self, anomaly: Option<ClockAnomaly>) {
        match anomaly {
            None => self.clean_refreshes += 1,
            Some(ClockAnomaly::MonotonicUnavailable) => self.monotonic_unavailable += 1,
            Some(ClockAnomaly::MonotonicRegressed { .. }) => self.monotonic_regressed += 1,
            Some(ClockAnomaly::WallUnavailable) => self.wall_unavailable += 1,
            Some(ClockAnomaly::WallJump) => self.wall_jumps += 1,
        }
    }

    fn record_skew(&mut self, global: PackedClock, local: PackedClock) {
        self.max_skew = self.max_skew.max(global - local);
    }

    fn finalize(&mut self, engine: &ClockEngine) {
        self.idle_pct = engine.report_idle();
        self.uptime = engine.uptime();
    }

    /// Refreshes that hit any anomaly
    pub fn anomalies(&self) -> u64 {
        self.monotonic_unavailable + self.monotonic_regressed + self.wall_unavailable + self.wall_jumps
    }
}

/// Predefined scenarios
pub mod scenarios {
    use super::*;

    /// Four quiet workers on good clocks
    pub fn quiet_pool() -> PollSimulator {
        let mut sim = PollSimulator::new(ClockConfig::default(), ClockFaultModel::none(), 1);
        for _ in 0..4 {
            sim.add_worker(WorkerProfile::idle());
        }
        sim
    }

    /// Loaded workers on good clocks
    pub fn busy_pool() -> PollSimulator {
        let mut sim = PollSimulator::new(ClockConfig::default(), ClockFaultModel::none(), 2);
        for _ in 0..4 {
            sim.add_worker(WorkerProfile::loaded());
        }
        sim
    }

    /// Mixed workers on misbehaving clocks
    pub fn hostile_clocks() -> PollSimulator {
        let mut sim = PollSimulator::new(ClockConfig::default(), ClockFaultModel::hostile(), 3);
        sim.add_worker(WorkerProfile::idle());
        sim.add_worker(WorkerProfile::loaded());
        sim.add_worker(WorkerProfile::idle());
        sim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_pool_is_idle() {
        let mut sim = scenarios::quiet_pool();
        let result = sim.run(Duration::from_secs(5));

        println!(
            "Quiet pool - idle: {}%, ticks: {}, max skew: {:?}",
            result.idle_pct, result.total_ticks, result.max_skew
        );
        assert_eq!(result.global_regressions, 0);
        assert_eq!(result.anomalies(), 0);
        assert!(result.idle_pct >= 80, "idle {}", result.idle_pct);
    }

    #[test]
    fn test_busy_pool_is_busy() {
        let mut sim = scenarios::busy_pool();
        let result = sim.run(Duration::from_secs(5));

        println!("Busy pool - idle: {}%", result.idle_pct);
        assert_eq!(result.global_regressions, 0);
        assert!(result.idle_pct <= 50, "idle {}", result.idle_pct);
    }

    #[test]
    fn test_uptime_tracks_elapsed() {
        let mut sim = scenarios::quiet_pool();
        let result = sim.run(Duration::from_secs(2));

        // good clocks: the global date follows the source exactly
        assert_eq!(result.uptime, sim.elapsed());
    }

    #[test]
    fn test_hostile_clocks_stay_monotonic() {
        let mut sim = scenarios::hostile_clocks();
        let result = sim.run(Duration::from_secs(10));

        println!(
            "Hostile clocks - anomalies: {} (regressed {}, unavailable {}, wall jumps {}), max skew: {:?}",
            result.anomalies(),
            result.monotonic_regressed,
            result.monotonic_unavailable,
            result.wall_jumps,
            result.max_skew
        );
        assert_eq!(result.global_regressions, 0);
        assert!(result.monotonic_regressed > 0);
        assert!(result.monotonic_unavailable > 0);
        assert!(result.idle_pct <= 100);
    }

    #[test]
    fn test_wall_jumps_do_not_move_dates() {
        let mut sim = PollSimulator::new(ClockConfig::default(), ClockFaultModel::jumpy_wall(), 9);
        sim.add_worker(WorkerProfile::idle());
        let result = sim.run(Duration::from_secs(5));

        // the monotonic source stays good: dates ignore the wall jumps
        assert_eq!(result.anomalies(), 0);
        assert_eq!(result.uptime, sim.elapsed());
    }

    #[test]
    fn test_skew_bounded_after_publish() {
        let mut sim = scenarios::busy_pool();
        let result = sim.run(Duration::from_secs(1));
        assert_eq!(result.max_skew, Duration::ZERO);
    }
}
