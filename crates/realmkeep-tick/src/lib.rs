//! Periodic maintenance timers for Realmkeep.
//!
//! A game world runs two background cadences: the idle sweep (about once a
//! second) and the full-write sweep (every few minutes). Both are driven by
//! a [`TickScheduler`], which fires at a fixed period, reports late wakeups,
//! and warns when the work done per tick eats into the period.
//!
//! # Disabled timers
//!
//! A period of zero disables the timer: [`TickScheduler::wait_for_tick`]
//! pends forever. That lets a world turn a sweep off through configuration
//! without restructuring its `select!` loop.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown.recv() => break,
//!         _ = idle.wait_for_tick() => {
//!             lifecycle.idle_tick().await;
//!             idle.record_tick_end();
//!         }
//!         _ = flush.wait_for_tick() => {
//!             persistence.sweep(&store).await;
//!             flush.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when the scheduler wakes up more than a full period late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Count the missed ticks as skipped and schedule the next one a full
    /// period from now.
    #[default]
    Skip,
    /// Keep the original cadence. The next deadline is the missed one plus
    /// one period, so a late tick may be followed immediately by another.
    Drop,
}

/// Configuration for one periodic timer.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Label used in log lines ("idle", "flush").
    pub name: &'static str,
    /// Time between ticks. [`Duration::ZERO`] disables the timer.
    pub period: Duration,
    /// Late-wakeup policy.
    pub policy: TickPolicy,
    /// Fraction of the period (0.0–1.0) past which a tick's work is logged
    /// as slow. Default: 0.80.
    pub budget_warn_threshold: f64,
    /// Upper bound of a random delay added to the first tick, so worlds
    /// started together don't sweep the store in lockstep.
    pub initial_jitter: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            name: "tick",
            period: Duration::ZERO,
            policy: TickPolicy::default(),
            budget_warn_threshold: 0.80,
            initial_jitter: Duration::ZERO,
        }
    }
}

impl TickConfig {
    /// A named timer firing every `period`.
    pub fn every(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            ..Default::default()
        }
    }

    /// Whether this timer never fires.
    pub fn is_disabled(&self) -> bool {
        self.period.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Returned by [`TickScheduler::wait_for_tick`] each time it fires.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// How far past its deadline this tick fired.
    pub late_by: Duration,
    /// `true` if the tick fired more than 10% of a period late.
    pub overrun: bool,
    /// Whole periods missed because of the late wakeup.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Counters kept by a [`TickScheduler`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Work time of the most recent tick, as reported by
    /// [`TickScheduler::record_tick_end`].
    pub last_tick_time: Duration,
    pub max_tick_time: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// A fixed-period timer meant to sit in a `tokio::select!` loop.
pub struct TickScheduler {
    config: TickConfig,
    tick_count: u64,
    next_tick: Option<Instant>,
    /// Set when a tick fires, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// Creates a scheduler. The first tick fires one period (plus jitter)
    /// from now.
    pub fn new(mut config: TickConfig) -> Self {
        config.budget_warn_threshold = config.budget_warn_threshold.clamp(0.0, 1.0);

        let next_tick = (!config.is_disabled()).then(|| {
            let jitter = if config.initial_jitter.is_zero() {
                Duration::ZERO
            } else {
                let max = config.initial_jitter.as_micros() as u64;
                Duration::from_micros(rand::rng().random_range(0..max.max(1)))
            };
            Instant::now() + config.period + jitter
        });

        if config.is_disabled() {
            debug!(timer = config.name, "timer disabled (zero period)");
        } else {
            debug!(
                timer = config.name,
                period_ms = config.period.as_millis() as u64,
                policy = ?config.policy,
                "timer created"
            );
        }

        Self {
            config,
            tick_count: 0,
            next_tick,
            tick_start: None,
            metrics: TickMetrics::default(),
        }
    }

    /// Shorthand for `TickScheduler::new(TickConfig::every(name, period))`.
    pub fn every(name: &'static str, period: Duration) -> Self {
        Self::new(TickConfig::every(name, period))
    }

    /// Waits for the next tick.
    ///
    /// Pends forever when the timer is disabled. Cancel-safe: dropping the
    /// future before it resolves leaves the schedule untouched.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let Some(next) = self.next_tick else {
            std::future::pending::<()>().await;
            unreachable!("pending never resolves");
        };
        let period = self.config.period;

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;
        self.tick_start = Some(now);

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > period / 10;
        let missed = (late_by.as_nanos() / period.as_nanos()) as u64;

        let ticks_skipped = match self.config.policy {
            TickPolicy::Skip => {
                self.next_tick = Some(now + period);
                missed
            }
            TickPolicy::Drop => {
                self.next_tick = Some(next + period);
                0
            }
        };

        if ticks_skipped > 0 {
            warn!(
                timer = self.config.name,
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_millis() as u64,
                "timer woke late, skipping ahead"
            );
        }

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;

        trace!(timer = self.config.name, tick = self.tick_count, overrun, "tick");

        TickInfo {
            tick: self.tick_count,
            late_by,
            overrun,
            ticks_skipped,
        }
    }

    /// Marks the end of the work done for the current tick.
    ///
    /// Updates the timing metrics and warns if the work took more than the
    /// configured fraction of the period. A call without a preceding tick
    /// is ignored.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        self.metrics.last_tick_time = elapsed;
        if elapsed > self.metrics.max_tick_time {
            self.metrics.max_tick_time = elapsed;
        }

        let period = self.config.period;
        if period.is_zero() {
            return;
        }
        let utilization = elapsed.as_secs_f64() / period.as_secs_f64();
        if utilization >= self.config.budget_warn_threshold {
            warn!(
                timer = self.config.name,
                tick = self.tick_count,
                elapsed_ms = elapsed.as_millis() as u64,
                period_ms = period.as_millis() as u64,
                "tick work is close to the timer period"
            );
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn period(&self) -> Duration {
        self.config.period
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn is_disabled(&self) -> bool {
        self.next_tick.is_none()
    }
}
