//! Periodic ticker for bedwarp's background housekeeping.
//!
//! The proxy runs one ticker for its whole lifetime (the keep-alive tick).
//! It fires at a fixed period and reports how late each tick was. After a
//! stall the missed deadlines are dropped and the schedule restarts a full
//! period after the late tick.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown.changed() => break,
//!         tick = ticker.wait_for_tick() => {
//!             trace!(tick = tick.count, players = registry.len(), "keep-alive");
//!             ticker.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

/// Ticker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerConfig {
    /// Time between ticks.
    pub period: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self { period: Duration::from_secs(1) }
    }
}

impl TickerConfig {
    /// Shortest period accepted. Anything smaller is raised to this.
    pub const MIN_PERIOD: Duration = Duration::from_millis(10);

    pub fn every(period: Duration) -> Self {
        Self { period }
    }

    /// Fixes out-of-range values. Called by [`Ticker::new`].
    pub fn validated(mut self) -> Self {
        if self.period < Self::MIN_PERIOD {
            warn!(period = ?self.period, min = ?Self::MIN_PERIOD, "ticker period too short, raising");
            self.period = Self::MIN_PERIOD;
        }
        self
    }
}

/// One fired tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Starts at 1.
    pub count: u64,
    /// How far past its deadline the tick fired.
    pub late_by: Duration,
    /// More than a tenth of a period late.
    pub overrun: bool,
    /// Whole deadlines dropped because of the delay.
    pub ticks_skipped: u64,
}

pub struct Ticker {
    period: Duration,
    next_tick: TokioInstant,
    tick_count: u64,
    tick_start: Option<Instant>,
}

impl Ticker {
    pub fn new(config: TickerConfig) -> Self {
        let TickerConfig { period } = config.validated();
        debug!(?period, "ticker created");
        Self {
            period,
            next_tick: TokioInstant::now() + period,
            tick_count: 0,
            tick_start: None,
        }
    }

    pub fn every(period: Duration) -> Self {
        Self::new(TickerConfig::every(period))
    }

    /// Waits for the next tick.
    ///
    /// Cancel-safe: dropping the future before it completes leaves the
    /// schedule unchanged.
    pub async fn wait_for_tick(&mut self) -> Tick {
        let next = self.next_tick;
        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > self.period / 10;
        let ticks_skipped = if overrun {
            (late_by.as_nanos() / self.period.as_nanos()) as u64
        } else {
            0
        };
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "ticker stalled, skipping ahead"
            );
        }
        self.next_tick = now + self.period;

        trace!(tick = self.tick_count, overrun, "tick fired");
        Tick { count: self.tick_count, late_by, overrun, ticks_skipped }
    }

    /// Marks the work for the current tick as done. Warns if it took a
    /// whole period.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        if elapsed >= self.period {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                period_ms = self.period.as_secs_f64() * 1000.0,
                "tick work took longer than the period"
            );
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
