//! Fixed-priority, run-to-completion scheduling of periodic tasks in
//! simulated time.
//!
//! At any instant the highest-priority task whose release time has come runs
//! next. A task body may itself consume time (conversion waits advance the
//! clock), which is how a slow low-priority cycle delays everything behind
//! it. When nothing is ready the clock jumps to the next release.
use embassy_time::{Duration, Instant};
use flight_core::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskId {
    AccelReader,
    BaroReader,
    FlightComputer,
    TelemetrySink,
}

impl TaskId {
    pub const fn name(self) -> &'static str {
        match self {
            TaskId::AccelReader => "accel",
            TaskId::BaroReader => "baro",
            TaskId::FlightComputer => "flight",
            TaskId::TelemetrySink => "telemetry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStats {
    pub runs: u32,
    /// Releases that passed before the task got to run them.
    pub missed: u32,
    /// Longest time from release to start.
    pub worst_latency: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    id: TaskId,
    period: Duration,
    next_release: Instant,
    stats: TaskStats,
}

pub struct Scheduler {
    /// Highest priority first.
    slots: Vec<Slot>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Adds a task below every task added before it.
    pub fn add(&mut self, id: TaskId, period: Duration, first_release: Instant) {
        debug!("Scheduling {} every {}ms", id.name(), period.as_millis());
        self.slots.push(Slot {
            id,
            period,
            next_release: first_release,
            stats: TaskStats {
                runs: 0,
                missed: 0,
                worst_latency: Duration::from_ticks(0),
            },
        });
    }

    /// Claims the highest-priority task released at or before `now` and
    /// books its next release.
    pub fn next_ready(&mut self, now: Instant) -> Option<TaskId> {
        let slot = self.slots.iter_mut().find(|s| s.next_release <= now)?;
        let latency = now - slot.next_release;
        slot.stats.worst_latency = slot.stats.worst_latency.max(latency);
        slot.stats.runs += 1;
        slot.next_release += slot.period;
        while slot.next_release <= now {
            slot.stats.missed += 1;
            slot.next_release += slot.period;
        }
        if latency > slot.period {
            warn!("{} overran by {}us", slot.id.name(), latency.as_micros());
        }
        Some(slot.id)
    }

    /// Earliest upcoming release.
    pub fn idle_until(&self) -> Option<Instant> {
        self.slots.iter().map(|s| s.next_release).min()
    }

    pub fn stats(&self, id: TaskId) -> Option<TaskStats> {
        self.slots.iter().find(|s| s.id == id).map(|s| s.stats)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
