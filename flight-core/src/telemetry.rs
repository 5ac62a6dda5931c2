use crate::channels::{PushOutcome, push_or_drop};
use crate::health_types::SensorHealth;
use crate::{DeployReason, DeploymentDecision, FlightPhase, FlightSnapshot, PhaseTransition};
use core::fmt::Write;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Sender;
use embassy_time::{Instant, TICK_HZ};

// A safe upper bound for any single CSV row (Tag + Timestamp + Data + Newline)
pub const MAX_LOG_LINE_LEN: usize = 256;

/// Timestamps on the wire are raw monotonic ticks.
pub type FlightTicks = u64;

/// Per-cycle record handed to the telemetry sink (uplink and onboard log).
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetryRecord {
    /// Monotonically increasing, one per cycle.
    pub seq: u32,
    pub tickstamp: FlightTicks,
    pub acceleration: f32,
    pub altitude: f32,
    pub velocity: f32,
    pub agl: f32,
    pub pressure: f32,
    pub temperature: f32,
    pub phase: FlightPhase,
    pub actuate: bool,
    pub reason: DeployReason,
}

/// Hands out sequence ids and assembles records from committed state.
pub struct TelemetryRecorder {
    next_seq: u32,
}

impl TelemetryRecorder {
    pub const fn new() -> Self {
        Self { next_seq: 0 }
    }

    pub fn record(
        &mut self,
        snapshot: &FlightSnapshot,
        decision: DeploymentDecision,
        now: Instant,
    ) -> TelemetryRecord {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        let est = &snapshot.estimate;
        TelemetryRecord {
            seq,
            tickstamp: now.as_ticks(),
            acceleration: est.vertical_acceleration,
            altitude: est.altitude_msl,
            velocity: est.vertical_velocity,
            agl: est.altitude_agl,
            pressure: est.pressure,
            temperature: est.temperature,
            phase: snapshot.phase,
            actuate: decision.actuate,
            reason: decision.reason,
        }
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TelemetryEntry {
    Cycle(TelemetryRecord),
    Transition(PhaseTransition),
    Health(SensorHealth),
}

impl TelemetryEntry {
    pub fn write_schema<const SIZE: usize>(cursor: &mut LogBuffer<SIZE>) -> core::fmt::Result {
        writeln!(cursor, "# SCHEMA DEFINITION")?;
        writeln!(cursor, "# METADATA,tick_hz,{}", TICK_HZ)?;
        writeln!(
            cursor,
            "# {},tickstamp,{}",
            TelemetryRecord::TAG,
            TelemetryRecord::CSV_HEADER
        )?;
        writeln!(
            cursor,
            "# {},tickstamp,{}",
            PhaseTransition::TAG,
            PhaseTransition::CSV_HEADER
        )?;
        writeln!(
            cursor,
            "# {},tickstamp,{}",
            SensorHealth::TAG,
            SensorHealth::CSV_HEADER
        )?;
        Ok(())
    }

    pub fn format_to<const SIZE: usize>(&self, cursor: &mut LogBuffer<SIZE>) -> core::fmt::Result {
        match self {
            TelemetryEntry::Cycle(data) => write_line(data.tickstamp, data, cursor),
            TelemetryEntry::Transition(data) => write_line(data.at.as_ticks(), data, cursor),
            TelemetryEntry::Health(data) => write_line(data.tickstamp, data, cursor),
        }
    }
}

// Every row has the form: TAG,TIMESTAMP,PAYLOAD...\n
fn write_line<T: Loggable, const SIZE: usize>(
    ts: FlightTicks,
    data: &T,
    cursor: &mut LogBuffer<SIZE>,
) -> core::fmt::Result {
    write!(cursor, "{},{},", T::TAG, ts)?;
    data.format_payload(cursor)?;
    writeln!(cursor)
}

/// Types that can be written as one CSV row.
pub trait Loggable {
    /// Row identifier, e.g. "T" for cycle records.
    const TAG: &'static str;
    /// Column names of the payload, comma separated.
    const CSV_HEADER: &'static str;

    /// Only write the fields and commas. Do NOT write the tag, timestamp, or \n.
    fn format_payload<const SIZE: usize>(&self, cursor: &mut LogBuffer<SIZE>) -> core::fmt::Result;
}

impl Loggable for TelemetryRecord {
    const TAG: &'static str = "T";
    const CSV_HEADER: &'static str =
        "seq,accel,altitude,velocity,agl,pressure,temperature,phase,actuate,reason";

    fn format_payload<const SIZE: usize>(&self, cursor: &mut LogBuffer<SIZE>) -> core::fmt::Result {
        write!(
            cursor,
            "{},{:.2},{:.2},{:.2},{:.2},{:.0},{:.2},{},{},{}",
            self.seq,
            self.acceleration,
            self.altitude,
            self.velocity,
            self.agl,
            self.pressure,
            self.temperature,
            self.phase.index(),
            self.actuate as u8,
            self.reason as u8
        )
    }
}

impl Loggable for PhaseTransition {
    const TAG: &'static str = "P";
    const CSV_HEADER: &'static str = "from,to,forced";

    fn format_payload<const SIZE: usize>(&self, cursor: &mut LogBuffer<SIZE>) -> core::fmt::Result {
        write!(
            cursor,
            "{},{},{}",
            self.from.label(),
            self.to.label(),
            self.forced as u8
        )
    }
}

/// Best-effort publish to the sink. A full queue drops the entry and returns;
/// the caller counts it from the outcome.
pub fn publish<M: RawMutex, const N: usize>(
    tx: &Sender<'_, M, TelemetryEntry, N>,
    entry: TelemetryEntry,
) -> PushOutcome {
    push_or_drop(tx, entry)
}

// Helper for formatting into a buffer
#[repr(align(4))]
pub struct LogBuffer<const SIZE: usize> {
    buf: [u8; SIZE],
    pub pos: usize,
}

impl<const SIZE: usize> core::fmt::Write for LogBuffer<SIZE> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remainder = self.buf.len() - self.pos;
        if remainder < bytes.len() {
            return Err(core::fmt::Error);
        }

        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }
}

impl<const SIZE: usize> LogBuffer<SIZE> {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; SIZE],
            pos: 0,
        }
    }

    /// Formats an entry into the buffer.
    /// Returns the number of bytes written; on error the buffer is rolled back.
    pub fn write_entry(&mut self, entry: &TelemetryEntry) -> Result<usize, core::fmt::Error> {
        let start_pos = self.pos;
        if let Err(e) = entry.format_to(self) {
            self.pos = start_pos;
            return Err(e);
        }
        Ok(self.pos - start_pos)
    }

    pub fn space_remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn get_active_buffer(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    pub fn as_str(&self) -> &str {
        // Only `write_str` fills the buffer, so it is always valid UTF-8.
        core::str::from_utf8(self.get_active_buffer()).unwrap_or("")
    }

    pub fn reset(&mut self) {
        self.pos = 0;
    }
}

impl<const SIZE: usize> Default for LogBuffer<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KinematicEstimate;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embassy_sync::channel::Channel;

    fn snapshot() -> FlightSnapshot {
        FlightSnapshot {
            phase: FlightPhase::Coasting,
            estimate: KinematicEstimate {
                altitude_msl: 2417.0,
                altitude_agl: 1000.0,
                vertical_velocity: 42.5,
                vertical_acceleration: -1.25,
                pressure: 75_000.0,
                temperature: 12.0,
                sample_time: Instant::from_millis(500),
                valid: true,
            },
            launched_at: Some(Instant::from_millis(0)),
        }
    }

    #[test]
    fn test_sequence_ids_increase() {
        let mut recorder = TelemetryRecorder::new();
        let snap = snapshot();
        let a = recorder.record(&snap, DeploymentDecision::IDLE, Instant::from_millis(10));
        let b = recorder.record(&snap, DeploymentDecision::IDLE, Instant::from_millis(20));
        assert_eq!(a.seq, 0);
        assert_eq!(b.seq, 1);
        assert!(b.tickstamp > a.tickstamp);
    }

    #[test]
    fn test_cycle_row_format() {
        let mut recorder = TelemetryRecorder::new();
        let record = recorder.record(
            &snapshot(),
            DeploymentDecision::fire(DeployReason::TimerBackup),
            Instant::from_ticks(1234),
        );

        let mut buf = LogBuffer::<MAX_LOG_LINE_LEN>::new();
        buf.write_entry(&TelemetryEntry::Cycle(record)).unwrap();
        assert_eq!(
            buf.as_str(),
            "T,1234,0,-1.25,2417.00,42.50,1000.00,75000,12.00,2,1,2\n"
        );
    }

    #[test]
    fn test_transition_row_format() {
        let entry = TelemetryEntry::Transition(PhaseTransition {
            from: FlightPhase::Coasting,
            to: FlightPhase::Apogee,
            at: Instant::from_ticks(99),
            forced: false,
        });
        let mut buf = LogBuffer::<64>::new();
        buf.write_entry(&entry).unwrap();
        assert_eq!(buf.as_str(), "P,99,Coasting,Apogee,0\n");
    }

    #[test]
    fn test_overflow_rolls_back() {
        let mut recorder = TelemetryRecorder::new();
        let record = recorder.record(&snapshot(), DeploymentDecision::IDLE, Instant::from_ticks(1));
        let mut buf = LogBuffer::<16>::new();
        assert!(buf.write_entry(&TelemetryEntry::Cycle(record)).is_err());
        assert_eq!(buf.pos, 0);
    }

    #[test]
    fn test_schema_lists_every_tag() {
        let mut buf = LogBuffer::<512>::new();
        TelemetryEntry::write_schema(&mut buf).unwrap();
        let schema = buf.as_str();
        assert!(schema.contains("# T,tickstamp,seq"));
        assert!(schema.contains("# P,tickstamp,from,to,forced"));
        assert!(schema.contains("# SH,tickstamp,"));
    }

    #[test]
    fn test_publish_never_blocks() {
        let ch: Channel<NoopRawMutex, TelemetryEntry, 1> = Channel::new();
        let tx = ch.sender();
        let mut recorder = TelemetryRecorder::new();
        let record = recorder.record(&snapshot(), DeploymentDecision::IDLE, Instant::from_ticks(1));

        assert_eq!(publish(&tx, TelemetryEntry::Cycle(record)), PushOutcome::Enqueued);
        assert_eq!(publish(&tx, TelemetryEntry::Cycle(record)), PushOutcome::Dropped);
    }
}
