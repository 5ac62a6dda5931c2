//! Bounded queues between tasks. Tasks never share mutable state; everything
//! crosses one of these. The owner of the executor decides where the queues
//! live and which mutex guards them.
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Sender};

use crate::config::{ACCEL_QUEUE_LEN, BARO_QUEUE_LEN, TELEMETRY_QUEUE_LEN};
use crate::telemetry::TelemetryEntry;
use crate::{AccelSample, BaroSample};

/// Accelerometer samples. Safety path: producers block when full.
pub type AccelQueue<M> = Channel<M, AccelSample, ACCEL_QUEUE_LEN>;

/// Barometer samples. Producers drop when full so sampling cadence holds.
pub type BaroQueue<M> = Channel<M, BaroSample, BARO_QUEUE_LEN>;

/// Side channel to the telemetry sink. Never allowed to stall the control path.
pub type TelemetryQueue<M> = Channel<M, TelemetryEntry, TELEMETRY_QUEUE_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PushOutcome {
    Enqueued,
    Dropped,
}

/// Waits for space. Only for queues whose consumer is provisioned to keep up.
pub async fn push_blocking<M: RawMutex, T, const N: usize>(tx: &Sender<'_, M, T, N>, item: T) {
    tx.send(item).await;
}

/// Enqueues if there is room, otherwise drops the item and returns at once.
/// Counting drops is up to the caller.
pub fn push_or_drop<M: RawMutex, T, const N: usize>(tx: &Sender<'_, M, T, N>, item: T) -> PushOutcome {
    match tx.try_send(item) {
        Ok(()) => PushOutcome::Enqueued,
        Err(_) => PushOutcome::Dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::pin::pin;
    use core::task::Poll;
    use embassy_futures::{block_on, poll_once};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn test_push_or_drop_returns_immediately_when_full() {
        let ch: Channel<NoopRawMutex, u32, 2> = Channel::new();
        let tx = ch.sender();

        assert_eq!(push_or_drop(&tx, 1), PushOutcome::Enqueued);
        assert_eq!(push_or_drop(&tx, 2), PushOutcome::Enqueued);
        assert_eq!(push_or_drop(&tx, 3), PushOutcome::Dropped);

        assert_eq!(ch.len(), 2);
        // FIFO, and the dropped item never made it in.
        assert_eq!(ch.try_receive().unwrap(), 1);
        assert_eq!(ch.try_receive().unwrap(), 2);
        assert!(ch.try_receive().is_err());
    }

    #[test]
    fn test_queue_capacities() {
        let accel: AccelQueue<NoopRawMutex> = Channel::new();
        let baro: BaroQueue<NoopRawMutex> = Channel::new();
        let telemetry: TelemetryQueue<NoopRawMutex> = Channel::new();
        assert_eq!(accel.capacity(), ACCEL_QUEUE_LEN);
        assert_eq!(baro.capacity(), BARO_QUEUE_LEN);
        assert_eq!(telemetry.capacity(), TELEMETRY_QUEUE_LEN);
    }

    #[test]
    fn test_push_blocking_waits_for_space() {
        let ch: Channel<NoopRawMutex, u32, 1> = Channel::new();
        let tx = ch.sender();
        block_on(push_blocking(&tx, 1));

        let mut pending = pin!(push_blocking(&tx, 2));
        assert!(poll_once(pending.as_mut()).is_pending());
        assert!(poll_once(pending.as_mut()).is_pending());
        assert_eq!(ch.len(), 1);

        // Consumer frees a slot, the blocked producer completes.
        assert_eq!(ch.try_receive().unwrap(), 1);
        assert_eq!(poll_once(pending.as_mut()), Poll::Ready(()));
        assert_eq!(ch.try_receive().unwrap(), 2);
    }
}
