use core::cell::Cell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use portable_atomic::{AtomicU32, Ordering};

/// Single-writer snapshot cell.
///
/// The owning task publishes whole `Copy` values; readers always get a
/// complete copy, never a reference into the owner's state. The generation
/// counter lets readers tell a fresh value from one they have already seen.
pub struct DataCell<T: Copy> {
    storage: Mutex<CriticalSectionRawMutex, Cell<T>>,
    generation: AtomicU32,
}

impl<T: Copy> DataCell<T> {
    /// Create a new cell with an initial value.
    pub const fn new(init: T) -> Self {
        Self {
            storage: Mutex::new(Cell::new(init)),
            generation: AtomicU32::new(0),
        }
    }

    /// Publish a new value.
    pub fn update(&self, data: T) {
        self.storage.lock(|cell| {
            cell.set(data);
        });
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Number of updates published so far.
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// Fetch a copy of the latest value.
    pub fn read(&self) -> T {
        self.storage.lock(|cell| cell.get())
    }

    /// Returns the value only if it was published after `seen`.
    pub fn read_if_newer(&self, seen: u32) -> Option<(T, u32)> {
        let generation = self.generation();
        if generation == seen {
            None
        } else {
            Some((self.read(), generation))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FlightPhase, FlightSnapshot};

    #[test]
    fn test_datacell_init() {
        let cell = DataCell::new(42);
        assert_eq!(cell.read(), 42);
        assert_eq!(cell.generation(), 0);
    }

    #[test]
    fn test_datacell_update() {
        let cell = DataCell::new(0);
        cell.update(100);
        assert_eq!(cell.read(), 100);
        assert_eq!(cell.generation(), 1);
    }

    #[test]
    fn test_read_if_newer() {
        let cell = DataCell::new(FlightSnapshot::new());
        assert!(cell.read_if_newer(0).is_none());

        let mut snap = FlightSnapshot::new();
        snap.phase = FlightPhase::Coasting;
        cell.update(snap);

        let (read, generation) = cell.read_if_newer(0).unwrap();
        assert_eq!(read.phase, FlightPhase::Coasting);
        assert!(cell.read_if_newer(generation).is_none());
    }
}
