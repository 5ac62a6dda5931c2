//! Simulated hardware: clock, delay, sensors and the ejection pin, all
//! looking at one shared `World`.
use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use embassy_time::{Duration, Instant};
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;
use flight_core::{Accelerometer, Barometer, Clock, ConversionKind, SensorError, info};

use crate::physics::{STANDARD_GRAVITY, Vehicle};

/// Physics integration step.
pub const PHYSICS_STEP: Duration = Duration::from_millis(1);

/// Shared simulated time. Only moves forward.
#[derive(Clone)]
pub struct SimClock(Rc<Cell<Instant>>);

impl SimClock {
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(Instant::from_ticks(0))))
    }

    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }

    pub fn advance_to(&self, to: Instant) {
        if to > self.0.get() {
            self.0.set(to);
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        self.0.get()
    }
}

/// A wait costs simulated time and nothing else.
pub struct SimDelay(pub SimClock);

impl DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.0.advance(Duration::from_nanos(ns as u64));
    }
}

pub struct World {
    vehicle: Vehicle,
    time: Instant,
}

pub type SharedWorld = Rc<RefCell<World>>;

impl World {
    pub fn shared(vehicle: Vehicle) -> SharedWorld {
        Rc::new(RefCell::new(Self {
            vehicle,
            time: Instant::from_ticks(0),
        }))
    }

    /// Integrates the vehicle up to `now`.
    pub fn sync(&mut self, now: Instant) {
        let dt = PHYSICS_STEP.as_micros() as f64 / 1e6;
        while self.time + PHYSICS_STEP <= now {
            self.vehicle.step(dt);
            self.time += PHYSICS_STEP;
        }
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    pub fn vehicle_mut(&mut self) -> &mut Vehicle {
        &mut self.vehicle
    }
}

/// Accelerometer on the long axis, quantised like a ±16 g, 2048 LSB/g part.
pub struct SimAccelerometer {
    world: SharedWorld,
    clock: SimClock,
}

impl SimAccelerometer {
    const LSB_PER_G: f64 = 2048.0;

    pub fn new(world: SharedWorld, clock: SimClock) -> Self {
        Self { world, clock }
    }
}

impl Accelerometer for SimAccelerometer {
    async fn read_axis_acceleration(&mut self) -> Result<f32, SensorError> {
        let mut world = self.world.borrow_mut();
        world.sync(self.clock.now());
        let counts = (world.vehicle().proper_acceleration() / STANDARD_GRAVITY * Self::LSB_PER_G)
            .round()
            .clamp(i16::MIN as f64, i16::MAX as f64);
        Ok((counts / Self::LSB_PER_G * STANDARD_GRAVITY) as f32)
    }
}

/// Half-open window of simulated time during which the barometer is dead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    pub from: Instant,
    pub until: Instant,
}

impl Dropout {
    pub fn contains(&self, t: Instant) -> bool {
        t >= self.from && t < self.until
    }
}

/// Two-phase barometer. The value is latched when a conversion starts,
/// like the real part; inside a dropout window every bus access fails.
pub struct SimBarometer {
    world: SharedWorld,
    clock: SimClock,
    dropouts: Vec<Dropout>,
    pending: Option<(ConversionKind, f32)>,
}

impl SimBarometer {
    const CONVERSION_WAIT_MS: u32 = 5;

    pub fn new(world: SharedWorld, clock: SimClock, dropouts: Vec<Dropout>) -> Self {
        Self {
            world,
            clock,
            dropouts,
            pending: None,
        }
    }

    fn check_bus(&self) -> Result<(), SensorError> {
        let now = self.clock.now();
        if self.dropouts.iter().any(|d| d.contains(now)) {
            return Err(SensorError::Timeout);
        }
        Ok(())
    }
}

impl Barometer for SimBarometer {
    async fn start_conversion(&mut self, kind: ConversionKind) -> Result<u32, SensorError> {
        self.pending = None;
        self.check_bus()?;
        let mut world = self.world.borrow_mut();
        world.sync(self.clock.now());
        let vehicle = world.vehicle();
        let value = match kind {
            ConversionKind::Temperature => vehicle.temperature(),
            ConversionKind::Pressure => vehicle.pressure(),
        };
        self.pending = Some((kind, value as f32));
        Ok(Self::CONVERSION_WAIT_MS)
    }

    async fn read_result(&mut self, kind: ConversionKind) -> Result<f32, SensorError> {
        self.check_bus()?;
        match self.pending.take() {
            Some((pending, value)) if pending == kind => Ok(value),
            _ => Err(SensorError::ConversionFailed),
        }
    }
}

/// Ejection line. Driving it high opens the parachute.
pub struct SimPin {
    world: SharedWorld,
    clock: SimClock,
    high: bool,
    edges: u32,
}

impl SimPin {
    pub fn new(world: SharedWorld, clock: SimClock) -> Self {
        Self {
            world,
            clock,
            high: false,
            edges: 0,
        }
    }

    pub fn is_high(&self) -> bool {
        self.high
    }

    /// Level changes seen so far.
    pub fn edges(&self) -> u32 {
        self.edges
    }

    fn set(&mut self, high: bool) {
        if high != self.high {
            self.edges += 1;
        }
        self.high = high;
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set(true);
        let mut world = self.world.borrow_mut();
        world.sync(self.clock.now());
        if world.vehicle_mut().deploy_parachute() {
            info!(
                "Parachute out at {:.1} m AGL, {:.1} m/s",
                world.vehicle().altitude_agl(),
                world.vehicle().velocity()
            );
        }
        Ok(())
    }
}
