//! One-dimensional point-mass vehicle in a standard atmosphere.
//!
//! Up is positive. The vehicle sits on the pad until ignition, burns at
//! constant thrust while its propellant mass falls linearly, then coasts
//! under gravity and quadratic drag. Deploying the parachute swaps the body
//! drag area for the canopy's. Touching the ground after leaving it ends
//! the flight.

pub const STANDARD_GRAVITY: f64 = 9.80665;

const SEA_LEVEL_PRESSURE: f64 = 101_325.0;
const SEA_LEVEL_TEMPERATURE: f64 = 288.15; // K
const TEMP_LAPSE_RATE: f64 = -0.0065; // K / m
const MOLAR_MASS_AIR: f64 = 0.028_964_4; // kg / mol
const GAS_CONSTANT: f64 = 8.314_459_8; // J / (mol K)
const SPECIFIC_GAS_CONSTANT: f64 = GAS_CONSTANT / MOLAR_MASS_AIR;

/// Height above the pad that counts as having left it.
const LIFTOFF_HEIGHT: f64 = 1.0;

/// ISA troposphere temperature in K.
pub fn isa_temperature(altitude_msl: f64) -> f64 {
    SEA_LEVEL_TEMPERATURE + TEMP_LAPSE_RATE * altitude_msl
}

/// ISA troposphere pressure in Pa.
pub fn isa_pressure(altitude_msl: f64) -> f64 {
    let exponent = -STANDARD_GRAVITY * MOLAR_MASS_AIR / (GAS_CONSTANT * TEMP_LAPSE_RATE);
    SEA_LEVEL_PRESSURE * (isa_temperature(altitude_msl) / SEA_LEVEL_TEMPERATURE).powf(exponent)
}

pub fn air_density(altitude_msl: f64) -> f64 {
    isa_pressure(altitude_msl) / (SPECIFIC_GAS_CONSTANT * isa_temperature(altitude_msl))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleParams {
    pub dry_mass_kg: f64,
    pub propellant_mass_kg: f64,
    pub thrust_n: f64,
    pub burn_time_s: f64,
    /// Drag coefficient times reference area, m².
    pub body_drag_area: f64,
    pub chute_drag_area: f64,
    /// Seconds after the start of the simulation.
    pub ignition_s: f64,
    pub site_altitude_msl: f64,
}

impl VehicleParams {
    /// Small high-power rocket that tops out around 1600 m above the pad.
    pub const SPORT: Self = Self {
        dry_mass_kg: 4.0,
        propellant_mass_kg: 1.0,
        thrust_n: 500.0,
        burn_time_s: 2.5,
        body_drag_area: 0.004,
        chute_drag_area: 1.5,
        ignition_s: 2.0,
        site_altitude_msl: flight_core::config::BASE_ALTITUDE_M as f64,
    };
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    params: VehicleParams,
    time_s: f64,
    altitude_agl: f64,
    velocity: f64,
    acceleration: f64,
    chute_deployed_at: Option<f64>,
    left_pad: bool,
    landed_at: Option<f64>,
    apogee: (f64, f64),
}

impl Vehicle {
    pub fn new(params: VehicleParams) -> Self {
        Self {
            params,
            time_s: 0.0,
            altitude_agl: 0.0,
            velocity: 0.0,
            acceleration: 0.0,
            chute_deployed_at: None,
            left_pad: false,
            landed_at: None,
            apogee: (0.0, 0.0),
        }
    }

    fn burning(&self) -> bool {
        let p = &self.params;
        self.time_s >= p.ignition_s && self.time_s < p.ignition_s + p.burn_time_s
    }

    fn mass(&self) -> f64 {
        let p = &self.params;
        let burned = ((self.time_s - p.ignition_s) / p.burn_time_s).clamp(0.0, 1.0);
        p.dry_mass_kg + p.propellant_mass_kg * (1.0 - burned)
    }

    /// Semi-implicit Euler step of `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        if self.landed_at.is_some() {
            self.time_s += dt;
            return;
        }

        let thrust = if self.burning() { self.params.thrust_n } else { 0.0 };
        let drag_area = if self.chute_deployed_at.is_some() {
            self.params.chute_drag_area
        } else {
            self.params.body_drag_area
        };
        let rho = air_density(self.altitude_msl());
        let drag = -0.5 * rho * self.velocity * self.velocity.abs() * drag_area;

        let mut a = (thrust + drag) / self.mass() - STANDARD_GRAVITY;
        if self.altitude_agl <= 0.0 && self.velocity <= 0.0 && a < 0.0 {
            // Resting on the pad.
            a = 0.0;
            self.velocity = 0.0;
        }
        self.acceleration = a;
        self.velocity += a * dt;
        self.altitude_agl += self.velocity * dt;
        self.time_s += dt;

        if self.altitude_agl > LIFTOFF_HEIGHT {
            self.left_pad = true;
        }
        if self.altitude_agl > self.apogee.0 {
            self.apogee = (self.altitude_agl, self.time_s);
        }
        if self.altitude_agl < 0.0 {
            self.altitude_agl = 0.0;
            if self.left_pad {
                self.velocity = 0.0;
                self.acceleration = 0.0;
                self.landed_at = Some(self.time_s);
            } else if self.velocity < 0.0 {
                self.velocity = 0.0;
            }
        }
    }

    /// Returns true the first time it is called.
    pub fn deploy_parachute(&mut self) -> bool {
        if self.chute_deployed_at.is_some() {
            return false;
        }
        self.chute_deployed_at = Some(self.time_s);
        true
    }

    /// What an accelerometer along the long axis reads: +1 g at rest.
    pub fn proper_acceleration(&self) -> f64 {
        self.acceleration + STANDARD_GRAVITY
    }

    pub fn altitude_agl(&self) -> f64 {
        self.altitude_agl
    }

    pub fn altitude_msl(&self) -> f64 {
        self.altitude_agl + self.params.site_altitude_msl
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn pressure(&self) -> f64 {
        isa_pressure(self.altitude_msl())
    }

    /// Ambient temperature in °C.
    pub fn temperature(&self) -> f64 {
        isa_temperature(self.altitude_msl()) - 273.15
    }

    pub fn time(&self) -> f64 {
        self.time_s
    }

    pub fn chute_deployed_at(&self) -> Option<f64> {
        self.chute_deployed_at
    }

    pub fn landed_at(&self) -> Option<f64> {
        self.landed_at
    }

    /// Highest altitude above the pad so far and when it was reached.
    pub fn apogee(&self) -> (f64, f64) {
        self.apogee
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fly(vehicle: &mut Vehicle, until_s: f64) {
        while vehicle.time() < until_s {
            vehicle.step(0.001);
        }
    }

    #[test]
    fn test_standard_atmosphere() {
        assert!((isa_pressure(0.0) - 101_325.0).abs() < 1e-6);
        // Tabulated ISA values.
        assert!((isa_pressure(1000.0) - 89_875.0).abs() < 10.0);
        assert!((isa_temperature(1000.0) - 281.65).abs() < 1e-9);
        assert!((air_density(0.0) - 1.225).abs() < 1e-3);
    }

    #[test]
    fn test_rests_on_pad_before_ignition() {
        let mut v = Vehicle::new(VehicleParams::SPORT);
        fly(&mut v, 1.5);
        assert_eq!(v.altitude_agl(), 0.0);
        assert_eq!(v.velocity(), 0.0);
        assert!((v.proper_acceleration() - STANDARD_GRAVITY).abs() < 1e-9);
        assert!(v.landed_at().is_none());
    }

    #[test]
    fn test_ballistic_flight() {
        let mut v = Vehicle::new(VehicleParams::SPORT);
        fly(&mut v, 3.0);
        assert!(v.velocity() > 0.0);
        assert!(v.proper_acceleration() > 5.0 * STANDARD_GRAVITY);

        fly(&mut v, 10.0);
        // Coasting: drag only, so the accelerometer reads slightly negative.
        assert!(v.proper_acceleration() < 0.0);

        fly(&mut v, 120.0);
        let (apogee, at) = v.apogee();
        assert!(apogee > 1400.0 && apogee < 1800.0, "apogee {}", apogee);
        assert!(at > 15.0 && at < 25.0, "apogee at {}", at);
        assert!(v.landed_at().is_some());
    }

    #[test]
    fn test_parachute_slows_descent() {
        let mut v = Vehicle::new(VehicleParams::SPORT);
        fly(&mut v, 20.0);
        assert!(v.deploy_parachute());
        assert!(!v.deploy_parachute());
        fly(&mut v, 40.0);
        assert!(v.velocity() < 0.0 && v.velocity() > -10.0, "v {}", v.velocity());
    }
}
