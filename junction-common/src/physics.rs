//! SI constants and the physical-to-dimensionless conversions for an RCSJ junction.

use serde::{Deserialize, Serialize};

/// Elementary charge (C).
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;
/// Boltzmann constant (J/K).
pub const BOLTZMANN: f64 = 1.380_649e-23;
/// Reduced Planck constant (J s).
pub const HBAR: f64 = 1.054_571_817e-34;

/// Plasma frequency `sqrt(2 e I_c / (hbar C))` in rad/s.
pub fn plasma_frequency(critical_current: f64, capacitance: f64) -> f64 {
    (2.0 * ELEMENTARY_CHARGE * critical_current / (HBAR * capacitance)).sqrt()
}

/// Damping parameter `omega_p R C` for the plasma-frequency time normalization.
pub fn damping_parameter(plasma_frequency: f64, resistance: f64, capacitance: f64) -> f64 {
    plasma_frequency * resistance * capacitance
}

/// Volts per unit of dimensionless voltage, `hbar omega_p / (2 e)`.
pub fn voltage_scale(plasma_frequency: f64) -> f64 {
    HBAR * plasma_frequency / (2.0 * ELEMENTARY_CHARGE)
}

/// Fixed physical constants consumed by the Johnson-shot noise model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    pub critical_current: f64, // A
    pub resistance: f64,       // Ohm
    pub temperature: f64,      // K
    pub plasma_frequency: f64, // rad/s
    pub voltage_scale: f64,    // V per unit dimensionless voltage
    pub dt: f64,               // dimensionless time step
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn voltage_scale_matches_josephson_relation() {
        // v = 1 corresponds to dphi/dt = omega_p, i.e. V = hbar omega_p / 2e.
        let wp = 2.0e11;
        let flux_quantum = std::f64::consts::PI * HBAR / ELEMENTARY_CHARGE;
        assert_relative_eq!(
            voltage_scale(wp),
            flux_quantum * wp / std::f64::consts::TAU,
            max_relative = 1e-12
        );
    }

    #[test]
    fn plasma_frequency_of_typical_junction() {
        // 1 uA, 1 pF -> roughly 5.5e10 rad/s
        let wp = plasma_frequency(1e-6, 1e-12);
        assert!(wp > 5.0e10 && wp < 6.0e10, "omega_p = {wp}");
    }
}
