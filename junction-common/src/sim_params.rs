use serde::{Deserialize, Serialize};

/// Dimensionless parameters for one integration run, derived from the configuration.
/// Time is measured in units of the inverse plasma frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    // Drive
    pub gamma_dc: f64, // DC bias, normalized to the critical current
    pub gamma_ac: f64, // AC drive amplitude, normalized to the critical current
    pub omega: f64,    // AC angular frequency, normalized to the plasma frequency

    // Junction
    pub beta_c: f64,       // Damping parameter
    pub fraction_4pi: f64, // Share of 4pi-periodic conduction, in [0, 1]

    // Time
    pub dt: f64,
    pub steps: usize,
    pub discard_fraction: f64, // Leading share of samples dropped before averaging

    // Initial conditions
    pub phi0: f64,
    pub v0: f64,
}

impl SimParams {
    /// Returns a copy biased at a different DC drive.
    pub fn with_gamma_dc(&self, gamma_dc: f64) -> Self {
        Self { gamma_dc, ..self.clone() }
    }

    /// Returns a copy with a different AC amplitude.
    pub fn with_gamma_ac(&self, gamma_ac: f64) -> Self {
        Self { gamma_ac, ..self.clone() }
    }

    pub fn with_steps(&self, steps: usize) -> Self {
        Self { steps, ..self.clone() }
    }

    /// Number of leading samples dropped as transient, `floor(d * N)`.
    pub fn discard_count(&self) -> usize {
        (self.discard_fraction * self.steps as f64).floor() as usize
    }

    /// Simulated dimensionless duration `N * dt`.
    pub fn total_time(&self) -> f64 {
        self.steps as f64 * self.dt
    }

    pub fn has_ac_drive(&self) -> bool {
        self.gamma_ac != 0.0 && self.omega > 0.0
    }
}

/// How long each realization runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunLength {
    /// Fixed number of integration steps.
    Steps(usize),
    /// Dimensionless duration, rounded up to whole steps.
    Duration(f64),
    /// Whole number of AC drive periods `2 pi / omega`, rounded up to whole steps.
    AcPeriods(f64),
}

impl RunLength {
    /// Resolves to a step count, or `None` when the length cannot be expressed
    /// with the given time step and drive frequency.
    pub fn steps(&self, dt: f64, omega: f64) -> Option<usize> {
        if !(dt > 0.0) || !dt.is_finite() {
            return None;
        }
        let duration = match *self {
            RunLength::Steps(n) => return if n > 0 { Some(n) } else { None },
            RunLength::Duration(t) => t,
            RunLength::AcPeriods(periods) => {
                if !(omega > 0.0) {
                    return None;
                }
                periods * std::f64::consts::TAU / omega
            }
        };
        if !(duration > 0.0) || !duration.is_finite() {
            return None;
        }
        // Round-off in duration / dt must not add a whole extra step.
        Some(((duration / dt) - 1e-9).ceil().max(1.0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SimParams {
        SimParams {
            gamma_dc: 0.5,
            gamma_ac: 0.0,
            omega: 0.0,
            beta_c: 1.0,
            fraction_4pi: 0.0,
            dt: 0.01,
            steps: 1000,
            discard_fraction: 0.25,
            phi0: 0.0,
            v0: 0.0,
        }
    }

    #[test]
    fn discard_count_floors() {
        let mut p = params();
        assert_eq!(p.discard_count(), 250);
        p.steps = 7;
        p.discard_fraction = 0.5;
        assert_eq!(p.discard_count(), 3);
    }

    #[test]
    fn ac_periods_resolve_to_whole_steps() {
        let steps = RunLength::AcPeriods(10.0).steps(0.01, std::f64::consts::TAU).unwrap();
        assert_eq!(steps, 1000);
        assert_eq!(RunLength::AcPeriods(10.0).steps(0.01, 0.0), None);
    }

    #[test]
    fn duration_rounds_up() {
        assert_eq!(RunLength::Duration(1.005).steps(0.01, 0.0), Some(101));
        assert_eq!(RunLength::Steps(0).steps(0.01, 0.0), None);
        assert_eq!(RunLength::Duration(5.0).steps(0.0, 0.0), None);
    }

    #[test]
    fn builders_only_touch_their_field() {
        let p = params();
        let q = p.with_gamma_dc(2.0).with_gamma_ac(0.3);
        assert_eq!(q.gamma_dc, 2.0);
        assert_eq!(q.gamma_ac, 0.3);
        assert_eq!(q.beta_c, p.beta_c);
        assert_eq!(q.steps, p.steps);
    }
}
