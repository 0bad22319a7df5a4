use serde::{Deserialize, Serialize};

/// One point of a characteristic curve: the ensemble-averaged voltage at a DC bias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    /// Normalized DC bias at which the ensemble was run.
    pub gamma_dc: f64,
    /// Mean post-transient dimensionless voltage across surviving realizations.
    /// `None` when every realization at this bias failed.
    pub mean_voltage: Option<f64>,
    /// Unbiased sample variance of the per-realization voltages (needs two or more realizations).
    pub variance: Option<f64>,
    /// Effective ensemble size after excluding failed realizations.
    pub realizations: usize,
    /// Realizations dropped because they hit a numerical degeneracy.
    pub failed: usize,
}

impl SweepPoint {
    /// Standard error of the mean, when a variance is available.
    pub fn std_error(&self) -> Option<f64> {
        self.variance
            .map(|var| (var / self.realizations as f64).sqrt())
    }
}

/// The I-V data product: one point per bias, in sweep order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    /// AC amplitude the sweep was run at.
    pub gamma_ac: f64,
    /// AC angular frequency the sweep was run at (0 for a pure DC sweep).
    pub omega: f64,
    pub points: Vec<SweepPoint>,
}

impl SweepResult {
    pub fn gamma_dc_values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.gamma_dc).collect()
    }

    /// `(gamma_dc, mean voltage)` pairs, skipping points with no surviving realization.
    pub fn curve(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .filter_map(|p| p.mean_voltage.map(|v| (p.gamma_dc, v)))
            .collect()
    }

    /// Mean voltage expressed in units of the drive frequency, `v / omega`.
    /// Integer values mark Shapiro steps. Empty without an AC drive.
    pub fn step_index(&self) -> Vec<(f64, f64)> {
        if !(self.omega > 0.0) {
            return Vec::new();
        }
        self.curve()
            .into_iter()
            .map(|(g, v)| (g, v / self.omega))
            .collect()
    }

    pub fn total_failed(&self) -> usize {
        self.points.iter().map(|p| p.failed).sum()
    }
}

/// A set of DC sweeps, one per AC amplitude, at a common drive frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapiroMap {
    pub omega: f64,
    pub rows: Vec<SweepResult>,
}

impl ShapiroMap {
    pub fn gamma_ac_values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.gamma_ac).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(gamma_dc: f64, mean_voltage: Option<f64>) -> SweepPoint {
        SweepPoint {
            gamma_dc,
            mean_voltage,
            variance: Some(0.04),
            realizations: 4,
            failed: 0,
        }
    }

    #[test]
    fn curve_skips_empty_points() {
        let result = SweepResult {
            gamma_ac: 0.0,
            omega: 0.0,
            points: vec![point(0.0, Some(0.0)), point(1.0, None), point(2.0, Some(1.9))],
        };
        assert_eq!(result.curve(), vec![(0.0, 0.0), (2.0, 1.9)]);
        assert!(result.step_index().is_empty());
    }

    #[test]
    fn step_index_scales_by_omega() {
        let result = SweepResult {
            gamma_ac: 0.8,
            omega: 0.5,
            points: vec![point(1.2, Some(1.0))],
        };
        assert_eq!(result.step_index(), vec![(1.2, 2.0)]);
    }

    #[test]
    fn std_error_uses_effective_count() {
        let p = point(1.0, Some(1.0));
        approx::assert_relative_eq!(p.std_error().unwrap(), 0.1, max_relative = 1e-12);
    }
}
