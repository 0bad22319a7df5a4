use junction_common::{RunLength, ShapiroMap, SimParams, SweepPoint, SweepResult};
use log::{debug, info, trace, warn};
use rayon::prelude::*;
use std::time::Instant;

use crate::error::{RealizationFailure, SimulationError};
use crate::integrator::{validate_params, Integrator, StdNormalSource, Trajectory};
use crate::noise::{NoiseCadence, NoiseSchedule};

/// What to sweep and how many realizations to average at each bias point.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    /// DC bias points, in the order they appear in the output.
    pub bias_points: Vec<f64>,
    /// Independent realizations per bias point (M).
    pub realizations: usize,
    pub run_length: RunLength,
    pub base_seed: u64,
    /// Fan realizations out over the rayon pool; otherwise run them in a plain loop.
    pub parallel: bool,
}

/// Seed for one realization, a splitmix64 mix of its position in the sweep.
/// Depends only on the indices, never on execution order.
pub fn realization_seed(base_seed: u64, amplitude_index: usize, bias_index: usize, realization: usize) -> u64 {
    let mut z = base_seed
        .wrapping_add((amplitude_index as u64).wrapping_mul(0xD1B5_4A32_D192_ED03))
        .wrapping_add((bias_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add((realization as u64 + 1).wrapping_mul(0xBF58_476D_1CE4_E5B9));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Running mean and variance (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnsembleStats {
    count: usize,
    mean: f64,
    m2: f64,
}

impl EnsembleStats {
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Unbiased sample variance.
    pub fn variance(&self) -> Option<f64> {
        (self.count > 1).then(|| self.m2 / (self.count - 1) as f64)
    }
}

/// Reduces one bias point's realization outcomes into a sweep point.
/// Failed realizations are excluded and counted.
pub fn summarize_point(
    gamma_dc: f64,
    outcomes: &[Result<f64, RealizationFailure>],
) -> SweepPoint {
    let mut stats = EnsembleStats::default();
    let mut failed = 0;
    for outcome in outcomes {
        match outcome {
            Ok(v) => stats.push(*v),
            Err(failure) => {
                warn!("Excluding from ensemble: {}", failure);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        warn!(
            "Bias point gamma_dc = {:.4}: effective ensemble size reduced to {} of {}.",
            gamma_dc,
            stats.count(),
            outcomes.len()
        );
    }
    SweepPoint {
        gamma_dc,
        mean_voltage: stats.mean(),
        variance: stats.variance(),
        realizations: stats.count(),
        failed,
    }
}

/// Drives the integrator over a DC sweep, averaging an ensemble at each bias point.
pub struct EnsembleAggregator<'a> {
    base: &'a SimParams,
    noise: &'a NoiseSchedule,
    plan: &'a SweepPlan,
}

impl<'a> EnsembleAggregator<'a> {
    /// Validates everything that can be checked before any realization starts.
    /// `base.steps` is ignored in favour of `plan.run_length`.
    pub fn new(
        base: &'a SimParams,
        noise: &'a NoiseSchedule,
        plan: &'a SweepPlan,
    ) -> Result<Self, SimulationError> {
        if plan.realizations == 0 {
            return Err(SimulationError::invalid("realizations", 0.0, "must be >= 1"));
        }
        if let Some(&g) = plan.bias_points.iter().find(|g| !g.is_finite()) {
            return Err(SimulationError::invalid("gamma_dc", g, "must be finite"));
        }
        noise.validate()?;
        let aggregator = Self { base, noise, plan };
        validate_params(&aggregator.params_at(base.gamma_ac)?)?;
        Ok(aggregator)
    }

    /// Base parameters at an AC amplitude, with the step count resolved from the run length.
    fn params_at(&self, gamma_ac: f64) -> Result<SimParams, SimulationError> {
        let steps = self
            .plan
            .run_length
            .steps(self.base.dt, self.base.omega)
            .ok_or_else(|| SimulationError::invalid("run_length", self.base.omega, "cannot be resolved to a positive step count"))?;
        let params = self.base.with_gamma_ac(gamma_ac).with_steps(steps);
        if params.has_ac_drive() {
            let period = std::f64::consts::TAU / params.omega;
            if params.total_time() < period {
                warn!(
                    "Run length {:.3} covers less than one AC period ({:.3}); post-transient averages will be biased.",
                    params.total_time(),
                    period
                );
            }
        }
        Ok(params)
    }

    /// DC sweep at the base AC amplitude.
    pub fn run(&self) -> Result<SweepResult, SimulationError> {
        self.run_at_amplitude(0, self.base.gamma_ac)
    }

    /// One DC sweep per AC amplitude, in the given order.
    pub fn run_shapiro_map(&self, gamma_ac_values: &[f64]) -> Result<ShapiroMap, SimulationError> {
        let mut rows = Vec::with_capacity(gamma_ac_values.len());
        for (amplitude_index, &gamma_ac) in gamma_ac_values.iter().enumerate() {
            info!(
                "Shapiro map row {}/{}: gamma_ac = {:.4}",
                amplitude_index + 1,
                gamma_ac_values.len(),
                gamma_ac
            );
            rows.push(self.run_at_amplitude(amplitude_index, gamma_ac)?);
        }
        Ok(ShapiroMap { omega: self.base.omega, rows })
    }

    fn run_at_amplitude(&self, amplitude_index: usize, gamma_ac: f64) -> Result<SweepResult, SimulationError> {
        let params = self.params_at(gamma_ac)?;
        validate_params(&params)?;
        info!(
            "Sweeping {} bias points x {} realizations ({} steps each, dt = {}).",
            self.plan.bias_points.len(),
            self.plan.realizations,
            params.steps,
            params.dt
        );
        debug!("Sweep parameters: {:#?}", params);

        let start_time = Instant::now();
        let points = match self.noise.cadence {
            NoiseCadence::PreviousRun => self.run_chained(&params, amplitude_index),
            _ => self.run_independent(&params, amplitude_index),
        };
        info!(
            "Sweep at gamma_ac = {:.4} finished in {:.3} s ({} failed realizations).",
            gamma_ac,
            start_time.elapsed().as_secs_f64(),
            points.iter().map(|p| p.failed).sum::<usize>()
        );

        Ok(SweepResult {
            gamma_ac,
            omega: params.omega,
            points,
        })
    }

    /// Every (bias point x realization) pair is an independent job.
    fn run_independent(&self, params: &SimParams, amplitude_index: usize) -> Vec<SweepPoint> {
        let m = self.plan.realizations;
        let jobs = self.plan.bias_points.len() * m;
        let job = |j: usize| {
            let (bias_index, realization) = (j / m, j % m);
            self.run_realization(params, amplitude_index, bias_index, realization, params.v0)
        };
        // Indexed collect keeps job order, so the reduction below is the same
        // whichever worker finished first.
        let outcomes: Vec<Result<f64, RealizationFailure>> = if self.plan.parallel {
            (0..jobs).into_par_iter().map(job).collect()
        } else {
            (0..jobs).map(job).collect()
        };

        self.plan
            .bias_points
            .iter()
            .zip(outcomes.chunks(m))
            .map(|(&gamma_dc, chunk)| {
                let point = summarize_point(gamma_dc, chunk);
                log_point(&point);
                point
            })
            .collect()
    }

    /// Bias points in sweep order, each seeding its noise amplitude with the
    /// previous point's ensemble mean. Realizations within a point stay independent.
    fn run_chained(&self, params: &SimParams, amplitude_index: usize) -> Vec<SweepPoint> {
        let mut seed_voltage = params.v0;
        let mut points = Vec::with_capacity(self.plan.bias_points.len());
        for bias_index in 0..self.plan.bias_points.len() {
            let point = self.run_point(params, amplitude_index, bias_index, seed_voltage);
            log_point(&point);
            if let Some(mean) = point.mean_voltage {
                seed_voltage = mean;
            }
            points.push(point);
        }
        points
    }

    /// All realizations of one bias point, started from a shared seed voltage.
    fn run_point(&self, params: &SimParams, amplitude_index: usize, bias_index: usize, seed_voltage: f64) -> SweepPoint {
        let m = self.plan.realizations;
        let realization = |r: usize| self.run_realization(params, amplitude_index, bias_index, r, seed_voltage);
        let outcomes: Vec<Result<f64, RealizationFailure>> = if self.plan.parallel {
            (0..m).into_par_iter().map(realization).collect()
        } else {
            (0..m).map(realization).collect()
        };
        summarize_point(self.plan.bias_points[bias_index], &outcomes)
    }

    /// Seed voltage a bias point receives from the chain before it: the last
    /// surviving ensemble mean, or `v0` when there is none.
    fn chained_seed_voltage(&self, params: &SimParams, amplitude_index: usize, bias_index: usize) -> f64 {
        let mut seed_voltage = params.v0;
        for earlier in 0..bias_index {
            if let Some(mean) = self.run_point(params, amplitude_index, earlier, seed_voltage).mean_voltage {
                seed_voltage = mean;
            }
        }
        seed_voltage
    }

    fn run_realization(
        &self,
        params: &SimParams,
        amplitude_index: usize,
        bias_index: usize,
        realization: usize,
        seed_voltage: f64,
    ) -> Result<f64, RealizationFailure> {
        let gamma_dc = self.plan.bias_points[bias_index];
        let fail = |source| RealizationFailure { bias_index, realization, gamma_dc, source };
        let run_params = params.with_gamma_dc(gamma_dc);
        let integrator = Integrator::new(&run_params, self.noise).map_err(fail)?;
        let seed = realization_seed(self.plan.base_seed, amplitude_index, bias_index, realization);
        let mut source = StdNormalSource::new(seed);
        let summary = integrator.run_mean_voltage(&mut source, seed_voltage).map_err(fail)?;
        trace!(
            "gamma_dc = {:.4} realization {} -> <v> = {:.6} (sigma = {:.4e})",
            gamma_dc,
            realization,
            summary.mean_voltage,
            summary.final_sigma
        );
        Ok(summary.mean_voltage)
    }

    /// Full `(tau, phi, v)` series of the realization that [`Self::run`] averages
    /// at `bias_index`, with the same draws and the same initial noise amplitude.
    ///
    /// Under [`NoiseCadence::PreviousRun`] the bias points before `bias_index`
    /// are re-run to recover the seed voltage the sweep handed on.
    pub fn record_trajectory(&self, bias_index: usize, realization: usize) -> Result<Trajectory, SimulationError> {
        let gamma_dc = *self
            .plan
            .bias_points
            .get(bias_index)
            .ok_or_else(|| SimulationError::invalid("bias_index", bias_index as f64, "out of range"))?;
        let sweep_params = self.params_at(self.base.gamma_ac)?;
        let seed_voltage = match self.noise.cadence {
            NoiseCadence::PreviousRun => {
                debug!("Replaying {} bias points to recover the chained seed voltage.", bias_index);
                self.chained_seed_voltage(&sweep_params, 0, bias_index)
            }
            _ => sweep_params.v0,
        };
        let params = sweep_params.with_gamma_dc(gamma_dc);
        let integrator = Integrator::new(&params, self.noise)?;
        let seed = realization_seed(self.plan.base_seed, 0, bias_index, realization);
        integrator.run_trajectory(&mut StdNormalSource::new(seed), seed_voltage)
    }
}

fn log_point(point: &SweepPoint) {
    match point.mean_voltage {
        Some(v) => info!(
            "gamma_dc = {:8.4} | <v> = {:10.6} | std err = {:.2e} | M = {}",
            point.gamma_dc,
            v,
            point.std_error().unwrap_or(0.0),
            point.realizations
        ),
        None => warn!(
            "gamma_dc = {:8.4} | no surviving realizations ({} failed)",
            point.gamma_dc, point.failed
        ),
    }
}
