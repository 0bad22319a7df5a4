use junction_common::SimParams;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::junction::junction_current;
use crate::noise::{NoiseAmplitudeState, NoiseSchedule};

/// Produces independent standard normal draws, one per call.
pub trait GaussianSource {
    fn standard_normal(&mut self) -> f64;
}

/// Seeded production source backed by `StdRng`.
#[derive(Debug, Clone)]
pub struct StdNormalSource {
    rng: StdRng,
}

impl StdNormalSource {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl GaussianSource for StdNormalSource {
    #[inline]
    fn standard_normal(&mut self) -> f64 {
        StandardNormal.sample(&mut self.rng)
    }
}

/// Phase and voltage of one run, plus where it is in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryState {
    pub phase: f64,
    pub voltage: f64,
    pub step: usize,
    pub time: f64,
}

impl TrajectoryState {
    pub fn initial(params: &SimParams) -> Self {
        Self {
            phase: params.phi0,
            voltage: params.v0,
            step: 0,
            time: 0.0,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.phase.is_finite() && self.voltage.is_finite()
    }
}

/// One recorded point of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub tau: f64,
    pub phi: f64,
    pub v: f64,
}

impl From<&TrajectoryState> for TrajectorySample {
    fn from(state: &TrajectoryState) -> Self {
        Self { tau: state.time, phi: state.phase, v: state.voltage }
    }
}

/// Full record of one run: the state after each of the N steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub samples: Vec<TrajectorySample>,
    /// Number of leading samples treated as transient.
    pub discard: usize,
}

impl Trajectory {
    pub fn post_transient(&self) -> &[TrajectorySample] {
        &self.samples[self.discard.min(self.samples.len())..]
    }

    /// Mean voltage over the post-transient samples.
    pub fn mean_voltage(&self) -> Option<f64> {
        let tail = self.post_transient();
        if tail.is_empty() {
            return None;
        }
        Some(tail.iter().map(|s| s.v).sum::<f64>() / tail.len() as f64)
    }

    pub fn final_state(&self) -> Option<&TrajectorySample> {
        self.samples.last()
    }
}

/// Reduced output of one run when the series itself is not needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealizationSummary {
    /// Post-transient mean voltage, the run's measured voltage.
    pub mean_voltage: f64,
    /// Number of samples that went into the mean.
    pub samples: usize,
    pub final_state: TrajectoryState,
    /// Noise amplitude in force at the end of the run.
    pub final_sigma: f64,
}

/// Checks the invariants on `params` that must hold before stepping.
pub fn validate_params(params: &SimParams) -> Result<(), SimulationError> {
    if !(params.dt > 0.0) || !params.dt.is_finite() {
        return Err(SimulationError::invalid("dt", params.dt, "must be finite and > 0"));
    }
    if params.steps == 0 {
        return Err(SimulationError::invalid("steps", 0.0, "must be > 0"));
    }
    if !(0.0..1.0).contains(&params.discard_fraction) {
        return Err(SimulationError::invalid("discard_fraction", params.discard_fraction, "must lie in [0, 1)"));
    }
    if !(0.0..=1.0).contains(&params.fraction_4pi) {
        return Err(SimulationError::invalid("fraction_4pi", params.fraction_4pi, "must lie in [0, 1]"));
    }
    if !(params.beta_c > 0.0) || !params.beta_c.is_finite() {
        return Err(SimulationError::invalid("beta_c", params.beta_c, "must be finite and > 0"));
    }
    let finite = [
        ("gamma_dc", params.gamma_dc),
        ("gamma_ac", params.gamma_ac),
        ("omega", params.omega),
        ("phi0", params.phi0),
        ("v0", params.v0),
    ];
    for (name, value) in finite {
        if !value.is_finite() {
            return Err(SimulationError::invalid(name, value, "must be finite"));
        }
    }
    Ok(())
}

/// Deterministic part of the equations of motion at `(time, phase, voltage)`.
/// Returns `(dphi/dtau, dv/dtau)`.
#[inline(always)]
pub fn drift(params: &SimParams, time: f64, phase: f64, voltage: f64) -> (f64, f64) {
    let drive = params.gamma_dc + params.gamma_ac * (params.omega * time).sin();
    let dv = drive - junction_current(phase, params.fraction_4pi) - voltage / params.beta_c;
    (voltage, dv)
}

/// One Heun predictor-corrector step driven by a single standard normal `xi`.
///
/// The increment `dW = xi sqrt(dt)` enters the predictor and the corrector
/// unchanged; drawing it twice would break strong order 1.
#[inline]
pub fn heun_step(params: &SimParams, state: &TrajectoryState, sigma: f64, xi: f64) -> TrajectoryState {
    let dt = params.dt;
    let noise = sigma * xi * dt.sqrt();

    let (f_phi, f_v) = drift(params, state.time, state.phase, state.voltage);

    // Predictor (explicit Euler)
    let phi_star = state.phase + f_phi * dt;
    let v_star = state.voltage + f_v * dt + noise;

    let t_next = state.time + dt;
    let (f_phi_star, f_v_star) = drift(params, t_next, phi_star, v_star);

    // Corrector (trapezoidal)
    TrajectoryState {
        phase: state.phase + 0.5 * (f_phi + f_phi_star) * dt,
        voltage: state.voltage + 0.5 * (f_v + f_v_star) * dt + noise,
        step: state.step + 1,
        time: t_next,
    }
}

/// Integrates the junction SDE for one parameter set.
///
/// The integrator itself holds no run state: every run threads its own
/// [`TrajectoryState`] and [`NoiseAmplitudeState`] through [`Integrator::step`],
/// so one `Integrator` can be shared by concurrent runs.
#[derive(Debug, Clone)]
pub struct Integrator<'a> {
    params: &'a SimParams,
    noise: &'a NoiseSchedule,
}

impl<'a> Integrator<'a> {
    pub fn new(params: &'a SimParams, noise: &'a NoiseSchedule) -> Result<Self, SimulationError> {
        validate_params(params)?;
        noise.validate()?;
        Ok(Self { params, noise })
    }

    pub fn params(&self) -> &SimParams {
        self.params
    }

    /// Advances one step, consuming exactly one draw from `source`.
    #[inline]
    pub fn step<S: GaussianSource + ?Sized>(
        &self,
        state: TrajectoryState,
        noise_state: NoiseAmplitudeState,
        source: &mut S,
    ) -> Result<(TrajectoryState, NoiseAmplitudeState), SimulationError> {
        let xi = source.standard_normal();
        let next = heun_step(self.params, &state, noise_state.sigma, xi);
        if !next.is_finite() {
            return Err(SimulationError::NumericalDegeneracy {
                step: next.step,
                time: next.time,
                phase: next.phase,
                voltage: next.voltage,
            });
        }
        let next_noise = self.noise.advance(noise_state, next.step, next.voltage);
        Ok((next, next_noise))
    }

    /// Runs all N steps, handing each post-step state to `observe`.
    /// `seed_voltage` is the voltage estimate the initial noise amplitude is derived from.
    pub fn run_with<S, F>(
        &self,
        source: &mut S,
        seed_voltage: f64,
        mut observe: F,
    ) -> Result<(TrajectoryState, NoiseAmplitudeState), SimulationError>
    where
        S: GaussianSource + ?Sized,
        F: FnMut(&TrajectoryState),
    {
        let mut state = TrajectoryState::initial(self.params);
        let mut noise_state = self.noise.start(seed_voltage);
        for _ in 0..self.params.steps {
            let (next, next_noise) = self.step(state, noise_state, source)?;
            observe(&next);
            state = next;
            noise_state = next_noise;
        }
        Ok((state, noise_state))
    }

    /// Runs to completion and keeps the whole `(tau, phi, v)` series.
    pub fn run_trajectory<S: GaussianSource + ?Sized>(
        &self,
        source: &mut S,
        seed_voltage: f64,
    ) -> Result<Trajectory, SimulationError> {
        let mut samples = Vec::with_capacity(self.params.steps);
        self.run_with(source, seed_voltage, |state| samples.push(TrajectorySample::from(state)))?;
        Ok(Trajectory {
            samples,
            discard: self.params.discard_count(),
        })
    }

    /// Runs to completion keeping only the post-transient mean voltage.
    pub fn run_mean_voltage<S: GaussianSource + ?Sized>(
        &self,
        source: &mut S,
        seed_voltage: f64,
    ) -> Result<RealizationSummary, SimulationError> {
        let discard = self.params.discard_count();
        let mut sum = 0.0;
        let mut count = 0usize;
        let (final_state, final_noise) = self.run_with(source, seed_voltage, |state| {
            // state.step is 1-based: sample k is the state after step k.
            if state.step > discard {
                sum += state.voltage;
                count += 1;
            }
        })?;
        Ok(RealizationSummary {
            mean_voltage: sum / count as f64,
            samples: count,
            final_state,
            final_sigma: final_noise.sigma,
        })
    }
}
