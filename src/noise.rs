//! Noise amplitude for the voltage equation.
//!
//! The stochastic increment of one step is `sigma * xi * sqrt(dt)`. For the
//! Johnson-shot model `sigma` depends on the run's own voltage estimate through
//! the spectral density
//!
//! ```text
//! S(V) = 2 e |V| / R * coth(e |V| / (2 k_B T))
//! sigma = sqrt(2 S / (I_c^2 omega_p dt))
//! ```
//!
//! which tends to the Johnson value `4 k_B T / R` at small voltage and to shot
//! noise `2 e |V| / R` at large voltage. The amplitude is carried per run in
//! [`NoiseAmplitudeState`] and refreshed on the cadence chosen in [`NoiseSchedule`].

use junction_common::physics::{BOLTZMANN, ELEMENTARY_CHARGE};
use junction_common::{CadenceType, EstimateType, NoiseConfig, NoiseModeType, NoiseParams};

use crate::error::SimulationError;

/// Below this coth argument the Johnson limit is used directly.
/// `x coth(x) = 1 + x^2 / 3 + ...`, so the error is far below f64 resolution.
const COTH_EPSILON: f64 = 1e-8;

/// Johnson-shot interpolation for a resistively shunted junction.
#[derive(Debug, Clone, PartialEq)]
pub struct JohnsonShotNoise {
    params: NoiseParams,
    /// `2 / (I_c^2 omega_p dt)`, the factor between S and sigma^2.
    density_to_variance: f64,
}

impl JohnsonShotNoise {
    pub fn new(params: NoiseParams) -> Result<Self, SimulationError> {
        if !(params.critical_current > 0.0) {
            return Err(SimulationError::invalid("critical_current", params.critical_current, "must be positive"));
        }
        if !(params.resistance > 0.0) {
            return Err(SimulationError::invalid("resistance", params.resistance, "must be positive"));
        }
        if !(params.temperature >= 0.0) {
            return Err(SimulationError::invalid("temperature", params.temperature, "must not be negative"));
        }
        if !(params.plasma_frequency > 0.0) {
            return Err(SimulationError::invalid("plasma_frequency", params.plasma_frequency, "must be positive"));
        }
        if !(params.dt > 0.0) {
            return Err(SimulationError::invalid("dt", params.dt, "must be positive"));
        }
        let density_to_variance =
            2.0 / (params.critical_current * params.critical_current * params.plasma_frequency * params.dt);
        Ok(Self { params, density_to_variance })
    }

    pub fn params(&self) -> &NoiseParams {
        &self.params
    }

    /// Thermal density `4 k_B T / R`, the zero-voltage limit.
    pub fn johnson_density(&self) -> f64 {
        4.0 * BOLTZMANN * self.params.temperature / self.params.resistance
    }

    /// Current noise spectral density at a dimensionless voltage estimate.
    pub fn spectral_density(&self, voltage: f64) -> f64 {
        let volts = (voltage * self.params.voltage_scale).abs();
        let shot = 2.0 * ELEMENTARY_CHARGE * volts / self.params.resistance;
        if self.params.temperature == 0.0 {
            return shot;
        }
        let x = ELEMENTARY_CHARGE * volts / (2.0 * BOLTZMANN * self.params.temperature);
        if x < COTH_EPSILON {
            return self.johnson_density();
        }
        shot / x.tanh()
    }

    /// Amplitude multiplying `xi * sqrt(dt)` in the voltage update.
    pub fn amplitude(&self, voltage: f64) -> f64 {
        (self.density_to_variance * self.spectral_density(voltage)).sqrt()
    }
}

/// Source of the noise amplitude for one run.
#[derive(Debug, Clone, PartialEq)]
pub enum NoiseModel {
    /// Deterministic dynamics.
    Silent,
    /// Voltage-independent amplitude.
    Constant(f64),
    JohnsonShot(JohnsonShotNoise),
}

impl NoiseModel {
    #[inline]
    pub fn amplitude(&self, voltage: f64) -> f64 {
        match self {
            NoiseModel::Silent => 0.0,
            NoiseModel::Constant(sigma) => *sigma,
            NoiseModel::JohnsonShot(model) => model.amplitude(voltage),
        }
    }

    /// Whether the amplitude depends on the voltage estimate at all.
    pub fn is_voltage_dependent(&self) -> bool {
        matches!(self, NoiseModel::JohnsonShot(_))
    }
}

/// Which running voltage feeds the noise model on a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageEstimate {
    /// The voltage after the most recent step.
    Latest,
    /// Mean voltage over all steps elapsed so far in this run.
    RunningMean,
}

/// When the amplitude is re-derived during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseCadence {
    /// Computed once from the run's seed voltage and held.
    Frozen,
    /// Re-derived after every step.
    EveryStep,
    /// Re-derived after every `k` steps.
    Every(usize),
    /// Held per run at the previous bias point's ensemble mean voltage.
    /// The aggregator supplies that value as the run's seed voltage.
    PreviousRun,
}

/// Per-run noise state, threaded through the integrator's step function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseAmplitudeState {
    pub sigma: f64,
    voltage_sum: f64,
    samples: usize,
}

impl NoiseAmplitudeState {
    pub fn running_mean(&self) -> Option<f64> {
        if self.samples == 0 {
            None
        } else {
            Some(self.voltage_sum / self.samples as f64)
        }
    }
}

/// A noise model plus the rule for refreshing its amplitude during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseSchedule {
    pub model: NoiseModel,
    pub cadence: NoiseCadence,
    pub estimate: VoltageEstimate,
}

impl NoiseSchedule {
    pub fn silent() -> Self {
        Self {
            model: NoiseModel::Silent,
            cadence: NoiseCadence::Frozen,
            estimate: VoltageEstimate::Latest,
        }
    }

    pub fn constant(sigma: f64) -> Self {
        Self {
            model: NoiseModel::Constant(sigma),
            ..Self::silent()
        }
    }

    /// Builds the schedule described by the `[noise]` config section.
    pub fn from_config(config: &NoiseConfig, params: NoiseParams) -> Result<Self, SimulationError> {
        let model = match config.mode {
            NoiseModeType::Off => NoiseModel::Silent,
            NoiseModeType::Constant => NoiseModel::Constant(config.sigma.unwrap_or(0.0)),
            NoiseModeType::JohnsonShot => NoiseModel::JohnsonShot(JohnsonShotNoise::new(params)?),
        };
        let cadence = match config.cadence {
            CadenceType::Frozen => NoiseCadence::Frozen,
            CadenceType::EveryStep => NoiseCadence::EveryStep,
            CadenceType::EveryK => NoiseCadence::Every(config.interval_steps.unwrap_or(1)),
            CadenceType::PreviousRun => NoiseCadence::PreviousRun,
        };
        let estimate = match config.estimate {
            EstimateType::Latest => VoltageEstimate::Latest,
            EstimateType::RunningMean => VoltageEstimate::RunningMean,
        };
        let schedule = Self { model, cadence, estimate };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if let NoiseModel::Constant(sigma) = self.model {
            if !(sigma >= 0.0) || !sigma.is_finite() {
                return Err(SimulationError::invalid("sigma", sigma, "must be finite and non-negative"));
            }
        }
        if self.cadence == NoiseCadence::Every(0) {
            return Err(SimulationError::invalid("interval_steps", 0.0, "must be greater than 0"));
        }
        Ok(())
    }

    /// Amplitude state at the start of a run.
    pub fn start(&self, seed_voltage: f64) -> NoiseAmplitudeState {
        NoiseAmplitudeState {
            sigma: self.model.amplitude(seed_voltage),
            voltage_sum: 0.0,
            samples: 0,
        }
    }

    /// Folds in the voltage after a completed step and refreshes sigma if the
    /// cadence calls for it. `completed_steps` counts the step just taken.
    #[inline]
    pub fn advance(&self, state: NoiseAmplitudeState, completed_steps: usize, voltage: f64) -> NoiseAmplitudeState {
        let mut next = NoiseAmplitudeState {
            sigma: state.sigma,
            voltage_sum: state.voltage_sum + voltage,
            samples: state.samples + 1,
        };
        let refresh = match self.cadence {
            NoiseCadence::Frozen | NoiseCadence::PreviousRun => false,
            NoiseCadence::EveryStep => true,
            NoiseCadence::Every(k) => completed_steps % k == 0,
        };
        if refresh && self.model.is_voltage_dependent() {
            let estimate = match self.estimate {
                VoltageEstimate::Latest => voltage,
                VoltageEstimate::RunningMean => next.running_mean().unwrap_or(voltage),
            };
            next.sigma = self.model.amplitude(estimate);
        }
        next
    }
}
