//! Stochastic simulation of the current-voltage and Shapiro-step response of a
//! noisy, AC and DC driven Josephson junction.
//!
//! Components, bottom-up: [`junction`] (current-phase relation), [`noise`]
//! (Johnson-shot amplitude and its refresh schedule), [`integrator`] (Heun
//! predictor-corrector for one realization) and [`sweep`] (ensemble averaging
//! across a DC bias sweep).

pub mod error;
pub mod integrator;
pub mod junction;
pub mod noise;
pub mod output;
pub mod sweep;

pub use error::{RealizationFailure, SimulationError};
pub use integrator::{GaussianSource, Integrator, StdNormalSource, Trajectory, TrajectorySample, TrajectoryState};
pub use junction::junction_current;
pub use noise::{JohnsonShotNoise, NoiseAmplitudeState, NoiseCadence, NoiseModel, NoiseSchedule, VoltageEstimate};
pub use sweep::{EnsembleAggregator, SweepPlan};
