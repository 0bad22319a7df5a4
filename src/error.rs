use thiserror::Error;

/// Failures raised by the numerical core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// Rejected before any stepping begins.
    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    /// The state left the finite reals after a step.
    #[error("non-finite state after step {step} (tau = {time}): phase = {phase}, voltage = {voltage}")]
    NumericalDegeneracy {
        step: usize,
        time: f64,
        phase: f64,
        voltage: f64,
    },
}

impl SimulationError {
    pub(crate) fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        SimulationError::InvalidParameter { name, value, reason }
    }
}

/// A realization that did not complete, tagged with where it belongs in the sweep.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("realization {realization} at bias point {bias_index} (gamma_dc = {gamma_dc}) failed: {source}")]
pub struct RealizationFailure {
    pub bias_index: usize,
    pub realization: usize,
    pub gamma_dc: f64,
    #[source]
    pub source: SimulationError,
}
