use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::physics::{self, NoiseParams};
use crate::sim_params::{RunLength, SimParams};
use std::path::Path;

// Physical junction properties
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct JunctionConfig {
    pub critical_current_a: f64,
    pub resistance_ohm: f64,
    pub capacitance_f: f64,
    pub temperature_k: f64,
    #[serde(default)]
    pub fraction_4pi: f64, // Share of 4pi-periodic conduction
    #[serde(default)]
    pub beta_c: Option<f64>, // Overrides the value derived from R and C
}

// AC drive; the whole section may be omitted for a pure DC sweep
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct DriveConfig {
    #[serde(default)]
    pub gamma_ac: f64,
    #[serde(default)]
    pub omega: Option<f64>, // Dimensionless angular frequency
    #[serde(default)]
    pub frequency_hz: Option<f64>, // Physical frequency, converted with omega_p
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub dt: f64,
    #[serde(default)]
    pub steps: Option<usize>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub ac_periods: Option<f64>,
    #[serde(default = "default_discard_fraction")]
    pub discard_fraction: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InitialConditions {
    #[serde(default)]
    pub phi0: f64,
    #[serde(default)]
    pub v0: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseModeType {
    Off,
    Constant,
    JohnsonShot,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CadenceType {
    Frozen,
    EveryStep,
    EveryK,
    PreviousRun,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateType {
    Latest,
    RunningMean,
}

#[derive(Deserialize, Debug, Clone, Serialize)]
pub struct NoiseConfig {
    #[serde(default = "default_noise_mode")]
    pub mode: NoiseModeType,
    #[serde(default)]
    pub sigma: Option<f64>, // Used when mode == constant
    #[serde(default = "default_cadence")]
    pub cadence: CadenceType,
    #[serde(default)]
    pub interval_steps: Option<usize>, // Used when cadence == every_k
    #[serde(default = "default_estimate")]
    pub estimate: EstimateType,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        NoiseConfig {
            mode: NoiseModeType::Off,
            sigma: None,
            cadence: CadenceType::Frozen,
            interval_steps: None,
            estimate: EstimateType::RunningMean,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SweepConfig {
    #[serde(default)]
    pub gamma_dc_start: f64,
    #[serde(default)]
    pub gamma_dc_stop: f64,
    #[serde(default)]
    pub points: usize,
    #[serde(default)]
    pub gamma_dc_values: Option<Vec<f64>>, // Explicit list, takes precedence over start/stop/points
    #[serde(default = "default_realizations")]
    pub realizations: usize,
    #[serde(default)]
    pub gamma_ac_values: Option<Vec<f64>>, // Present -> Shapiro map over these amplitudes
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
    #[serde(default)]
    pub save_csv: bool,
    #[serde(default)]
    pub save_trajectory: bool, // Full (tau, phi, v) series of one realization
}

fn default_discard_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    0x5EED_1C0D
}

fn default_noise_mode() -> NoiseModeType {
    NoiseModeType::Off
}

fn default_cadence() -> CadenceType {
    CadenceType::Frozen
}

fn default_estimate() -> EstimateType {
    EstimateType::RunningMean
}

fn default_realizations() -> usize {
    1
}

fn default_parallel() -> bool {
    true
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub junction: JunctionConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    pub timing: TimingConfig,
    pub initial_conditions: InitialConditions,
    #[serde(default)]
    pub noise: NoiseConfig,
    pub sweep: SweepConfig,
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let j = &self.junction;
        if j.critical_current_a <= 0.0 {
            anyhow::bail!("critical_current_a must be positive.");
        }
        if j.resistance_ohm <= 0.0 {
            anyhow::bail!("resistance_ohm must be positive.");
        }
        if j.capacitance_f <= 0.0 {
            anyhow::bail!("capacitance_f must be positive.");
        }
        if j.temperature_k < 0.0 {
            anyhow::bail!("temperature_k must not be negative.");
        }
        if self.drive.omega.is_some() && self.drive.frequency_hz.is_some() {
            anyhow::bail!("Set either drive.omega or drive.frequency_hz, not both.");
        }
        let lengths = [
            self.timing.steps.is_some(),
            self.timing.duration.is_some(),
            self.timing.ac_periods.is_some(),
        ];
        if lengths.iter().filter(|set| **set).count() != 1 {
            anyhow::bail!("Exactly one of timing.steps, timing.duration, timing.ac_periods must be set.");
        }
        if self.noise.mode == NoiseModeType::Constant && self.noise.sigma.is_none() {
            anyhow::bail!("noise.sigma is required when noise.mode = \"constant\".");
        }
        if self.noise.cadence == CadenceType::EveryK && self.noise.interval_steps.unwrap_or(0) == 0 {
            anyhow::bail!("noise.interval_steps must be > 0 when noise.cadence = \"every_k\".");
        }
        if self.sweep.realizations == 0 {
            anyhow::bail!("sweep.realizations must be greater than 0.");
        }
        if self.sweep.gamma_dc_values.is_none() && self.sweep.points == 0 {
            anyhow::bail!("sweep.points must be greater than 0 when gamma_dc_values is not given.");
        }
        // dt, discard_fraction and fraction_4pi are range-checked again by the integrator.
        Ok(())
    }

    pub fn plasma_frequency(&self) -> f64 {
        physics::plasma_frequency(self.junction.critical_current_a, self.junction.capacitance_f)
    }

    /// Dimensionless AC angular frequency, 0 when no drive frequency is configured.
    pub fn omega(&self) -> f64 {
        match (self.drive.omega, self.drive.frequency_hz) {
            (Some(omega), _) => omega,
            (None, Some(f)) => std::f64::consts::TAU * f / self.plasma_frequency(),
            (None, None) => 0.0,
        }
    }

    pub fn run_length(&self) -> RunLength {
        match (self.timing.steps, self.timing.duration, self.timing.ac_periods) {
            (Some(n), _, _) => RunLength::Steps(n),
            (None, Some(t), _) => RunLength::Duration(t),
            (None, None, Some(p)) => RunLength::AcPeriods(p),
            // validate() guarantees one is set
            (None, None, None) => RunLength::Steps(0),
        }
    }

    /// DC bias points in sweep order.
    pub fn gamma_dc_values(&self) -> Vec<f64> {
        if let Some(values) = &self.sweep.gamma_dc_values {
            return values.clone();
        }
        let s = &self.sweep;
        if s.points == 1 {
            return vec![s.gamma_dc_start];
        }
        let step = (s.gamma_dc_stop - s.gamma_dc_start) / (s.points - 1) as f64;
        (0..s.points).map(|i| s.gamma_dc_start + step * i as f64).collect()
    }

    /// Converts the configuration into the dimensionless parameters used at runtime.
    /// `gamma_dc` is set to the first sweep point.
    pub fn get_sim_params(&self) -> Result<SimParams> {
        let omega_p = self.plasma_frequency();
        let beta_c = self.junction.beta_c.unwrap_or_else(|| {
            physics::damping_parameter(omega_p, self.junction.resistance_ohm, self.junction.capacitance_f)
        });
        let omega = self.omega();
        let dt = self.timing.dt;

        let steps = self.run_length().steps(dt, omega).ok_or_else(|| {
            anyhow::anyhow!(
                "Run length {:?} cannot be resolved with dt = {} and omega = {}.",
                self.run_length(), dt, omega
            )
        })?;

        let gamma_dc = self.gamma_dc_values().first().copied().unwrap_or(0.0);

        Ok(SimParams {
            gamma_dc,
            gamma_ac: self.drive.gamma_ac,
            omega,
            beta_c,
            fraction_4pi: self.junction.fraction_4pi,
            dt,
            steps,
            discard_fraction: self.timing.discard_fraction,
            phi0: self.initial_conditions.phi0,
            v0: self.initial_conditions.v0,
        })
    }

    /// Physical constants for the Johnson-shot noise model.
    pub fn get_noise_params(&self) -> NoiseParams {
        let omega_p = self.plasma_frequency();
        NoiseParams {
            critical_current: self.junction.critical_current_a,
            resistance: self.junction.resistance_ohm,
            temperature: self.junction.temperature_k,
            plasma_frequency: omega_p,
            voltage_scale: physics::voltage_scale(omega_p),
            dt: self.timing.dt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE: &str = r#"
        [junction]
        critical_current_a = 1.0e-6
        resistance_ohm = 10.0
        capacitance_f = 1.0e-12
        temperature_k = 4.2

        [drive]
        gamma_ac = 0.8
        omega = 1.0

        [timing]
        dt = 0.05
        ac_periods = 100.0

        [initial_conditions]
        seed = 7

        [noise]
        mode = "johnson_shot"
        cadence = "every_k"
        interval_steps = 50

        [sweep]
        gamma_dc_start = 0.0
        gamma_dc_stop = 2.0
        points = 5
        realizations = 8

        [output]
        base_filename = "iv"
        format = "json"
    "#;

    #[test]
    fn parses_sample_with_defaults() {
        let config = SimulationConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.noise.mode, NoiseModeType::JohnsonShot);
        assert_eq!(config.noise.cadence, CadenceType::EveryK);
        assert_eq!(config.noise.estimate, EstimateType::RunningMean);
        assert_eq!(config.timing.discard_fraction, 0.2);
        assert!(config.sweep.parallel);
        assert!(!config.output.save_csv);
        assert_eq!(config.gamma_dc_values(), vec![0.0, 0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn derives_dimensionless_params() {
        let config = SimulationConfig::from_toml_str(SAMPLE).unwrap();
        let params = config.get_sim_params().unwrap();
        let omega_p = config.plasma_frequency();
        assert_relative_eq!(params.beta_c, omega_p * 10.0 * 1.0e-12, max_relative = 1e-12);
        assert_eq!(params.omega, 1.0);
        // 100 periods of 2 pi at dt = 0.05
        assert_eq!(params.steps, (100.0 * std::f64::consts::TAU / 0.05).ceil() as usize);
        assert_eq!(params.gamma_dc, 0.0);
    }

    #[test]
    fn frequency_in_hz_is_normalized() {
        let text = SAMPLE.replace("omega = 1.0", "frequency_hz = 1.0e10");
        let config = SimulationConfig::from_toml_str(&text).unwrap();
        let expected = std::f64::consts::TAU * 1.0e10 / config.plasma_frequency();
        assert_relative_eq!(config.omega(), expected, max_relative = 1e-12);
    }

    #[test]
    fn rejects_two_run_lengths() {
        let text = SAMPLE.replace("ac_periods = 100.0", "ac_periods = 100.0\nsteps = 10");
        assert!(SimulationConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn rejects_constant_noise_without_sigma() {
        let text = SAMPLE.replace("mode = \"johnson_shot\"", "mode = \"constant\"");
        assert!(SimulationConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn explicit_bias_list_keeps_order() {
        let text = SAMPLE.replace("points = 5", "points = 5\ngamma_dc_values = [3.0, 1.0, 2.0]");
        let config = SimulationConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.gamma_dc_values(), vec![3.0, 1.0, 2.0]);
        assert_eq!(config.get_sim_params().unwrap().gamma_dc, 3.0);
    }
}
