pub mod config;
pub mod physics;
pub mod sim_params;
pub mod sweep_result;

// Re-export key types for easier use by dependent crates
pub use config::{SimulationConfig, JunctionConfig, DriveConfig, TimingConfig, InitialConditions, NoiseConfig, SweepConfig, OutputConfig, NoiseModeType, CadenceType, EstimateType};
pub use physics::NoiseParams;
pub use sim_params::{RunLength, SimParams};
pub use sweep_result::{ShapiroMap, SweepPoint, SweepResult};
