use anyhow::Result;
use std::fs::File;
use std::time::Instant;
use log::{info, warn, error, debug};

use josephson_engine::noise::NoiseSchedule;
use josephson_engine::output::{self, OutputFormat};
use josephson_engine::sweep::{EnsembleAggregator, SweepPlan};
use junction_common::SimulationConfig;

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting Josephson junction I-V engine...");

    // --- Load Configuration ---
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = SimulationConfig::load(&config_path)?;
    info!("Loaded configuration from {}", config_path);

    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Derive Dimensionless Parameters ---
    let params = config.get_sim_params()?;
    info!(
        "omega_p = {:.4e} rad/s | beta_c = {:.4} | Omega = {:.4} | gamma_ac = {:.4} | f_4pi = {:.2}",
        config.plasma_frequency(),
        params.beta_c,
        params.omega,
        params.gamma_ac,
        params.fraction_4pi
    );
    debug!("Simulation Parameters: {:#?}", params);

    let noise = NoiseSchedule::from_config(&config.noise, config.get_noise_params())?;
    debug!("Noise schedule: {:?}", noise);

    let plan = SweepPlan {
        bias_points: config.gamma_dc_values(),
        realizations: config.sweep.realizations,
        run_length: config.run_length(),
        base_seed: config.initial_conditions.seed,
        parallel: config.sweep.parallel,
    };
    if !plan.parallel {
        warn!("Parallel dispatch disabled; running realizations sequentially.");
    }

    let aggregator = EnsembleAggregator::new(&params, &noise, &plan)?;
    let format = OutputFormat::parse(config.output.format.as_deref());
    let base_filename = &config.output.base_filename;

    // --- Run Sweep ---
    let start_time = Instant::now();
    let rows = match &config.sweep.gamma_ac_values {
        Some(amplitudes) => {
            info!("Running Shapiro map over {} AC amplitudes...", amplitudes.len());
            let map = aggregator.run_shapiro_map(amplitudes)?;
            output::save_shapiro_map(&map, base_filename, format)?;
            map.rows
        }
        None => {
            let result = aggregator.run()?;
            output::save_sweep(&result, base_filename, format)?;
            vec![result]
        }
    };
    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds ({:.3} minutes).",
        total_duration.as_secs_f64(),
        total_duration.as_secs_f64() / 60.0
    );

    let failed: usize = rows.iter().map(|r| r.total_failed()).sum();
    if failed > 0 {
        warn!("{} realizations were excluded from ensemble averages.", failed);
    }

    // --- Save Tabular Output ---
    if config.output.save_csv {
        let filename = format!("{}_iv.csv", base_filename);
        match File::create(&filename) {
            Ok(file) => {
                output::write_sweep_csv(file, &rows)?;
                info!("Sweep table saved to {}", filename);
            }
            Err(e) => error!("Error creating CSV file '{}': {}", filename, e),
        }
    } else {
        info!("Skipping CSV export as per config.");
    }

    // One realization at the first bias point, for inspecting transients
    if config.output.save_trajectory {
        let trajectory = aggregator.record_trajectory(0, 0)?;
        let filename = format!("{}_trajectory.csv", base_filename);
        match File::create(&filename) {
            Ok(file) => {
                output::write_trajectory_csv(file, &trajectory)?;
                info!("Trajectory ({} samples) saved to {}", trajectory.samples.len(), filename);
            }
            Err(e) => error!("Error creating trajectory file '{}': {}", filename, e),
        }
    }

    info!("Simulation Complete.");
    Ok(())
}
