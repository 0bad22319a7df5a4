//! End-to-end runs of the integrator and aggregator against known junction behaviour.

use approx::assert_abs_diff_eq;
use josephson_engine::integrator::{GaussianSource, Integrator, StdNormalSource};
use josephson_engine::noise::{JohnsonShotNoise, NoiseCadence, NoiseModel, NoiseSchedule, VoltageEstimate};
use josephson_engine::sweep::{EnsembleAggregator, SweepPlan};
use junction_common::{NoiseParams, RunLength, SimParams, SimulationConfig};
use std::f64::consts::TAU;

struct Zeros;

impl GaussianSource for Zeros {
    fn standard_normal(&mut self) -> f64 {
        0.0
    }
}

fn dc_params(gamma_dc: f64) -> SimParams {
    SimParams {
        gamma_dc,
        gamma_ac: 0.0,
        omega: 0.0,
        beta_c: 1.0,
        fraction_4pi: 0.0,
        dt: 0.01,
        steps: 5000,
        discard_fraction: 0.5,
        phi0: 0.0,
        v0: 0.0,
    }
}

#[test]
fn subcritical_bias_phase_locks() {
    let params = dc_params(0.5);
    let noise = NoiseSchedule::silent();
    let integrator = Integrator::new(&params, &noise).unwrap();
    let traj = integrator.run_trajectory(&mut Zeros, 0.0).unwrap();
    let mean = traj.post_transient().iter().map(|s| s.v.abs()).sum::<f64>() / traj.post_transient().len() as f64;
    assert!(mean < 1e-3, "mean |v| = {mean}");
    // Locked at the phase where sin(phi) balances the bias
    assert_abs_diff_eq!(traj.final_state().unwrap().phi, 0.5f64.asin(), epsilon = 1e-6);
}

#[test]
fn supercritical_bias_runs() {
    // beta_c = 1 keeps some inertia, so <v> sits above the overdamped sqrt(gamma^2 - 1);
    // harmonic balance gives v = gamma - 1 / (2 v (v^2 + 1)) ~ 1.946.
    let params = dc_params(2.0);
    let noise = NoiseSchedule::silent();
    let integrator = Integrator::new(&params, &noise).unwrap();
    let summary = integrator.run_mean_voltage(&mut Zeros, 0.0).unwrap();
    assert!(summary.mean_voltage > 3.0f64.sqrt());
    assert!((summary.mean_voltage - 1.946).abs() < 0.03 * 1.946, "<v> = {}", summary.mean_voltage);
}

fn shapiro_params(fraction_4pi: f64, gamma_dc: f64) -> SimParams {
    SimParams {
        gamma_dc,
        gamma_ac: 0.8,
        omega: 1.0,
        beta_c: 1.0,
        fraction_4pi,
        dt: TAU / 200.0,
        steps: 0,
        discard_fraction: 0.5,
        phi0: 0.0,
        v0: 0.0,
    }
}

fn single_point(params: &SimParams, noise: &NoiseSchedule) -> f64 {
    let plan = SweepPlan {
        bias_points: vec![params.gamma_dc],
        realizations: 1,
        run_length: RunLength::AcPeriods(300.0),
        base_seed: 3,
        parallel: false,
    };
    let result = EnsembleAggregator::new(params, noise, &plan).unwrap().run().unwrap();
    result.points[0].mean_voltage.unwrap()
}

#[test]
fn ac_drive_locks_onto_first_shapiro_step() {
    let noise = NoiseSchedule::silent();
    let v = single_point(&shapiro_params(0.0, 1.2), &noise);
    assert_abs_diff_eq!(v, 1.0, epsilon = 1e-3);
}

#[test]
fn fully_4pi_junction_steps_at_twice_the_drive_frequency() {
    let noise = NoiseSchedule::silent();
    let v = single_point(&shapiro_params(1.0, 2.0), &noise);
    assert_abs_diff_eq!(v, 2.0, epsilon = 1e-3);
}

#[test]
fn shapiro_map_rows_follow_amplitude_order() {
    let params = shapiro_params(0.0, 0.0);
    let noise = NoiseSchedule::silent();
    let plan = SweepPlan {
        bias_points: vec![0.5, 1.2],
        realizations: 1,
        run_length: RunLength::AcPeriods(40.0),
        base_seed: 3,
        parallel: true,
    };
    let aggregator = EnsembleAggregator::new(&params, &noise, &plan).unwrap();
    let map = aggregator.run_shapiro_map(&[0.0, 0.8, 0.4]).unwrap();
    assert_eq!(map.gamma_ac_values(), vec![0.0, 0.8, 0.4]);
    assert!(map.rows.iter().all(|row| row.points.len() == 2 && row.omega == 1.0));
}

#[test]
fn locked_junction_keeps_johnson_amplitude() {
    // The running-mean estimate stays near zero in the locked state, so the
    // refreshed amplitude stays at its Johnson value.
    let noise_params = NoiseParams {
        critical_current: 1.0e-6,
        resistance: 20.0,
        temperature: 4.2,
        plasma_frequency: 7.8e10,
        voltage_scale: 2.6e-5,
        dt: 0.01,
    };
    let model = JohnsonShotNoise::new(noise_params).unwrap();
    let johnson = model.amplitude(0.0);
    let noise = NoiseSchedule {
        model: NoiseModel::JohnsonShot(model),
        cadence: NoiseCadence::Every(100),
        estimate: VoltageEstimate::RunningMean,
    };
    let params = dc_params(0.3);
    let integrator = Integrator::new(&params, &noise).unwrap();
    let summary = integrator.run_mean_voltage(&mut StdNormalSource::new(4), 0.0).unwrap();
    assert!(summary.mean_voltage.abs() < 1e-3);
    assert!((summary.final_sigma - johnson).abs() <= 1e-3 * johnson);
}

#[test]
fn noise_spreads_a_locked_ensemble() {
    let noise = NoiseSchedule::constant(0.3);
    let params = dc_params(0.3);
    let plan = SweepPlan {
        bias_points: vec![0.3],
        realizations: 8,
        run_length: RunLength::Steps(5000),
        base_seed: 11,
        parallel: true,
    };
    let result = EnsembleAggregator::new(&params, &noise, &plan).unwrap().run().unwrap();
    let point = &result.points[0];
    assert_eq!(point.realizations, 8);
    assert_eq!(point.failed, 0);
    assert!(point.mean_voltage.unwrap().abs() < 0.05, "{point:?}");
    assert!(point.variance.unwrap() > 0.0);
}

#[test]
fn same_seed_same_trajectory_through_public_api() {
    let params = dc_params(1.4);
    let noise = NoiseSchedule::constant(0.5);
    let integrator = Integrator::new(&params, &noise).unwrap();
    let a = integrator.run_trajectory(&mut StdNormalSource::new(8), 0.0).unwrap();
    let b = integrator.run_trajectory(&mut StdNormalSource::new(8), 0.0).unwrap();
    assert_eq!(a.samples, b.samples);
}

#[test]
fn sample_config_drives_a_small_sweep() {
    let text = r#"
        [junction]
        critical_current_a = 1.0e-6
        resistance_ohm = 20.0
        capacitance_f = 0.5e-12
        temperature_k = 4.2

        [timing]
        dt = 0.01
        steps = 2000

        [initial_conditions]
        seed = 1

        [noise]
        mode = "constant"
        sigma = 0.1

        [sweep]
        gamma_dc_start = 0.0
        gamma_dc_stop = 2.0
        points = 3
        realizations = 2

        [output]
        base_filename = "unused"
    "#;
    let config = SimulationConfig::from_toml_str(text).unwrap();
    let params = config.get_sim_params().unwrap();
    let noise = NoiseSchedule::from_config(&config.noise, config.get_noise_params()).unwrap();
    let plan = SweepPlan {
        bias_points: config.gamma_dc_values(),
        realizations: config.sweep.realizations,
        run_length: config.run_length(),
        base_seed: config.initial_conditions.seed,
        parallel: config.sweep.parallel,
    };
    let result = EnsembleAggregator::new(&params, &noise, &plan).unwrap().run().unwrap();
    assert_eq!(result.gamma_dc_values(), vec![0.0, 1.0, 2.0]);
    assert!(result.points.iter().all(|p| p.realizations == 2 && p.failed == 0));
}
