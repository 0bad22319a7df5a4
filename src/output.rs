use anyhow::{Context, Result};
use junction_common::{ShapiroMap, SweepResult};
use log::{error, info};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::integrator::Trajectory;

/// On-disk encodings for sweep results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Bincode,
    MessagePack,
}

impl OutputFormat {
    /// Parses the `output.format` config value. Unknown names fall back to JSON.
    pub fn parse(name: Option<&str>) -> Self {
        match name.unwrap_or("json") {
            "json" => OutputFormat::Json,
            "bincode" => OutputFormat::Bincode,
            "messagepack" => OutputFormat::MessagePack,
            other => {
                error!("Unknown output format: {}. Using JSON instead.", other);
                OutputFormat::Json
            }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Bincode => "bin",
            OutputFormat::MessagePack => "msgpack",
        }
    }
}

/// Serializes `value` to `path` in the given format.
pub fn save<T: Serialize>(value: &T, path: &Path, format: OutputFormat) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Error creating output file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    match format {
        OutputFormat::Json => serde_json::to_writer(&mut writer, value)
            .with_context(|| format!("Error serializing to JSON '{}'", path.display()))?,
        OutputFormat::Bincode => bincode::serialize_into(&mut writer, value)
            .with_context(|| format!("Error serializing to bincode '{}'", path.display()))?,
        OutputFormat::MessagePack => rmp_serde::encode::write(&mut writer, value)
            .with_context(|| format!("Error serializing to MessagePack '{}'", path.display()))?,
    }
    writer.flush()?;
    Ok(())
}

/// Saves a sweep as `<base>_iv.<ext>` and returns the path written.
pub fn save_sweep(result: &SweepResult, base_filename: &str, format: OutputFormat) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{}_iv.{}", base_filename, format.extension()));
    save(result, &path, format)?;
    info!("Sweep saved to {} ({} points)", path.display(), result.points.len());
    Ok(path)
}

/// Saves a Shapiro map as `<base>_shapiro.<ext>` and returns the path written.
pub fn save_shapiro_map(map: &ShapiroMap, base_filename: &str, format: OutputFormat) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{}_shapiro.{}", base_filename, format.extension()));
    save(map, &path, format)?;
    info!("Shapiro map saved to {} ({} rows)", path.display(), map.rows.len());
    Ok(path)
}

/// Writes one row per bias point: `gamma_ac, gamma_dc, mean_v, variance, std_error, realizations, failed`.
pub fn write_sweep_csv<W: Write>(writer: W, rows: &[SweepResult]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["gamma_ac", "gamma_dc", "mean_v", "variance", "std_error", "realizations", "failed"])?;
    let opt = |x: Option<f64>| x.map(|v| format!("{:.8e}", v)).unwrap_or_default();
    for result in rows {
        for point in &result.points {
            csv_writer.write_record(&[
                format!("{:.6}", result.gamma_ac),
                format!("{:.6}", point.gamma_dc),
                opt(point.mean_voltage),
                opt(point.variance),
                opt(point.std_error()),
                point.realizations.to_string(),
                point.failed.to_string(),
            ])?;
        }
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes a trajectory as `tau, phi, v` rows.
pub fn write_trajectory_csv<W: Write>(writer: W, trajectory: &Trajectory) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for sample in &trajectory.samples {
        csv_writer.serialize(sample)?;
    }
    csv_writer.flush()?;
    Ok(())
}
