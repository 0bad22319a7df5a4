use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use log::{info, warn, LevelFilter};
use palette::{FromColor, Hsv, Srgb};
use plotters::prelude::*;
use serde::de::DeserializeOwned;
use junction_common::{ShapiroMap, SweepResult};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Command-line arguments for the visualizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input file written by the engine (.json, .bin or .msgpack)
    #[arg(short, long)]
    input: PathBuf,

    /// Output image path (.png)
    #[arg(short, long, default_value = "iv_curve.png")]
    output: PathBuf,

    /// Input is a Shapiro map (one sweep per AC amplitude) rather than a single sweep
    #[arg(long)]
    map: bool,

    /// Plot voltage in units of the drive frequency, so Shapiro steps sit at integers
    #[arg(long)]
    step_units: bool,

    /// Width of the output image in pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Height of the output image in pixels
    #[arg(long, default_value_t = 800)]
    height: u32,

    /// Chart caption
    #[arg(long)]
    title: Option<String>,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    run_with_args(args)
}

fn run_with_args(args: Args) -> Result<()> {
    // Initialize logger
    Builder::from_default_env()
        .filter(None, LevelFilter::Info)
        .init();

    info!("Starting Junction Visualizer...");
    info!("Input file: {}", args.input.display());
    info!("Output image: {} ({}x{})", args.output.display(), args.width, args.height);

    let dims = (args.width, args.height);
    if args.map {
        let map: ShapiroMap = load(&args.input)?;
        info!("Loaded Shapiro map with {} rows at omega = {:.4}", map.rows.len(), map.omega);
        let title = args.title.unwrap_or_else(|| "Shapiro map".to_string());
        plot_shapiro_map(&map, &args.output, dims, &title)?;
    } else {
        let sweep: SweepResult = load(&args.input)?;
        info!("Loaded sweep with {} points", sweep.points.len());
        let title = args
            .title
            .unwrap_or_else(|| format!("I-V curve (gamma_ac = {:.3}, omega = {:.3})", sweep.gamma_ac, sweep.omega));
        plot_iv_curve(&sweep, &args.output, dims, &title, args.step_units)?;
    }

    info!("Image written to {}", args.output.display());
    Ok(())
}

/// Reads a result file, choosing the decoder from the file extension.
fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
    let reader = BufReader::new(file);
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
    let value = match extension {
        "bin" => bincode::deserialize_from(reader)
            .with_context(|| format!("Failed to decode bincode from '{}'", path.display()))?,
        "msgpack" => rmp_serde::from_read(reader)
            .with_context(|| format!("Failed to decode MessagePack from '{}'", path.display()))?,
        other => {
            if other != "json" {
                warn!("Unrecognized extension '{}', trying JSON.", other);
            }
            serde_json::from_reader(reader)
                .with_context(|| format!("Failed to decode JSON from '{}'", path.display()))?
        }
    };
    Ok(value)
}

/// Axis range covering `values`, padded so a single value still has a width.
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let pad = if hi > lo { 0.05 * (hi - lo) } else { 0.5 };
    (lo - pad, hi + pad)
}

fn plot_iv_curve(sweep: &SweepResult, path: &Path, dims: (u32, u32), title: &str, step_units: bool) -> Result<()> {
    let scale = if step_units {
        if sweep.omega > 0.0 {
            1.0 / sweep.omega
        } else {
            warn!("Sweep has no AC drive; plotting plain voltage.");
            1.0
        }
    } else {
        1.0
    };
    let points: Vec<(f64, f64, f64)> = sweep
        .points
        .iter()
        .filter_map(|p| p.mean_voltage.map(|v| (p.gamma_dc, v * scale, p.std_error().unwrap_or(0.0) * scale)))
        .collect();
    let skipped = sweep.points.len() - points.len();
    if skipped > 0 {
        warn!("{} bias points have no surviving realizations and are not drawn.", skipped);
    }

    let root = BitMapBackend::new(path, dims).into_drawing_area();
    root.fill(&WHITE)?;

    let (x0, x1) = padded_range(points.iter().map(|p| p.0));
    let (y0, y1) = padded_range(points.iter().flat_map(|p| [p.1 - p.2, p.1 + p.2]).chain(std::iter::once(0.0)));

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30).into_font())
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x0..x1, y0..y1)?;

    chart
        .configure_mesh()
        .x_desc("DC bias gamma_dc")
        .y_desc(if step_units && sweep.omega > 0.0 { "<v> / omega" } else { "<v>" })
        .draw()?;

    chart.draw_series(LineSeries::new(points.iter().map(|p| (p.0, p.1)), &BLUE))?;
    chart.draw_series(points.iter().map(|p| Circle::new((p.0, p.1), 3, BLUE.filled())))?;
    chart.draw_series(
        points
            .iter()
            .filter(|p| p.2 > 0.0)
            .map(|p| ErrorBar::new_vertical(p.0, p.1 - p.2, p.1, p.1 + p.2, BLACK.stroke_width(1), 6)),
    )?;

    root.present()?;
    Ok(())
}

/// Cell boundaries for heat-map tiles centred on `centres`, split halfway between neighbours.
fn cell_edges(centres: &[f64]) -> Vec<(f64, f64)> {
    let n = centres.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![(centres[0] - 0.5, centres[0] + 0.5)];
    }
    (0..n)
        .map(|i| {
            let left = if i == 0 { centres[0] - 0.5 * (centres[1] - centres[0]) } else { 0.5 * (centres[i - 1] + centres[i]) };
            let right = if i == n - 1 {
                centres[n - 1] + 0.5 * (centres[n - 1] - centres[n - 2])
            } else {
                0.5 * (centres[i] + centres[i + 1])
            };
            (left, right)
        })
        .collect()
}

/// Blue (0) through red (`max`) colour scale.
fn step_color(value: f64, max: f64) -> RGBColor {
    let t = if max > 0.0 { (value / max).clamp(0.0, 1.0) } else { 0.0 };
    let hsv = Hsv::new(240.0 * (1.0 - t as f32), 0.85, 0.95);
    let rgb = Srgb::from_color(hsv);
    RGBColor((rgb.red * 255.0) as u8, (rgb.green * 255.0) as u8, (rgb.blue * 255.0) as u8)
}

fn plot_shapiro_map(map: &ShapiroMap, path: &Path, dims: (u32, u32), title: &str) -> Result<()> {
    let Some(first) = map.rows.first() else {
        anyhow::bail!("Shapiro map has no rows.");
    };
    let scale = if map.omega > 0.0 { 1.0 / map.omega } else { 1.0 };
    let x_edges = cell_edges(&first.gamma_dc_values());
    let y_edges = cell_edges(&map.gamma_ac_values());

    let max_value = map
        .rows
        .iter()
        .flat_map(|row| row.curve())
        .map(|(_, v)| v.abs() * scale)
        .fold(0.0, f64::max);
    info!("Colour scale spans 0 to {:.3} (voltage / omega).", max_value);

    let root = BitMapBackend::new(path, dims).into_drawing_area();
    root.fill(&WHITE)?;

    let (x0, x1) = padded_range(x_edges.iter().flat_map(|e| [e.0, e.1]));
    let (y0, y1) = padded_range(y_edges.iter().flat_map(|e| [e.0, e.1]));

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30).into_font())
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x0..x1, y0..y1)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("DC bias gamma_dc")
        .y_desc("AC amplitude gamma_ac")
        .draw()?;

    for (row, &(ya, yb)) in map.rows.iter().zip(&y_edges) {
        if row.points.len() != x_edges.len() {
            warn!("Row at gamma_ac = {:.3} has {} points, expected {}; skipping.", row.gamma_ac, row.points.len(), x_edges.len());
            continue;
        }
        chart.draw_series(row.points.iter().zip(&x_edges).filter_map(|(point, &(xa, xb))| {
            point
                .mean_voltage
                .map(|v| Rectangle::new([(xa, ya), (xb, yb)], step_color(v.abs() * scale, max_value).filled()))
        }))?;
    }

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use junction_common::SweepPoint;

    #[test]
    fn cell_edges_split_between_neighbours() {
        let edges = cell_edges(&[0.0, 1.0, 3.0]);
        assert_eq!(edges, vec![(-0.5, 0.5), (0.5, 2.0), (2.0, 4.0)]);
        assert_eq!(cell_edges(&[2.0]), vec![(1.5, 2.5)]);
        assert!(cell_edges(&[]).is_empty());
    }

    #[test]
    fn colour_scale_runs_blue_to_red() {
        let low = step_color(0.0, 2.0);
        let high = step_color(2.0, 2.0);
        assert!(low.2 > low.0, "low end should be blue: {:?}", low);
        assert!(high.0 > high.2, "high end should be red: {:?}", high);
    }

    #[test]
    fn padded_range_handles_degenerate_input() {
        assert_eq!(padded_range(std::iter::empty()), (0.0, 1.0));
        assert_eq!(padded_range([1.0].into_iter()), (0.5, 1.5));
    }

    #[test]
    fn loads_json_sweep() {
        let sweep = SweepResult {
            gamma_ac: 0.0,
            omega: 0.0,
            points: vec![SweepPoint { gamma_dc: 1.5, mean_voltage: Some(1.1), variance: Some(0.01), realizations: 4, failed: 0 }],
        };
        let path = std::env::temp_dir().join(format!("junction-visualizer-{}.json", std::process::id()));
        serde_json::to_writer(File::create(&path).unwrap(), &sweep).unwrap();
        let loaded: SweepResult = load(&path).unwrap();
        assert_eq!(loaded, sweep);
        std::fs::remove_file(&path).unwrap();
    }
}
