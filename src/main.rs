use anyhow::{bail, Context, Result};
use mac_smoke::{GridField, MacGrid, SimConfig, Simulation};
use std::path::{Path, PathBuf};

const DEFAULT_STEPS: usize = 100;

struct RunArgs {
    config: Option<PathBuf>,
    steps: usize,
    snapshot: PathBuf,
}

impl RunArgs {
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        if args.iter().any(|arg| arg == "-h" || arg == "--help") {
            println!("Usage: mac_smoke [config.ron] [steps] [snapshot.pgm]");
            std::process::exit(0);
        }
        let config = args.first().map(PathBuf::from);
        let steps = match args.get(1) {
            Some(value) => value
                .parse::<usize>()
                .with_context(|| format!("invalid step count {value:?}"))?,
            None => std::env::var("SIM_STEPS")
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(DEFAULT_STEPS),
        };
        let snapshot = args
            .get(2)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("density.pgm"));
        Ok(Self {
            config,
            steps,
            snapshot,
        })
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = RunArgs::parse()?;
    let config = match &args.config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SimConfig::default(),
    };
    match config.dimensionality() {
        2 => run::<2>(config, &args),
        3 => run::<3>(config, &args),
        other => bail!("resolution must have 2 or 3 axes, got {other}"),
    }
}

fn run<const D: usize>(config: SimConfig, args: &RunArgs) -> Result<()> {
    let mut sim = Simulation::<D>::new(config).context("building simulation")?;
    let mut unconverged = 0;
    let mut worst_divergence: f64 = 0.0;
    for _ in 0..args.steps {
        let report = sim.step();
        if !report.pressure.converged {
            unconverged += 1;
        }
        worst_divergence = worst_divergence.max(report.max_divergence);
        if sim.frame() % 10 == 0 {
            log::info!(
                "frame {}: smoke {:.3}, kinetic energy {:.4}, max divergence {:.2e}",
                sim.frame(),
                sim.grid().total_density(),
                sim.grid().kinetic_energy(),
                report.max_divergence
            );
        }
    }
    log::info!(
        "{} frames done, {} unconverged pressure solves, worst divergence {:.2e}",
        sim.frame(),
        unconverged,
        worst_divergence
    );
    write_density_pgm(sim.grid(), &args.snapshot)
        .with_context(|| format!("writing snapshot {}", args.snapshot.display()))?;
    log::info!("density written to {}", args.snapshot.display());
    Ok(())
}

/// Grey-scale slice through the middle of the grid, horizontal axis 0,
/// up axis pointing up in the image.
fn density_to_luma<const D: usize>(density: &GridField<D>, out: &mut Vec<u8>) -> (usize, usize) {
    let dims = density.lattice().dims();
    let up = D - 1;
    let width = dims[0];
    let height = dims[up];
    out.clear();
    out.resize(width * height, 0);
    for row in 0..height {
        for x in 0..width {
            let mut coords = dims.map(|n| n / 2);
            coords[0] = x;
            coords[up] = height - 1 - row;
            let t = density.get(coords).clamp(0.0, 1.0);
            out[row * width + x] = (t * 255.0) as u8;
        }
    }
    (width, height)
}

fn write_density_pgm<const D: usize>(grid: &MacGrid<D>, path: &Path) -> Result<()> {
    let mut luma = Vec::new();
    let (width, height) = density_to_luma(grid.density_field(), &mut luma);
    let mut bytes = format!("P5\n{width} {height}\n255\n").into_bytes();
    bytes.extend_from_slice(&luma);
    std::fs::write(path, bytes)?;
    Ok(())
}
