use mac_smoke::{MacGrid, Obstacle, SimConfig, Simulation};

fn scenario_config() -> SimConfig {
    let mut config = SimConfig::from_ron_str(
        "(
            resolution: [16, 16],
            dt: 0.1,
            source: (density: 1.0, temperature: 1.0, velocity: 1.0),
        )",
    )
    .unwrap();
    config.pressure.max_iterations = 200;
    config.pressure.tolerance = 1e-6;
    config
}

fn density_above<const D: usize>(grid: &MacGrid<D>, source_height: usize) -> f64 {
    let density = grid.density_field();
    let lattice = density.lattice();
    (0..lattice.size())
        .filter(|index| lattice.coords(*index)[D - 1] > source_height)
        .map(|index| density.at(index))
        .sum()
}

#[test]
fn rising_smoke_stays_bounded_and_divergence_free() {
    let mut sim: Simulation<2> = Simulation::new(scenario_config()).unwrap();
    let source = sim.grid().params().source_cell;
    for frame in 0..50 {
        let report = sim.step();
        assert!(
            report.max_divergence < 0.05,
            "frame {frame}: divergence {}",
            report.max_divergence
        );
        let (lo, hi) = sim.grid().density_field().min_max();
        assert!(lo >= -1e-12 && hi <= 1.0 + 1e-12, "frame {frame}: density in [{lo}, {hi}]");
    }
    assert!(density_above(sim.grid(), source[1]) > 0.0);
    assert!(sim.grid().kinetic_energy() > 0.0);
}

#[test]
fn plain_cg_gives_the_same_flow() {
    let mut preconditioned: Simulation<2> = Simulation::new(scenario_config()).unwrap();
    let mut config = scenario_config();
    config.pressure.preconditioned = false;
    config.pressure.max_iterations = 1000;
    let mut plain: Simulation<2> = Simulation::new(config).unwrap();
    for _ in 0..5 {
        let a = preconditioned.step();
        let b = plain.step();
        assert!(a.pressure.converged && b.pressure.converged);
        assert!(a.pressure.iterations <= b.pressure.iterations);
    }
    let lhs = preconditioned.grid().density_field().data();
    let rhs = plain.grid().density_field().data();
    for (l, r) in lhs.iter().zip(rhs.iter()) {
        assert!((l - r).abs() < 1e-4, "{l} vs {r}");
    }
}

#[test]
fn obstacle_cells_never_receive_smoke() {
    let mut config = scenario_config();
    config.obstacles.push(Obstacle::Box {
        min: vec![3, 8],
        max: vec![10, 9],
    });
    let mut sim: Simulation<2> = Simulation::new(config).unwrap();
    for _ in 0..30 {
        let report = sim.step();
        assert!(report.max_divergence < 0.05);
    }
    let grid = sim.grid();
    for x in 3..=10 {
        for y in 8..=9 {
            assert_eq!(grid.density_field().get([x, y]), 0.0);
            assert_eq!(grid.velocity_field(1).get([x, y]), 0.0);
        }
    }
    assert_eq!(grid.num_solid_cells(), 16);
}

#[test]
fn restart_returns_to_initial_state() {
    let mut sim: Simulation<3> = Simulation::new(SimConfig::with_resolution(&[8, 8, 8])).unwrap();
    for _ in 0..5 {
        sim.step();
    }
    assert!(sim.grid().total_density() > 0.0);
    sim.restart();
    assert_eq!(sim.grid().total_density(), 0.0);
    assert_eq!(sim.grid().kinetic_energy(), 0.0);
    assert!(sim.grid().check_divergence());
}
