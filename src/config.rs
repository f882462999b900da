use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for loading and validating a simulation configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialize error: {0}")]
    RonWrite(#[from] ron::Error),
    #[error("resolution has {found} axes, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("resolution along axis {axis} is zero")]
    EmptyAxis { axis: usize },
    #[error("{name} must be finite and > 0, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("source cell {cell:?} lies outside resolution {resolution:?}")]
    SourceOutOfRange {
        cell: Vec<usize>,
        resolution: Vec<usize>,
    },
    #[error("obstacle {index} has {found} coordinates, expected {expected}")]
    ObstacleDimension {
        index: usize,
        expected: usize,
        found: usize,
    },
}

/// Cells that receive fresh smoke every frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source cell; `None` picks the usual spot near the floor.
    pub cell: Option<Vec<usize>>,
    /// Speed written into the source's lower face along the up axis.
    pub velocity: f64,
    pub density: f64,
    pub temperature: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            cell: None,
            velocity: 1.0,
            density: 1.0,
            temperature: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    pub max_iterations: usize,
    /// Stop once the residual 2-norm drops below this.
    pub tolerance: f64,
    /// MIC(0)-preconditioned CG when set, plain CG otherwise.
    pub preconditioned: bool,
    /// Fraction of dropped fill-in moved back onto the diagonal (tau).
    pub mic_tuning: f64,
    /// Pivots below `mic_safety * diag` fall back to the diagonal (sigma).
    pub mic_safety: f64,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-6,
            preconditioned: true,
            mic_tuning: 0.97,
            mic_safety: 0.25,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Obstacle {
    /// Inclusive cell range.
    Box { min: Vec<usize>, max: Vec<usize> },
    /// Every cell whose centre lies within `radius` of `center` (world units).
    Sphere { center: Vec<f64>, radius: f64 },
}

impl Obstacle {
    /// First coordinate list whose length differs from `expected`.
    fn mismatched_axes(&self, expected: usize) -> Option<usize> {
        let lengths = match self {
            Obstacle::Box { min, max } => vec![min.len(), max.len()],
            Obstacle::Sphere { center, .. } => vec![center.len()],
        };
        lengths.into_iter().find(|&len| len != expected)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Cells per axis; its length is the dimensionality.
    pub resolution: Vec<usize>,
    pub cell_size: f64,
    pub dt: f64,
    pub ambient_temperature: f64,
    /// Weight of smoke density in the Boussinesq force.
    pub boussinesq_alpha: f64,
    /// Lift per degree above ambient in the Boussinesq force.
    pub boussinesq_beta: f64,
    pub vorticity_strength: f64,
    pub fluid_density: f64,
    pub source: SourceConfig,
    pub pressure: PressureConfig,
    pub obstacles: Vec<Obstacle>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            resolution: vec![64, 64],
            cell_size: 0.5,
            dt: 0.1,
            ambient_temperature: 0.0,
            boussinesq_alpha: 0.08,
            boussinesq_beta: 0.37,
            vorticity_strength: 0.1,
            fluid_density: 1.0,
            source: SourceConfig::default(),
            pressure: PressureConfig::default(),
            obstacles: Vec::new(),
        }
    }
}

impl SimConfig {
    pub fn with_resolution(resolution: &[usize]) -> Self {
        Self {
            resolution: resolution.to_vec(),
            ..Self::default()
        }
    }

    pub fn from_ron_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(contents)?)
    }

    /// Load a configuration from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Save the configuration to a RON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn dimensionality(&self) -> usize {
        self.resolution.len()
    }

    /// Resolution as a fixed-size array, after full validation.
    pub fn dims<const D: usize>(&self) -> Result<[usize; D], ConfigError> {
        self.validate::<D>()?;
        let mut dims = [0; D];
        dims.copy_from_slice(&self.resolution);
        Ok(dims)
    }

    pub fn validate<const D: usize>(&self) -> Result<(), ConfigError> {
        if self.resolution.len() != D {
            return Err(ConfigError::DimensionMismatch {
                expected: D,
                found: self.resolution.len(),
            });
        }
        if let Some(axis) = self.resolution.iter().position(|n| *n == 0) {
            return Err(ConfigError::EmptyAxis { axis });
        }
        for (name, value) in [
            ("cell_size", self.cell_size),
            ("dt", self.dt),
            ("fluid_density", self.fluid_density),
            ("pressure.tolerance", self.pressure.tolerance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if let Some(cell) = &self.source.cell {
            let inside = cell.len() == D
                && cell
                    .iter()
                    .zip(self.resolution.iter())
                    .all(|(c, n)| c < n);
            if !inside {
                return Err(ConfigError::SourceOutOfRange {
                    cell: cell.clone(),
                    resolution: self.resolution.clone(),
                });
            }
        }
        for (index, obstacle) in self.obstacles.iter().enumerate() {
            if let Some(found) = obstacle.mismatched_axes(D) {
                return Err(ConfigError::ObstacleDimension {
                    index,
                    expected: D,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Configured source cell, or one third across and one cell up in 2D,
    /// the floor centre one cell up in 3D.
    pub fn source_cell<const D: usize>(&self, dims: [usize; D]) -> [usize; D] {
        if let Some(cell) = &self.source.cell {
            if cell.len() == D {
                return std::array::from_fn(|axis| cell[axis].min(dims[axis] - 1));
            }
        }
        let up = D - 1;
        std::array::from_fn(|axis| {
            let c = if axis == up {
                1
            } else if D == 2 {
                dims[axis] / 3
            } else {
                dims[axis] / 2
            };
            c.min(dims[axis] - 1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_ron_with_defaults() {
        let config = SimConfig::from_ron_str(
            "(resolution: [16, 8, 4], dt: 0.05, pressure: (preconditioned: false))",
        )
        .unwrap();
        assert_eq!(config.resolution, vec![16, 8, 4]);
        assert_eq!(config.dt, 0.05);
        assert!(!config.pressure.preconditioned);
        assert_eq!(config.pressure.max_iterations, 200);
        assert_eq!(config.source, SourceConfig::default());
    }

    #[test]
    fn parses_obstacles() {
        let config = SimConfig::from_ron_str(
            "(obstacles: [Box(min: [2, 4], max: [6, 4]), Sphere(center: [8.0, 8.0], radius: 1.5)])",
        )
        .unwrap();
        assert_eq!(config.obstacles.len(), 2);
        assert!(config.validate::<2>().is_ok());
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let config = SimConfig::with_resolution(&[8, 8]);
        assert!(matches!(
            config.validate::<3>(),
            Err(ConfigError::DimensionMismatch {
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn rejects_ragged_box_obstacle() {
        let mut config = SimConfig::with_resolution(&[8, 8]);
        config.obstacles.push(Obstacle::Box {
            min: vec![2, 2],
            max: vec![4],
        });
        assert!(matches!(
            config.validate::<2>(),
            Err(ConfigError::ObstacleDimension {
                index: 0,
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn rejects_bad_scalars_and_source() {
        let mut config = SimConfig::with_resolution(&[8, 8]);
        config.dt = 0.0;
        assert!(matches!(
            config.validate::<2>(),
            Err(ConfigError::NonPositive { name: "dt", .. })
        ));
        let mut config = SimConfig::with_resolution(&[8, 8]);
        config.source.cell = Some(vec![8, 0]);
        assert!(matches!(
            config.validate::<2>(),
            Err(ConfigError::SourceOutOfRange { .. })
        ));
    }

    #[test]
    fn default_source_cell_follows_dimensionality() {
        let config = SimConfig::with_resolution(&[16, 16]);
        assert_eq!(config.source_cell([16, 16]), [5, 1]);
        let config = SimConfig::with_resolution(&[8, 10, 12]);
        assert_eq!(config.source_cell([8, 10, 12]), [4, 5, 1]);
    }

    #[test]
    fn ron_round_trip_preserves_config() {
        let mut config = SimConfig::with_resolution(&[12, 12]);
        config.obstacles.push(Obstacle::Box {
            min: vec![1, 1],
            max: vec![2, 2],
        });
        let text = ron::ser::to_string(&config).unwrap();
        assert_eq!(SimConfig::from_ron_str(&text).unwrap(), config);
    }
}
