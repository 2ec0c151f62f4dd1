use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

/// How a boundary triplet's angle is tested for "right angle".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RightAngleCheck {
    /// `|angle - π/2| < 0.1` or `|angle - 3π/2| < 0.1`.
    #[default]
    Strict,
    /// Reproduces `fabs(angle - π/2 < 0.1)`: the comparison is taken before
    /// the magnitude, so every angle below `π/2 + 0.1` passes.
    Literal,
}

/// Every tunable of the detection pipeline. Lengths in metres, areas in m².
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// voxel leaf; also the per-point trimming threshold of the height estimator
    pub leaf: f32,
    /// slab half-thickness and convergence spread; at least `2 * leaf`
    pub delta_z: f32,
    /// proximity-clustering tolerance on a projected level
    pub flatness_ratio: f32,
    /// plane points have `|nz|` above this
    pub normal_z: f32,
    pub normal_radius: f32,
    pub smoothness_deg: f32,
    pub region_min_size: usize,
    pub region_max_size: usize,
    pub region_neighbours: usize,
    /// grown points only seed further growth below this curvature
    pub region_curvature: Option<f32>,
    pub cluster_min_size: usize,
    pub cluster_max_size: usize,
    pub min_hull_area: f32,
    /// expected table top height above the ground
    pub table_height: f32,
    pub height_tolerance: f32,
    /// base link (reference frame origin) height above the ground
    pub base_link_height: f32,
    /// camera-depth pre-filter upper bound, applied before the camera-to-base transform
    pub max_depth: f32,
    pub right_angle: RightAngleCheck,
    pub parallel_levels: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let leaf = 0.01;
        Self {
            leaf,
            delta_z: 2.0 * leaf,
            flatness_ratio: 5.0 * leaf,
            normal_z: 0.7,
            normal_radius: 2.0 * leaf,
            smoothness_deg: 8.0,
            region_min_size: 30,
            region_max_size: 307_200,
            region_neighbours: 20,
            region_curvature: Some(0.05),
            cluster_min_size: 0,
            cluster_max_size: 307_200,
            min_hull_area: 0.1,
            table_height: 0.75,
            height_tolerance: 0.2,
            base_link_height: 0.4,
            max_depth: 1.5,
            right_angle: RightAngleCheck::Strict,
            parallel_levels: false,
        }
    }
}

impl DetectorConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("leaf", self.leaf),
            ("delta_z", self.delta_z),
            ("flatness_ratio", self.flatness_ratio),
            ("normal_z", self.normal_z),
            ("normal_radius", self.normal_radius),
            ("smoothness_deg", self.smoothness_deg),
            ("min_hull_area", self.min_hull_area),
            ("table_height", self.table_height),
            ("height_tolerance", self.height_tolerance),
            ("base_link_height", self.base_link_height),
            ("max_depth", self.max_depth),
        ];
        for (name, v) in finite {
            ensure!(v.is_finite(), "{name} must be finite, got {v}");
        }
        ensure!(self.leaf > 0.0, "leaf must be positive, got {}", self.leaf);
        ensure!(
            self.delta_z >= 2.0 * self.leaf,
            "delta_z ({}) must be at least twice the leaf ({})",
            self.delta_z,
            self.leaf
        );
        ensure!(self.flatness_ratio > 0.0, "flatness_ratio must be positive");
        ensure!(self.normal_radius > 0.0, "normal_radius must be positive");
        ensure!((0.0..=1.0).contains(&self.normal_z), "normal_z must lie in [0, 1]");
        ensure!(self.region_neighbours > 0, "region_neighbours must be positive");
        if let Some(c) = self.region_curvature {
            ensure!(c.is_finite() && c >= 0.0, "region_curvature must be a finite non-negative value, got {c}");
        }
        ensure!(
            self.region_min_size <= self.region_max_size,
            "region_min_size exceeds region_max_size"
        );
        ensure!(
            self.cluster_min_size <= self.cluster_max_size,
            "cluster_min_size exceeds cluster_max_size"
        );
        ensure!(self.height_tolerance > 0.0, "height_tolerance must be positive");
        Ok(())
    }

    /// `|z + base_link_height - table_height| < height_tolerance`
    pub fn within_table_window(&self, z: f32) -> bool {
        (z + self.base_link_height - self.table_height).abs() < self.height_tolerance
    }
}
