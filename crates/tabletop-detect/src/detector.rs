use anyhow::Result;
use log::debug;
use tabletop_core::{Cloud, PlaneCoeffs};

use crate::backend::{GeometryBackend, NativeBackend};
use crate::config::DetectorConfig;
use crate::extract::{extract_levels, HullCandidate};
use crate::height::{candidate_levels, CandidateLevel};
use crate::pose::{estimate_pose, TablePose};

/// Output of one successful detection run.
#[derive(Clone, Debug)]
pub struct Detection {
    pub pose: TablePose,
    /// supporting points: the selected hull boundary
    pub hull: Cloud,
    pub coeffs: PlaneCoeffs,
    pub area: f32,
    /// every hull that passed the size/area checks, winner included
    pub candidates: Vec<HullCandidate>,
}

/// Plane points and their candidate levels (stages 1–3).
#[derive(Clone, Debug, Default)]
pub struct LevelScan {
    pub plane_points: Cloud,
    pub levels: Vec<CandidateLevel>,
}

/// Single-frame table detector. Holds no state between runs.
pub struct TableDetector<B = NativeBackend> {
    cfg: DetectorConfig,
    backend: B,
}

impl TableDetector<NativeBackend> {
    pub fn new(cfg: DetectorConfig) -> Result<Self> {
        Self::with_backend(cfg, NativeBackend)
    }
}

impl<B: GeometryBackend> TableDetector<B> {
    pub fn with_backend(cfg: DetectorConfig, backend: B) -> Result<Self> {
        cfg.validate()?;
        Ok(Self { cfg, backend })
    }

    /// Normal filter, region growing and per-cluster heights.
    pub fn scan_levels(&self, source: &Cloud) -> Result<LevelScan> {
        if source.is_empty() {
            return Ok(LevelScan::default());
        }
        let plane_points = self.backend.plane_points(source, &self.cfg)?;
        debug!("points may come from a plane: {}", plane_points.len());
        self.levels_of(plane_points)
    }

    /// Like [`scan_levels`](Self::scan_levels) for a cloud that already went
    /// through the normal filter (and still carries its normals).
    pub fn levels_of(&self, plane_points: Cloud) -> Result<LevelScan> {
        if plane_points.is_empty() {
            return Ok(LevelScan { plane_points, levels: Vec::new() });
        }
        let clusters = self.backend.region_clusters(&plane_points, &self.cfg)?;
        let levels = candidate_levels(&plane_points, &clusters, self.cfg.leaf, self.cfg.delta_z);
        debug!("{} region clusters, {} candidate levels", clusters.len(), levels.len());
        Ok(LevelScan { plane_points, levels })
    }

    /// Full pipeline on a source cloud already in the reference frame.
    /// `Ok(None)` means no table in this frame, which is not an error.
    pub fn run_detection(&self, source: &Cloud) -> Result<Option<Detection>> {
        let scan = self.scan_levels(source)?;
        Ok(self.select(&scan))
    }

    /// Full pipeline minus the normal filter.
    pub fn run_on_plane_points(&self, plane_points: Cloud) -> Result<Option<Detection>> {
        let scan = self.levels_of(plane_points)?;
        Ok(self.select(&scan))
    }

    fn select(&self, scan: &LevelScan) -> Option<Detection> {
        if scan.levels.is_empty() {
            debug!("no candidate levels");
            return None;
        }
        let selection = extract_levels(&self.backend, &scan.plane_points, &scan.levels, &self.cfg);
        if selection.best().is_none() {
            debug!("no table detected among {} hulls", selection.candidates().len());
            return None;
        }
        let (best, candidates) = selection.into_parts();
        let best = best?;
        let pose = estimate_pose(&best.hull, self.cfg.base_link_height, self.cfg.right_angle)?;
        debug!("table at z={:.3} with area {:.3}", best.z, best.area);
        Some(Detection { pose, hull: best.hull, coeffs: best.coeffs, area: best.area, candidates })
    }
}
