//! Level-wise plane extraction and table selection.
//!
//! Every candidate level is sliced, re-clustered and hulled independently
//! ([`extract_level`]). The resulting hulls are then folded, in ascending level
//! order, into a [`TableSelection`] that keeps the single best table.

use log::debug;
use rayon::prelude::*;
use tabletop_core::{Cloud, PlaneCoeffs};

use crate::backend::GeometryBackend;
use crate::config::DetectorConfig;
use crate::height::CandidateLevel;

/// A convex region found at one height level.
#[derive(Clone, Debug)]
pub struct HullCandidate {
    pub hull: Cloud,
    pub area: f32,
    /// height level the hull was extracted at
    pub z: f32,
    pub coeffs: PlaneCoeffs,
}

/// Best-so-far table plus every hull seen during one run.
#[derive(Clone, Debug)]
pub struct TableSelection {
    best: Option<HullCandidate>,
    best_area: f32,
    best_height: f32,
    all: Vec<HullCandidate>,
}

impl Default for TableSelection {
    fn default() -> Self {
        Self { best: None, best_area: 0.0, best_height: 0.0, all: Vec::new() }
    }
}

impl TableSelection {
    pub fn new() -> Self { Self::default() }

    /// A candidate wins when its area and its height both strictly exceed the
    /// current best and its level lies inside the table height window.
    fn beats_best(&self, cand: &HullCandidate, cfg: &DetectorConfig) -> bool {
        cand.area > self.best_area && cand.z > self.best_height && cfg.within_table_window(cand.z)
    }

    /// Record `cand`; returns whether it became the selected table.
    pub fn offer(&mut self, cand: HullCandidate, cfg: &DetectorConfig) -> bool {
        let wins = self.beats_best(&cand, cfg);
        if wins {
            self.best_area = cand.area;
            self.best_height = cand.z;
            self.best = Some(cand.clone());
        }
        self.all.push(cand);
        wins
    }

    pub fn best(&self) -> Option<&HullCandidate> { self.best.as_ref() }

    /// Every hull that passed the size/area checks, in scan order.
    pub fn candidates(&self) -> &[HullCandidate] { &self.all }

    pub fn into_parts(self) -> (Option<HullCandidate>, Vec<HullCandidate>) { (self.best, self.all) }
}

/// Fold hulls (already in ascending level order) into a selection.
pub fn select_table<I>(candidates: I, cfg: &DetectorConfig) -> TableSelection
where
    I: IntoIterator<Item = HullCandidate>,
{
    candidates.into_iter().fold(TableSelection::new(), |mut sel, cand| {
        sel.offer(cand, cfg);
        sel
    })
}

/// Hulls of the planar regions around height `z`.
///
/// Keeps hulls with more than three boundary points and an area above
/// `min_hull_area`; clusters with fewer than four points are not hulled.
pub fn extract_level<B>(backend: &B, plane_points: &Cloud, z: f32, cfg: &DetectorConfig) -> Vec<HullCandidate>
where
    B: GeometryBackend + ?Sized,
{
    let coeffs = PlaneCoeffs::horizontal(z);
    let projected = backend.slab_projection(&coeffs, cfg.delta_z, plane_points);
    let clusters = backend.proximity_clusters(
        &projected,
        cfg.flatness_ratio,
        cfg.cluster_min_size,
        cfg.cluster_max_size,
    );
    debug!("level z={z:.3}: {} points in slab, {} clusters", projected.len(), clusters.len());

    let mut out = Vec::new();
    for cluster in clusters.iter().filter(|c| c.len() >= 4) {
        let part = projected.select(cluster, false);
        let Some(hull) = backend.convex_hull(&part) else { continue };
        if hull.cloud.len() <= 3 || hull.area <= cfg.min_hull_area {
            continue;
        }
        debug!("found plane with area {:.4} at z={z:.3}", hull.area);
        out.push(HullCandidate { hull: hull.cloud, area: hull.area, z, coeffs });
    }
    out
}

/// Run [`extract_level`] on every level and fold the hulls in level order.
///
/// With `parallel_levels` the levels are extracted on the rayon pool; the
/// fold still happens afterwards in ascending order, so the selection is the
/// same as the sequential one.
pub fn extract_levels<B>(backend: &B, plane_points: &Cloud, levels: &[CandidateLevel], cfg: &DetectorConfig) -> TableSelection
where
    B: GeometryBackend + ?Sized,
{
    let per_level: Vec<Vec<HullCandidate>> = if cfg.parallel_levels {
        levels
            .par_iter()
            .map(|l| extract_level(backend, plane_points, l.z, cfg))
            .collect()
    } else {
        levels
            .iter()
            .map(|l| extract_level(backend, plane_points, l.z, cfg))
            .collect()
    };
    select_table(per_level.into_iter().flatten(), cfg)
}
