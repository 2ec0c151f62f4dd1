use anyhow::Result;
use tabletop_core::{Cloud, Cluster, PlaneCoeffs};
use tabletop_segment::{Hull, RegionGrowCfg};

use crate::config::DetectorConfig;

/// Geometry operations the detector delegates to.
///
/// Every method defaults to the native implementation in the sibling crates;
/// test doubles override only the stages they want to pin down.
pub trait GeometryBackend: Send + Sync {
    /// Normals + normal-direction filter: the points that may lie on a
    /// horizontal plane, with their `nx, ny, nz, curvature` columns.
    fn plane_points(&self, source: &Cloud, cfg: &DetectorConfig) -> Result<Cloud> {
        let with_normals =
            tabletop_features::estimate_normals(source, cfg.normal_radius, cfg.leaf, true)?;
        let idx = tabletop_filters::normal_z_indices(&with_normals, cfg.normal_z);
        Ok(with_normals.select(&idx, false))
    }

    /// Smoothness-based clusters of the plane points.
    fn region_clusters(&self, plane_points: &Cloud, cfg: &DetectorConfig) -> Result<Vec<Cluster>> {
        let grow = RegionGrowCfg {
            min_size: cfg.region_min_size,
            max_size: cfg.region_max_size,
            neighbours: cfg.region_neighbours,
            smoothness: cfg.smoothness_deg.to_radians(),
            curvature_threshold: cfg.region_curvature,
            cell: cfg.normal_radius,
        };
        tabletop_segment::region_grow(plane_points, &grow)
    }

    /// Points within `thickness` of `plane`, projected onto it.
    fn slab_projection(&self, plane: &PlaneCoeffs, thickness: f32, cloud: &Cloud) -> Cloud {
        let band = tabletop_filters::slab(plane, thickness, cloud);
        tabletop_filters::project_onto_plane(plane, &band.xyz())
    }

    fn proximity_clusters(&self, cloud: &Cloud, tolerance: f32, min_size: usize, max_size: usize) -> Vec<Cluster> {
        tabletop_segment::euclidean_cluster(cloud, tolerance, min_size, max_size)
    }

    fn convex_hull(&self, cloud: &Cloud) -> Option<Hull> {
        tabletop_segment::convex_hull_xy(cloud)
    }
}

/// The sibling crates, unmodified.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeBackend;

impl GeometryBackend for NativeBackend {}
