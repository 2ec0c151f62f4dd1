//! tabletop-segment — clustering and hull primitives for plane extraction.
//!
//! - [`region_grow`]: normal-smoothness region growing (kNN neighbourhoods).
//! - [`euclidean_cluster`]: connected components under a distance tolerance.
//! - [`convex_hull_xy`]: 2-D convex hull of a (projected) cloud with its area.

use std::collections::VecDeque;

use anyhow::{bail, Result};
use log::trace;
use tabletop_core::{Cloud, Cluster, CURVATURE};
use tabletop_nn::{GridIndex, NeighborIndex3};

#[derive(Clone, Copy, Debug)]
pub struct RegionGrowCfg {
    pub min_size: usize,
    pub max_size: usize,
    /// k for the kNN neighbourhood of each point
    pub neighbours: usize,
    /// maximum angle between neighbouring normals (radians)
    pub smoothness: f32,
    /// accepted points only seed further growth below this curvature
    pub curvature_threshold: Option<f32>,
    /// grid cell for the neighbour index
    pub cell: f32,
}

impl Default for RegionGrowCfg {
    fn default() -> Self {
        Self {
            min_size: 30,
            max_size: 307_200,
            neighbours: 20,
            smoothness: 8f32.to_radians(),
            curvature_threshold: Some(0.05),
            cell: 0.02,
        }
    }
}

/// Split a cloud with normals into smoothly-connected regions.
///
/// Seeds are visited in ascending curvature (index order when the cloud has no
/// curvature column). A neighbour joins the region when the angle between its
/// normal and the expanding point's normal is below `smoothness`, regardless
/// of normal sign.
pub fn region_grow(cloud: &Cloud, cfg: &RegionGrowCfg) -> Result<Vec<Cluster>> {
    let Some((nx, ny, nz)) = cloud.normals() else {
        bail!("region growing needs nx/ny/nz columns");
    };
    let n = cloud.len();
    if n == 0 { return Ok(Vec::new()); }

    let mut order: Vec<usize> = (0..n).collect();
    if let Some(curv) = cloud.attr(CURVATURE) {
        order.sort_by(|&a, &b| curv[a].total_cmp(&curv[b]));
    }
    let curv = cloud.attr(CURVATURE);
    let cos_th = cfg.smoothness.cos();
    let index = GridIndex::build(cloud.into(), cfg.cell);

    let mut labelled = vec![false; n];
    let mut regions = Vec::new();
    let mut queue = VecDeque::new();

    for &seed in &order {
        if labelled[seed] { continue; }
        labelled[seed] = true;
        let mut region = vec![seed];
        queue.clear();
        queue.push_back(seed);

        while let Some(cur) = queue.pop_front() {
            for nb in index.knn(cur, cfg.neighbours) {
                let j = nb.idx;
                if labelled[j] { continue; }
                let dot = nx[cur] * nx[j] + ny[cur] * ny[j] + nz[cur] * nz[j];
                if dot.abs() < cos_th { continue; }
                labelled[j] = true;
                region.push(j);
                let may_seed = match (cfg.curvature_threshold, curv) {
                    (Some(th), Some(c)) => c[j] < th,
                    _ => true,
                };
                if may_seed { queue.push_back(j); }
            }
        }

        if (cfg.min_size..=cfg.max_size).contains(&region.len()) {
            regions.push(region);
        } else {
            trace!("region of {} points outside [{}, {}]", region.len(), cfg.min_size, cfg.max_size);
        }
    }
    Ok(regions)
}

/// Connected components where neighbours lie within `tolerance`.
/// Clusters outside `[min_size, max_size]` are dropped; the rest are returned
/// largest first (ties keep discovery order).
pub fn euclidean_cluster(cloud: &Cloud, tolerance: f32, min_size: usize, max_size: usize) -> Vec<Cluster> {
    let n = cloud.len();
    if n == 0 || tolerance <= 0.0 { return Vec::new(); }
    let index = GridIndex::build(cloud.into(), tolerance);

    let mut visited = vec![false; n];
    let mut clusters = Vec::new();
    let mut queue = VecDeque::new();
    for start in 0..n {
        if visited[start] { continue; }
        visited[start] = true;
        let mut cluster = vec![start];
        queue.clear();
        queue.push_back(start);
        while let Some(cur) = queue.pop_front() {
            for nb in index.radius(cur, tolerance) {
                if visited[nb.idx] { continue; }
                visited[nb.idx] = true;
                cluster.push(nb.idx);
                queue.push_back(nb.idx);
            }
        }
        if (min_size..=max_size).contains(&cluster.len()) {
            clusters.push(cluster);
        }
    }
    clusters.sort_by(|a, b| b.len().cmp(&a.len()));
    clusters
}

/// Convex polygon boundary and its planar area.
#[derive(Clone, Debug)]
pub struct Hull {
    /// Boundary points, counter-clockwise in x/y, z carried from the input.
    pub cloud: Cloud,
    pub area: f32,
}

/// Convex hull of the x/y footprint (Andrew's monotone chain).
///
/// Collinear boundary points are dropped. Returns `None` for fewer than three
/// distinct points or a degenerate (zero-area) footprint.
pub fn convex_hull_xy(cloud: &Cloud) -> Option<Hull> {
    if cloud.len() < 3 { return None; }
    let mut idx: Vec<usize> = (0..cloud.len()).collect();
    idx.sort_by(|&a, &b| {
        cloud.x[a].total_cmp(&cloud.x[b]).then(cloud.y[a].total_cmp(&cloud.y[b]))
    });
    idx.dedup_by(|a, b| cloud.x[*a] == cloud.x[*b] && cloud.y[*a] == cloud.y[*b]);
    if idx.len() < 3 { return None; }

    let cross = |o: usize, a: usize, b: usize| -> f64 {
        let (ox, oy) = (cloud.x[o] as f64, cloud.y[o] as f64);
        (cloud.x[a] as f64 - ox) * (cloud.y[b] as f64 - oy)
            - (cloud.y[a] as f64 - oy) * (cloud.x[b] as f64 - ox)
    };

    let mut chain: Vec<usize> = Vec::with_capacity(2 * idx.len());
    // lower hull
    for &p in &idx {
        while chain.len() >= 2 && cross(chain[chain.len() - 2], chain[chain.len() - 1], p) <= 0.0 {
            chain.pop();
        }
        chain.push(p);
    }
    // upper hull
    let lower_len = chain.len() + 1;
    for &p in idx.iter().rev().skip(1) {
        while chain.len() >= lower_len && cross(chain[chain.len() - 2], chain[chain.len() - 1], p) <= 0.0 {
            chain.pop();
        }
        chain.push(p);
    }
    chain.pop(); // last point repeats the first
    if chain.len() < 3 { return None; }

    let mut twice_area = 0.0f64;
    for k in 0..chain.len() {
        let (a, b) = (chain[k], chain[(k + 1) % chain.len()]);
        twice_area += cloud.x[a] as f64 * cloud.y[b] as f64 - cloud.x[b] as f64 * cloud.y[a] as f64;
    }
    let area = (twice_area / 2.0).abs() as f32;
    if area <= 0.0 { return None; }

    Some(Hull { cloud: cloud.select(&chain, false).xyz(), area })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tabletop_core::{NX, NY, NZ};

    fn with_normals(mut c: Cloud, normal: impl Fn(usize) -> [f32; 3]) -> Cloud {
        let ns: Vec<[f32; 3]> = (0..c.len()).map(normal).collect();
        c.attrs_f32.insert(NX.into(), ns.iter().map(|n| n[0]).collect());
        c.attrs_f32.insert(NY.into(), ns.iter().map(|n| n[1]).collect());
        c.attrs_f32.insert(NZ.into(), ns.iter().map(|n| n[2]).collect());
        c
    }

    fn patch(x0: f32, y0: f32, z: f32, side: usize, step: f32) -> Vec<[f32; 3]> {
        let mut v = Vec::new();
        for i in 0..side {
            for j in 0..side {
                v.push([x0 + i as f32 * step, y0 + j as f32 * step, z]);
            }
        }
        v
    }

    #[test]
    fn region_grow_splits_by_normal_direction() {
        // horizontal patch next to a 45° tilted patch, touching along x = 0.1
        let mut pts = patch(0.0, 0.0, 0.5, 10, 0.01);
        for i in 1..10 {
            for j in 0..10 {
                pts.push([0.09 + i as f32 * 0.01, j as f32 * 0.01, 0.5 + i as f32 * 0.01]);
            }
        }
        let c = with_normals(Cloud::from_points(&pts), |i| {
            if i < 100 { [0.0, 0.0, 1.0] } else { [-0.7071, 0.0, 0.7071] }
        });
        let cfg = RegionGrowCfg { min_size: 30, ..Default::default() };
        let mut regions = region_grow(&c, &cfg).unwrap();
        regions.sort_by_key(|r| r.len());
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].len(), 90);
        assert_eq!(regions[1].len(), 100);
        assert!(regions[1].iter().all(|&i| i < 100));
    }

    #[test]
    fn high_curvature_points_join_but_do_not_seed() {
        // 1 is the only bridge between 0 and 2
        let mut c = with_normals(
            Cloud::from_points(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.9, 0.0, 0.0]]),
            |_| [0.0, 0.0, 1.0],
        );
        c.attrs_f32.insert(CURVATURE.into(), vec![0.0, 0.5, 0.0]);
        let base = RegionGrowCfg { min_size: 1, neighbours: 1, cell: 1.0, ..Default::default() };

        let gated = region_grow(&c, &base).unwrap();
        assert_eq!(gated, vec![vec![0, 1], vec![2]]);

        let open = RegionGrowCfg { curvature_threshold: None, ..base };
        assert_eq!(region_grow(&c, &open).unwrap(), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn region_grow_drops_small_regions_and_needs_normals() {
        let pts = patch(0.0, 0.0, 0.0, 4, 0.01);
        let c = Cloud::from_points(&pts);
        assert!(region_grow(&c, &RegionGrowCfg::default()).is_err());
        let c = with_normals(c, |_| [0.0, 0.0, 1.0]);
        assert!(region_grow(&c, &RegionGrowCfg::default()).unwrap().is_empty());
    }

    #[test]
    fn euclidean_cluster_orders_largest_first() {
        let mut pts = patch(0.0, 0.0, 0.0, 3, 0.01);
        pts.extend(patch(1.0, 1.0, 0.0, 5, 0.01));
        pts.push([5.0, 5.0, 0.0]);
        let c = Cloud::from_points(&pts);
        let clusters = euclidean_cluster(&c, 0.05, 2, 100);
        assert_eq!(clusters.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![25, 9]);
        assert!(euclidean_cluster(&c, 0.05, 10, 20).is_empty());
    }

    #[test]
    fn hull_of_square_with_interior_points() {
        let mut pts = patch(0.0, 0.0, 0.7, 11, 0.1);
        pts.push([0.5, 0.5, 0.7]);
        let hull = convex_hull_xy(&Cloud::from_points(&pts)).unwrap();
        assert_eq!(hull.cloud.len(), 4);
        assert_abs_diff_eq!(hull.area, 1.0, epsilon = 1e-4);
        assert!(hull.cloud.attrs_f32.is_empty());
        // counter-clockwise from the lowest-left corner
        let corners: Vec<(f32, f32)> = hull.cloud.points().map(|p| (p[0].round(), p[1].round())).collect();
        assert_eq!(corners, vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
    }

    #[test]
    fn hull_rejects_degenerate_input() {
        assert!(convex_hull_xy(&Cloud::from_points(&[[0.0; 3], [1.0, 0.0, 0.0]])).is_none());
        let line = Cloud::from_points(&[[0.0, 0.0, 0.0], [1.0, 1.0, 0.0], [2.0, 2.0, 0.0], [1.0, 1.0, 0.0]]);
        assert!(convex_hull_xy(&line).is_none());
    }
}
