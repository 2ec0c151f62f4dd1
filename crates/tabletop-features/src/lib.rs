use anyhow::Result;
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use tabletop_core::{Cloud, CURVATURE, NX, NY, NZ};
use tabletop_nn::{GridIndex, NeighborIndex3};

/// Estimate normals using PCA over neighbors within radius `r`.
///
/// When `leaf > 0` the cloud is voxel-downsampled first, so the output has one
/// point per occupied voxel. Writes "nx","ny","nz" (and "curvature" when
/// `with_curvature`) into attrs_f32. Normals are oriented towards +z. A point
/// needs at least two neighbours (three points with itself) for a normal;
/// otherwise it gets a zero normal and zero curvature.
pub fn estimate_normals(cloud: &Cloud, r: f32, leaf: f32, with_curvature: bool) -> Result<Cloud> {
    let cloud = if leaf > 0.0 {
        tabletop_filters::voxel_downsample(cloud, leaf)?
    } else {
        cloud.clone()
    };
    estimate_normals_radius(cloud, r, with_curvature)
}

/// Normals over the radius neighbourhood of each point, without resampling.
pub fn estimate_normals_radius(mut cloud: Cloud, r: f32, with_curvature: bool) -> Result<Cloud> {
    anyhow::ensure!(r.is_finite() && r > 0.0, "normal radius must be positive, got {r}");
    let view = (&cloud).into();
    let index = GridIndex::build(view, r);

    // Parallel: compute one normal per point, collect, then split into columns.
    let normals: Vec<[f32; 4]> = (0..cloud.len())
        .into_par_iter()
        .map(|i| {
            let neigh = index.radius(i, r);
            if neigh.len() < 2 {
                return [0.0, 0.0, 0.0, 0.0];
            }

            // offsets from the query point, in f64
            let p = [cloud.x[i], cloud.y[i], cloud.z[i]];
            let offsets: Vec<Vector3<f64>> = std::iter::once(i)
                .chain(neigh.iter().map(|n| n.idx))
                .map(|j| Vector3::new(
                    (cloud.x[j] - p[0]) as f64,
                    (cloud.y[j] - p[1]) as f64,
                    (cloud.z[j] - p[2]) as f64,
                ))
                .collect();
            let mean = offsets.iter().sum::<Vector3<f64>>() / offsets.len() as f64;

            let mut c = Matrix3::<f64>::zeros();
            for o in &offsets {
                let v = o - mean;
                c += v * v.transpose();
            }

            // smallest eigenvector ~ normal
            let eig = c.symmetric_eigen();
            let (mut min_i, mut min_val) = (0, eig.eigenvalues[0]);
            for k in 1..3 {
                if eig.eigenvalues[k] < min_val { min_i = k; min_val = eig.eigenvalues[k]; }
            }
            let n = eig.eigenvectors.column(min_i).normalize();
            let sign = if n[2] < 0.0 { -1.0 } else { 1.0 };
            let total = eig.eigenvalues.sum();
            let curv = if total > 0.0 { (min_val / total).max(0.0) } else { 0.0 };
            [(n[0] * sign) as f32, (n[1] * sign) as f32, (n[2] * sign) as f32, curv as f32]
        })
        .collect();

    // Split into columns
    let mut nx = Vec::with_capacity(normals.len());
    let mut ny = Vec::with_capacity(normals.len());
    let mut nz = Vec::with_capacity(normals.len());
    let mut curv = Vec::with_capacity(normals.len());
    for v in normals {
        nx.push(v[0]); ny.push(v[1]); nz.push(v[2]); curv.push(v[3]);
    }

    cloud.attrs_f32.insert(NX.into(), nx);
    cloud.attrs_f32.insert(NY.into(), ny);
    cloud.attrs_f32.insert(NZ.into(), nz);
    if with_curvature {
        cloud.attrs_f32.insert(CURVATURE.into(), curv);
    }
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn grid(nx: usize, ny: usize, step: f32, z: impl Fn(f32, f32) -> f32) -> Cloud {
        let mut c = Cloud::default();
        for i in 0..nx {
            for j in 0..ny {
                let (x, y) = (i as f32 * step, j as f32 * step);
                c.push(x, y, z(x, y));
            }
        }
        c
    }

    #[test]
    fn flat_patch_points_up() {
        let c = grid(10, 10, 0.01, |_, _| 0.7);
        let out = estimate_normals(&c, 0.025, 0.0, true).unwrap();
        let (_, _, nz) = out.normals().unwrap();
        for v in nz { assert_abs_diff_eq!(*v, 1.0, epsilon = 1e-4); }
        for v in out.attr(CURVATURE).unwrap() { assert!(*v < 1e-4); }
    }

    #[test]
    fn vertical_wall_has_horizontal_normal() {
        let mut c = Cloud::default();
        for i in 0..10 {
            for k in 0..10 {
                c.push(i as f32 * 0.01, 0.5, k as f32 * 0.01);
            }
        }
        let out = estimate_normals(&c, 0.025, 0.0, false).unwrap();
        let (_, ny, nz) = out.normals().unwrap();
        assert!(out.attr(CURVATURE).is_none());
        for i in 0..out.len() {
            assert!(nz[i].abs() < 1e-3);
            assert_abs_diff_eq!(ny[i].abs(), 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn isolated_point_gets_zero_normal() {
        let c = Cloud::from_points(&[[0.0, 0.0, 0.0], [5.0, 5.0, 5.0]]);
        let out = estimate_normals(&c, 0.1, 0.0, true).unwrap();
        assert_eq!(out.normals().unwrap().2, &[0.0, 0.0][..]);
    }

    #[test]
    fn three_points_are_enough_for_a_normal() {
        let pair = Cloud::from_points(&[[0.0, 0.0, 0.3], [0.01, 0.0, 0.3]]);
        let out = estimate_normals(&pair, 0.05, 0.0, true).unwrap();
        assert_eq!(out.normals().unwrap().2, &[0.0, 0.0][..]);

        let tri = Cloud::from_points(&[[0.0, 0.0, 0.3], [0.01, 0.0, 0.3], [0.0, 0.01, 0.3]]);
        let out = estimate_normals(&tri, 0.05, 0.0, true).unwrap();
        for v in out.attr(NZ).unwrap() { assert_abs_diff_eq!(*v, 1.0, epsilon = 1e-6); }
    }

    #[test]
    fn flat_patch_points_up_at_any_height() {
        for z0 in [0.0, 0.35, 0.7, 1.1] {
            let c = grid(10, 10, 0.01, |_, _| z0);
            let out = estimate_normals(&c, 0.025, 0.0, true).unwrap();
            for v in out.attr(NZ).unwrap() { assert_abs_diff_eq!(*v, 1.0, epsilon = 1e-6); }
        }
    }

    #[test]
    fn leaf_downsamples_before_estimation() {
        let c = grid(20, 20, 0.005, |_, _| 0.0);
        let out = estimate_normals(&c, 0.025, 0.01, true).unwrap();
        assert!(out.len() < c.len());
        assert_eq!(out.attr(NZ).unwrap().len(), out.len());
    }
}
