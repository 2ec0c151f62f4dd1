//! tabletop-filters — voxel grid, pass-through, normal and plane filters.

use anyhow::{ensure, Result};
use hashbrown::HashMap;
use tabletop_core::{Cloud, PlaneCoeffs};

/// Voxel grid downsample (centroid). Grid size in same units as input.
/// Output is ordered by voxel key so repeated runs agree point for point.
pub fn voxel_downsample(input: &Cloud, voxel: f32) -> Result<Cloud> {
    ensure!(voxel.is_finite() && voxel > 0.0, "voxel size must be positive, got {voxel}");
    let inv = 1.0 / voxel;

    // Key = (ix,iy,iz) packed into i64 for hashmap friendliness
    fn key(ix:i32,iy:i32,iz:i32) -> i64 {
        ((ix as i64) & 0x1fffff) << 42 |
            ((iy as i64) & 0x1fffff) << 21 |
            ((iz as i64) & 0x1fffff)
    }

    let mut bins: HashMap<i64, (f64,f64,f64,u32)> = HashMap::new();
    for i in 0..input.len() {
        let ix = (input.x[i]*inv).floor() as i32;
        let iy = (input.y[i]*inv).floor() as i32;
        let iz = (input.z[i]*inv).floor() as i32;
        let e = bins.entry(key(ix,iy,iz)).or_insert((0.0,0.0,0.0,0));
        e.0 += input.x[i] as f64;
        e.1 += input.y[i] as f64;
        e.2 += input.z[i] as f64;
        e.3 += 1;
    }

    let mut bins: Vec<_> = bins.into_iter().collect();
    bins.sort_unstable_by_key(|(k, _)| *k);

    let mut out = Cloud::default();
    out.reserve(bins.len());
    for (_k,(sx,sy,sz,cnt)) in bins {
        let invc = 1.0 / (cnt as f64);
        out.push((sx*invc) as f32, (sy*invc) as f32, (sz*invc) as f32);
    }
    Ok(out)
}

/// Keep points with `zmin <= z <= zmax`. Attributes follow their points.
pub fn height_range(input: &Cloud, zmin: f32, zmax: f32) -> Cloud {
    let keep: Vec<usize> = (0..input.len())
        .filter(|&i| input.z[i] >= zmin && input.z[i] <= zmax)
        .collect();
    input.select(&keep, false)
}

/// Indices of points whose normal has `|nz| > threshold`.
/// A cloud without normal columns yields no indices.
pub fn normal_z_indices(input: &Cloud, threshold: f32) -> Vec<usize> {
    let Some((_, _, nz)) = input.normals() else { return Vec::new() };
    nz.iter()
        .enumerate()
        .filter(|(_, n)| n.abs() > threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Keep points within `thickness` (perpendicular distance) of `plane`.
pub fn slab(plane: &PlaneCoeffs, thickness: f32, input: &Cloud) -> Cloud {
    let keep: Vec<usize> = (0..input.len())
        .filter(|&i| plane.signed_distance(input.point(i)).abs() <= thickness)
        .collect();
    input.select(&keep, false)
}

/// Orthogonal projection of every point onto `plane`; attributes are kept.
pub fn project_onto_plane(plane: &PlaneCoeffs, input: &Cloud) -> Cloud {
    let mut out = input.clone();
    for i in 0..out.len() {
        let p = plane.project(input.point(i));
        out.x[i] = p[0]; out.y[i] = p[1]; out.z[i] = p[2];
    }
    out
}
