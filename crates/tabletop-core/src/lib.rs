//! tabletop-core — core data model and shared math/types.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// Attribute column names written by normal estimation.
pub const NX: &str = "nx";
pub const NY: &str = "ny";
pub const NZ: &str = "nz";
pub const CURVATURE: &str = "curvature";

/// Indices into a [`Cloud`] hypothesised to belong to one surface patch.
pub type Cluster = Vec<usize>;

/// Structure-of-Arrays point cloud.
/// Keep hot columns (x,y,z) tight; put optional columns in a name→column map.
#[derive(Default, Clone, Debug, Serialize, Deserialize)]
pub struct Cloud {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,

    /// Optional attributes (same length as x/y/z).
    /// Common keys: "nx","ny","nz","curvature","intensity".
    pub attrs_f32: HashMap<String, Vec<f32>>,
}

impl Cloud {
    pub fn len(&self) -> usize { self.x.len() }
    pub fn is_empty(&self) -> bool { self.x.is_empty() }
    pub fn push(&mut self, px: f32, py: f32, pz: f32) {
        self.x.push(px); self.y.push(py); self.z.push(pz);
    }
    pub fn reserve(&mut self, n: usize) {
        self.x.reserve(n); self.y.reserve(n); self.z.reserve(n);
        for v in self.attrs_f32.values_mut() { v.reserve(n); }
    }

    pub fn from_points(points: &[[f32; 3]]) -> Self {
        let mut c = Cloud::default();
        c.reserve(points.len());
        for p in points { c.push(p[0], p[1], p[2]); }
        c
    }

    #[inline]
    pub fn point(&self, i: usize) -> [f32; 3] { [self.x[i], self.y[i], self.z[i]] }

    pub fn points(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        (0..self.len()).map(move |i| self.point(i))
    }

    /// Attribute column, only if it is aligned with the points.
    pub fn attr(&self, key: &str) -> Option<&[f32]> {
        self.attrs_f32
            .get(key)
            .filter(|col| col.len() == self.len())
            .map(|col| col.as_slice())
    }

    /// `(nx, ny, nz)` columns if normals have been estimated.
    pub fn normals(&self) -> Option<(&[f32], &[f32], &[f32])> {
        Some((self.attr(NX)?, self.attr(NY)?, self.attr(NZ)?))
    }

    /// Copy of the selected points (or every other point when `invert`).
    /// Aligned attribute columns follow their points; misaligned ones are dropped.
    pub fn select(&self, indices: &[usize], invert: bool) -> Cloud {
        if invert {
            let mut drop = vec![false; self.len()];
            for &i in indices {
                if i < drop.len() { drop[i] = true; }
            }
            let keep: Vec<usize> = (0..self.len()).filter(|&i| !drop[i]).collect();
            return self.gather(&keep);
        }
        // caller order is preserved for plain selection
        let keep: Vec<usize> = indices.iter().copied().filter(|&i| i < self.len()).collect();
        self.gather(&keep)
    }

    fn gather(&self, keep: &[usize]) -> Cloud {
        let mut out = Cloud::default();
        out.reserve(keep.len());
        for &i in keep {
            out.push(self.x[i], self.y[i], self.z[i]);
        }
        for (k, col) in &self.attrs_f32 {
            if col.len() != self.len() { continue; }
            out.attrs_f32.insert(k.clone(), keep.iter().map(|&i| col[i]).collect());
        }
        out
    }

    /// Positions only; attribute columns are discarded.
    pub fn xyz(&self) -> Cloud {
        Cloud { x: self.x.clone(), y: self.y.clone(), z: self.z.clone(), attrs_f32: HashMap::new() }
    }

    pub fn aabb(&self) -> Option<Aabb> {
        if self.is_empty() { return None; }
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for p in self.points() {
            for k in 0..3 {
                min[k] = min[k].min(p[k]);
                max[k] = max[k].max(p[k]);
            }
        }
        Some(Aabb { min, max })
    }
}

/// Zero-copy view into a Cloud (slice-of-SoA).
#[derive(Copy, Clone)]
pub struct CloudView<'a> {
    pub x: &'a [f32],
    pub y: &'a [f32],
    pub z: &'a [f32],
}

impl<'a> From<&'a Cloud> for CloudView<'a> {
    fn from(c: &'a Cloud) -> Self { Self { x: &c.x, y: &c.y, z: &c.z } }
}

impl<'a> CloudView<'a> {
    pub fn len(&self) -> usize { self.x.len() }
    pub fn is_empty(&self) -> bool { self.x.is_empty() }
}

/// Simple AABB
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb { pub min: [f32;3], pub max: [f32;3] }
impl Aabb {
    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
            (self.min[2] + self.max[2]) / 2.0,
        ]
    }
}

/// Plane `ax + by + cz + d = 0`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneCoeffs { pub a: f32, pub b: f32, pub c: f32, pub d: f32 }

impl PlaneCoeffs {
    /// Horizontal plane at height `z`: (0, 0, 1, -z).
    pub fn horizontal(z: f32) -> Self { Self { a: 0.0, b: 0.0, c: 1.0, d: -z } }

    /// Signed distance of `p`; zero if the normal is degenerate.
    pub fn signed_distance(&self, p: [f32; 3]) -> f32 {
        let n2 = self.a * self.a + self.b * self.b + self.c * self.c;
        if n2 <= f32::EPSILON { return 0.0; }
        (self.a * p[0] + self.b * p[1] + self.c * p[2] + self.d) / n2.sqrt()
    }

    /// Orthogonal projection of `p` onto the plane.
    pub fn project(&self, p: [f32; 3]) -> [f32; 3] {
        let n2 = self.a * self.a + self.b * self.b + self.c * self.c;
        if n2 <= f32::EPSILON { return p; }
        let t = (self.a * p[0] + self.b * p[1] + self.c * p[2] + self.d) / n2;
        [p[0] - t * self.a, p[1] - t * self.b, p[2] - t * self.c]
    }
}
