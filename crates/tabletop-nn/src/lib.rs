//! tabletop-nn — neighbor indices for 3D (uniform grid hash).

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use smallvec::SmallVec;
use tabletop_core::CloudView;

#[derive(Copy, Clone, Debug)]
pub struct Neighbor { pub idx: usize, pub dist2: f32 }

/// Trait for geometry-first neighborhood queries.
/// Both queries exclude the query point itself.
pub trait NeighborIndex3 {
    fn knn(&self, i: usize, k: usize) -> SmallVec<[Neighbor; 64]>;
    fn radius(&self, i: usize, r: f32) -> SmallVec<[Neighbor; 128]>;
}

/// Uniform grid hash, cell size = r (good for radius queries / voxel ops).
pub struct GridIndex<'a> {
    pts: CloudView<'a>,
    cell: f32,
    buckets: HashMap<[i32;3], Vec<usize>>,
    /// Largest Chebyshev distance (in cells) between any two occupied cells.
    max_layer: i32,
}

impl<'a> GridIndex<'a> {
    pub fn build(pts: CloudView<'a>, cell: f32) -> Self {
        let cell = cell.max(1e-6);
        let mut buckets: HashMap<[i32;3], Vec<usize>> = HashMap::new();
        let inv = 1.0 / cell;
        let mut lo = [i32::MAX; 3];
        let mut hi = [i32::MIN; 3];
        for i in 0..pts.len() {
            let key = [
                (pts.x[i] * inv).floor() as i32,
                (pts.y[i] * inv).floor() as i32,
                (pts.z[i] * inv).floor() as i32,
            ];
            for d in 0..3 {
                lo[d] = lo[d].min(key[d]);
                hi[d] = hi[d].max(key[d]);
            }
            match buckets.entry(key) {
                Entry::Vacant(v) => { v.insert(vec![i]); }
                Entry::Occupied(mut o) => o.get_mut().push(i),
            }
        }
        let max_layer = if pts.is_empty() {
            0
        } else {
            (0..3).map(|d| hi[d].saturating_sub(lo[d])).max().unwrap_or(0)
        };
        Self { pts, cell, buckets, max_layer }
    }

    fn key_at(&self, p: [f32; 3]) -> [i32;3] {
        let inv = 1.0 / self.cell;
        [
            (p[0]*inv).floor() as i32,
            (p[1]*inv).floor() as i32,
            (p[2]*inv).floor() as i32,
        ]
    }

    fn point(&self, i: usize) -> [f32; 3] { [self.pts.x[i], self.pts.y[i], self.pts.z[i]] }

    fn dist2(&self, j: usize, p: [f32; 3]) -> f32 {
        (self.pts.x[j]-p[0]).powi(2)
            + (self.pts.y[j]-p[1]).powi(2)
            + (self.pts.z[j]-p[2]).powi(2)
    }

    /// Cells at exactly Chebyshev distance `layer` from `base`.
    fn shell(base: [i32;3], layer: i32) -> impl Iterator<Item=[i32;3]> {
        (-layer..=layer).flat_map(move |dx|
            (-layer..=layer).flat_map(move |dy|
                (-layer..=layer).filter_map(move |dz| {
                    let on_shell = dx.abs() == layer || dy.abs() == layer || dz.abs() == layer;
                    on_shell.then_some([base[0]+dx, base[1]+dy, base[2]+dz])
                })))
    }

    /// Points within `r` of an arbitrary position, optionally skipping one index.
    fn radius_at(&self, p: [f32; 3], r: f32, skip: Option<usize>) -> SmallVec<[Neighbor; 128]> {
        let mut out = SmallVec::<[Neighbor;128]>::new();
        let r2 = r*r;
        let span = (r / self.cell).ceil().max(1.0) as i32;
        let base = self.key_at(p);
        for dx in -span..=span {
            for dy in -span..=span {
                for dz in -span..=span {
                    let key = [base[0]+dx, base[1]+dy, base[2]+dz];
                    let Some(bin) = self.buckets.get(&key) else { continue };
                    for &j in bin {
                        if Some(j) == skip { continue; }
                        let d2 = self.dist2(j, p);
                        if d2 <= r2 { out.push(Neighbor{ idx:j, dist2:d2 }); }
                    }
                }
            }
        }
        out
    }
}

impl<'a> NeighborIndex3 for GridIndex<'a> {
    fn knn(&self, i: usize, k: usize) -> SmallVec<[Neighbor; 64]> {
        let mut out: SmallVec<[Neighbor; 64]> = SmallVec::new();
        if k == 0 { return out; }
        let p = self.point(i);
        let base = self.key_at(p);
        let mut layer = 0;
        loop {
            for key in Self::shell(base, layer) {
                if let Some(bin) = self.buckets.get(&key) {
                    for &j in bin {
                        if j == i { continue; }
                        out.push(Neighbor{ idx:j, dist2:self.dist2(j, p) });
                    }
                }
            }
            if out.len() >= k {
                out.sort_by(|a,b| a.dist2.total_cmp(&b.dist2));
                // anything outside the visited shells is at least layer*cell away
                let bound = layer as f32 * self.cell;
                if out[k-1].dist2 <= bound*bound { break; }
            }
            if layer >= self.max_layer { break; }
            layer += 1;
        }
        out.sort_by(|a,b| a.dist2.total_cmp(&b.dist2));
        out.truncate(k);
        out
    }

    fn radius(&self, i: usize, r: f32) -> SmallVec<[Neighbor; 128]> {
        self.radius_at(self.point(i), r, Some(i))
    }
}
