//! Table pose from the selected hull.
//!
//! Position is taken from the hull's bounding box. Yaw comes from the first
//! near-right angle found while walking the hull points that touch the box.

use std::f32::consts::{FRAC_PI_2, PI};

use nalgebra::{UnitQuaternion, Vector2};
use tabletop_core::{Aabb, Cloud};

use crate::config::RightAngleCheck;

const RIGHT_ANGLE_TOLERANCE: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TablePose {
    /// x/y: bounding box centre; z: `(max_z - base_link_height) / 2`
    pub position: [f32; 3],
    pub yaw: f32,
    /// pure yaw rotation
    pub orientation: UnitQuaternion<f32>,
}

/// Pose of the table outlined by `hull`; `None` for an empty hull.
pub fn estimate_pose(hull: &Cloud, base_link_height: f32, check: RightAngleCheck) -> Option<TablePose> {
    let bb = hull.aabb()?;
    let center = bb.center();
    let position = [center[0], center[1], (bb.max[2] - base_link_height) / 2.0];
    let yaw = estimate_yaw(&box_vertices(hull, &bb), check);
    Some(TablePose {
        position,
        yaw,
        orientation: UnitQuaternion::from_euler_angles(0.0, 0.0, yaw),
    })
}

/// Hull points lying on the box edges, in hull order.
///
/// A point is pushed once for every edge it touches (`x == max`, `y == max`,
/// `x == min`, `y == min`), so box corners appear twice in a row.
pub fn box_vertices(hull: &Cloud, bb: &Aabb) -> Vec<[f32; 3]> {
    let mut out = Vec::new();
    for p in hull.points() {
        let touches = [p[0] == bb.max[0], p[1] == bb.max[1], p[0] == bb.min[0], p[1] == bb.min[1]];
        for _ in touches.iter().filter(|t| **t) {
            out.push(p);
        }
    }
    out
}

/// Angle between `m - s` and `e - m` in the x/y plane, in `[0, π]`.
/// `None` when either vector has zero length.
pub fn triplet_angle(s: [f32; 3], m: [f32; 3], e: [f32; 3]) -> Option<f32> {
    let ms = Vector2::new(m[0] - s[0], m[1] - s[1]);
    let em = Vector2::new(e[0] - m[0], e[1] - m[1]);
    let denom = ms.norm() * em.norm();
    if denom == 0.0 {
        return None;
    }
    Some((ms.dot(&em) / denom).clamp(-1.0, 1.0).acos())
}

pub fn is_right_angle(angle: f32, check: RightAngleCheck) -> bool {
    let near_three_halves = (angle - 3.0 * PI / 2.0).abs() < RIGHT_ANGLE_TOLERANCE;
    match check {
        RightAngleCheck::Strict => (angle - FRAC_PI_2).abs() < RIGHT_ANGLE_TOLERANCE || near_three_halves,
        RightAngleCheck::Literal => angle - FRAC_PI_2 < RIGHT_ANGLE_TOLERANCE || near_three_halves,
    }
}

/// Yaw from the first consecutive triplet forming a right angle, else 0.
///
/// Triplets are `(i, i+1, i+2)` with the last one wrapping its end back to
/// index 0. The yaw is `atan(x / y)` of the longer of the two edges.
pub fn estimate_yaw(vertices: &[[f32; 3]], check: RightAngleCheck) -> f32 {
    let n = vertices.len();
    for i in 0..n.saturating_sub(1) {
        let (s, m) = (vertices[i], vertices[i + 1]);
        let e = if i + 2 < n { vertices[i + 2] } else { vertices[0] };
        let Some(angle) = triplet_angle(s, m, e) else { continue };
        if !is_right_angle(angle, check) {
            continue;
        }
        let ms = [m[0] - s[0], m[1] - s[1]];
        let em = [e[0] - m[0], e[1] - m[1]];
        let edge = if ms[0].hypot(ms[1]) > em[0].hypot(em[1]) { ms } else { em };
        return (edge[0] / edge[1]).atan();
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square(side: f32, z: f32) -> Cloud {
        Cloud::from_points(&[[0.0, 0.0, z], [side, 0.0, z], [side, side, z], [0.0, side, z]])
    }

    #[test]
    fn square_corners_form_right_angle() {
        let c = square(1.0, 0.7);
        let angle = triplet_angle(c.point(0), c.point(1), c.point(2)).unwrap();
        assert_abs_diff_eq!(angle, FRAC_PI_2, epsilon = 1e-6);
        assert!(is_right_angle(angle, RightAngleCheck::Strict));
    }

    #[test]
    fn axis_aligned_square_has_zero_yaw() {
        // corners touch two box edges each, so every triplet repeats a point
        // and the pose falls back to yaw 0
        let hull = square(1.0, 0.7);
        let v = box_vertices(&hull, &hull.aabb().unwrap());
        let n = v.len();
        assert!((0..n - 1).all(|i| triplet_angle(v[i], v[i + 1], v[(i + 2) % n]).is_none()));
        let pose = estimate_pose(&hull, 0.4, RightAngleCheck::Strict).unwrap();
        assert_abs_diff_eq!(pose.yaw, 0.0);
        assert_abs_diff_eq!(pose.orientation.angle(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn square_corners_give_zero_yaw_through_right_angle() {
        let corners = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]];
        let angle = triplet_angle(corners[0], corners[1], corners[2]).unwrap();
        assert!(is_right_angle(angle, RightAngleCheck::Strict));
        // equal edges, so the second edge (0, 1) is used: atan(0 / 1)
        assert_abs_diff_eq!(estimate_yaw(&corners, RightAngleCheck::Strict), 0.0);
    }

    #[test]
    fn corners_are_counted_per_edge() {
        let c = square(2.0, 0.0);
        let v = box_vertices(&c, &c.aabb().unwrap());
        assert_eq!(v.len(), 8);
        assert_eq!(v[0], v[1]);
        // duplicated neighbours never give an angle
        assert!(triplet_angle(v[0], v[1], v[2]).is_none());
    }

    #[test]
    fn position_is_box_centre_with_half_height_convention() {
        let hull = Cloud::from_points(&[[1.0, 2.0, 0.75], [3.0, 2.0, 0.75], [3.0, 5.0, 0.75], [1.0, 5.0, 0.75]]);
        let pose = estimate_pose(&hull, 0.4, RightAngleCheck::Strict).unwrap();
        assert_abs_diff_eq!(pose.position[0], 2.0);
        assert_abs_diff_eq!(pose.position[1], 3.5);
        assert_abs_diff_eq!(pose.position[2], 0.175, epsilon = 1e-6);

        let mut lifted = hull.clone();
        lifted.z.iter_mut().for_each(|z| *z = 1.2);
        let lifted_pose = estimate_pose(&lifted, 0.4, RightAngleCheck::Strict).unwrap();
        assert_eq!(lifted_pose.position[..2], pose.position[..2]);
        assert_abs_diff_eq!(lifted_pose.position[2], 0.4, epsilon = 1e-6);
    }

    #[test]
    fn rotated_rectangle_yaw_from_longer_edge() {
        // corners of a 2 x 1 rectangle rotated so each touches one box edge
        let (c, s) = (0.3f32.cos(), 0.3f32.sin());
        let rot = |x: f32, y: f32| [x * c - y * s, x * s + y * c, 0.7];
        let vertices = [rot(0.0, 0.0), rot(2.0, 0.0), rot(2.0, 1.0), rot(0.0, 1.0)];
        let hull = Cloud::from_points(&vertices);
        let bb = hull.aabb().unwrap();
        assert_eq!(box_vertices(&hull, &bb).len(), 4);

        let yaw = estimate_yaw(&vertices, RightAngleCheck::Strict);
        // long edge direction (cos 0.3, sin 0.3): atan(x / y)
        assert_abs_diff_eq!(yaw, (c / s).atan(), epsilon = 1e-5);
    }

    #[test]
    fn literal_check_accepts_acute_angles() {
        let acute = 0.5;
        assert!(!is_right_angle(acute, RightAngleCheck::Strict));
        assert!(is_right_angle(acute, RightAngleCheck::Literal));
        assert!(!is_right_angle(2.0, RightAngleCheck::Literal));
        assert!(is_right_angle(FRAC_PI_2 + 0.05, RightAngleCheck::Literal));
    }

    #[test]
    fn no_right_angle_defaults_to_zero() {
        let line = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        assert_eq!(estimate_yaw(&line, RightAngleCheck::Strict), 0.0);
        assert_eq!(estimate_yaw(&[], RightAngleCheck::Strict), 0.0);
        assert!(estimate_pose(&Cloud::default(), 0.4, RightAngleCheck::Strict).is_none());
    }
}
