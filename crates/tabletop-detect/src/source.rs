//! Bringing a camera-frame cloud into the reference (base link) frame.

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion};
use tabletop_core::Cloud;

/// Camera pose in the reference frame from `[tx, ty, tz, roll, pitch, yaw]`
/// (metres, radians).
pub fn camera_pose(params: [f32; 6]) -> Isometry3<f32> {
    let [tx, ty, tz, roll, pitch, yaw] = params;
    Isometry3::from_parts(
        Translation3::new(tx, ty, tz),
        UnitQuaternion::from_euler_angles(roll, pitch, yaw),
    )
}

/// Keep points whose camera depth (z) lies in `[0, max_depth]` when a bound is
/// given, then move them into the reference frame. Attribute columns are
/// dropped.
pub fn camera_to_reference(camera: &Cloud, pose: &Isometry3<f32>, max_depth: Option<f32>) -> Cloud {
    let kept = match max_depth {
        Some(d) => tabletop_filters::height_range(camera, 0.0, d),
        None => camera.xyz(),
    };
    let mut out = Cloud::default();
    out.reserve(kept.len());
    for p in kept.points() {
        let q = pose.transform_point(&Point3::new(p[0], p[1], p[2]));
        out.push(q.x, q.y, q.z);
    }
    out
}
