//! tabletop-detect — finds a horizontal table top in a point cloud.
//!
//! Pipeline per frame:
//!
//! ```text
//! source ─► plane points ─► region clusters ─► candidate levels
//!           (normal filter)  (smoothness)       (trimmed midrange, ascending)
//!                                                        │
//!                 pose ◄─ selected hull ◄─ hulls per level (slab → cluster → hull)
//! ```
//!
//! Geometry primitives come from a [`GeometryBackend`]; [`NativeBackend`]
//! uses the sibling crates.

pub mod backend;
pub mod config;
pub mod detector;
pub mod extract;
pub mod height;
pub mod pose;
pub mod source;

pub use backend::{GeometryBackend, NativeBackend};
pub use config::{DetectorConfig, RightAngleCheck};
pub use detector::{Detection, LevelScan, TableDetector};
pub use extract::{extract_level, extract_levels, select_table, HullCandidate, TableSelection};
pub use height::{candidate_levels, trimmed_midrange, CandidateLevel, TrimmedMidrange};
pub use pose::{estimate_pose, TablePose};
pub use source::{camera_pose, camera_to_reference};
