use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use tabletop_core::Cloud;
use tabletop_detect::{camera_pose, camera_to_reference, DetectorConfig, TableDetector, TablePose};

// ---------- helpers ----------

fn t0() -> std::time::Instant { std::time::Instant::now() }
fn lap(t: std::time::Instant, label: &str) {
    let ms = t.elapsed().as_secs_f64()*1000.0;
    info!("[{label}] {ms:.1} ms");
}

fn parse_pose(csv: &str) -> Result<[f32; 6]> {
    let v: Vec<f32> = csv.split(',').map(|s| s.trim().parse::<f32>()).collect::<Result<_, _>>()?;
    match <[f32; 6]>::try_from(v) {
        Ok(p) => Ok(p),
        Err(v) => anyhow::bail!("camera pose needs 6 values (tx,ty,tz,roll,pitch,yaw), got {}", v.len()),
    }
}

fn load_config(path: Option<&str>) -> Result<DetectorConfig> {
    match path {
        Some(p) => DetectorConfig::from_json_file(p),
        None => Ok(DetectorConfig::default()),
    }
}

/// Flat pose record written by `detect --json`.
#[derive(Serialize)]
struct PoseRecord { x: f32, y: f32, z: f32, yaw: f32, qx: f32, qy: f32, qz: f32, qw: f32 }

impl From<&TablePose> for PoseRecord {
    fn from(p: &TablePose) -> Self {
        let q = p.orientation.quaternion();
        Self {
            x: p.position[0], y: p.position[1], z: p.position[2], yaw: p.yaw,
            qx: q.i, qy: q.j, qz: q.k, qw: q.w,
        }
    }
}

// ---------- CLI ----------

#[derive(Parser)]
#[command(name="tabletop", version, about="Tabletop — horizontal table detection in point clouds")]
struct Args { #[command(subcommand)] cmd: Cmd }

#[derive(Subcommand)]
enum Cmd {
    /// Print point count and bounding box of a file (PLY / LAS)
    Info { input: String },

    /// Voxel downsample
    Voxel {
        input: String, output: String,
        #[arg(short, long, default_value_t=0.01)] size: f32,
    },

    /// Estimate normals and curvature using a radius
    Normals {
        input: String, output: String,
        #[arg(short, long, default_value_t=0.02)] radius: f32,
        /// voxel leaf applied first (0 disables)
        #[arg(short, long, default_value_t=0.01)] leaf: f32,
    },

    /// Print the candidate table heights of a cloud
    Levels {
        input: String,
        /// detector settings (JSON)
        #[arg(short, long)] config: Option<String>,
    },

    /// Detect the table and print its pose
    Detect {
        input: String,
        #[arg(short, long)] config: Option<String>,
        /// write the table hull as PLY
        #[arg(short, long)] output: Option<String>,
        /// write the pose as JSON
        #[arg(long)] json: Option<String>,
        /// input is a camera-frame cloud; camera pose in the base frame as
        /// "tx,ty,tz,roll,pitch,yaw" (metres, radians)
        #[arg(long, allow_hyphen_values=true)] camera_pose: Option<String>,
        /// with --camera-pose, keep points deeper than max_depth
        #[arg(long, default_value_t=false)] no_depth_filter: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match args.cmd {
        Cmd::Info { input } => cmd_info(&input),
        Cmd::Voxel { input, output, size } => cmd_voxel(&input, &output, size),
        Cmd::Normals { input, output, radius, leaf } => cmd_normals(&input, &output, radius, leaf),
        Cmd::Levels { input, config } => cmd_levels(&input, config.as_deref()),
        Cmd::Detect { input, config, output, json, camera_pose, no_depth_filter } =>
            cmd_detect(&input, config.as_deref(), output.as_deref(), json.as_deref(),
                       camera_pose.as_deref(), !no_depth_filter),
    }
}

// ---------- commands ----------

fn cmd_info(path: &str) -> Result<()> {
    let cloud = tabletop_io::read_auto(path)?;
    println!("points: {}", cloud.len());
    if let Some(bb) = cloud.aabb() {
        println!("min: {:?}", bb.min);
        println!("max: {:?}", bb.max);
    }
    let mut keys: Vec<&String> = cloud.attrs_f32.keys().collect();
    keys.sort();
    if !keys.is_empty() {
        println!("attributes: {:?}", keys);
    }
    Ok(())
}

fn cmd_voxel(input: &str, output: &str, size: f32) -> Result<()> {
    let cloud = tabletop_io::read_auto(input)?;
    let out = tabletop_filters::voxel_downsample(&cloud, size)?;
    tabletop_io::write_ply_ascii(output, &out)?;
    println!("downsampled: {} -> {}", cloud.len(), out.len());
    Ok(())
}

fn cmd_normals(input: &str, output: &str, r: f32, leaf: f32) -> Result<()> {
    let cloud = tabletop_io::read_auto(input)?;
    let t = t0();
    let out = tabletop_features::estimate_normals(&cloud, r, leaf, true)?;
    lap(t, "normals");
    tabletop_io::write_ply_ascii(output, &out)?;
    println!("normals estimated at r={} on {} points", r, out.len());
    Ok(())
}

/// Reference-frame cloud: as read, or moved from the camera frame after the
/// camera-depth clip.
fn read_source(input: &str, cfg: &DetectorConfig, pose: Option<&str>, depth_filter: bool) -> Result<Cloud> {
    let t = t0();
    let cloud = tabletop_io::read_auto(input)?;
    lap(t, "read");
    let Some(pose) = pose else {
        return Ok(cloud);
    };
    let pose = camera_pose(parse_pose(pose)?);
    let max_depth = depth_filter.then_some(cfg.max_depth);
    let moved = camera_to_reference(&cloud, &pose, max_depth);
    info!("camera frame: {} -> {} points (max depth {:?})", cloud.len(), moved.len(), max_depth);
    Ok(moved)
}

fn cmd_levels(input: &str, config: Option<&str>) -> Result<()> {
    let cfg = load_config(config)?;
    let cloud = tabletop_io::read_auto(input)?;
    let detector = TableDetector::new(cfg)?;

    let t = t0();
    let scan = detector.scan_levels(&cloud)?;
    lap(t, "levels");

    println!("plane points: {}", scan.plane_points.len());
    for l in &scan.levels {
        println!("z={:.4}  support={}", l.z, l.support);
    }
    Ok(())
}

fn cmd_detect(
    input: &str, config: Option<&str>, output: Option<&str>, json: Option<&str>,
    pose: Option<&str>, depth_filter: bool,
) -> Result<()> {
    let cfg = load_config(config)?;
    let cloud = read_source(input, &cfg, pose, depth_filter)?;
    let detector = TableDetector::new(cfg)?;

    let t = t0();
    let detection = detector.run_detection(&cloud)?;
    lap(t, "detect");

    let Some(det) = detection else {
        info!("no table detected");
        return Ok(());
    };

    let p = &det.pose;
    info!("table found: area={:.3} m2, {} hull points", det.area, det.hull.len());
    println!("position: x={:.4} y={:.4} z={:.4}", p.position[0], p.position[1], p.position[2]);
    println!("yaw: {:.4} rad ({:.2} deg)", p.yaw, p.yaw.to_degrees());

    if let Some(path) = output {
        tabletop_io::write_ply_ascii(path, &det.hull)?;
        println!("wrote hull -> {}", path);
    }
    if let Some(path) = json {
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &PoseRecord::from(p))?;
        println!("wrote pose -> {}", path);
    }
    Ok(())
}
