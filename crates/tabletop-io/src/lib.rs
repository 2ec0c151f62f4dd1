//! tabletop-io — PLY reader/writer and LAS reader for source clouds.

use anyhow::{bail, Context, Result};
use las::Read as _;
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Ply, Property};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tabletop_core::Cloud;

pub fn read_las(path: impl AsRef<Path>) -> Result<Cloud> {
    let path = path.as_ref();
    let mut r = las::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;
    let n = r.header().number_of_points() as usize;

    let mut c = Cloud::default();
    c.reserve(n);
    let mut intensity = Vec::with_capacity(n);

    for rec in r.points() {
        let p = rec?; // las::Point
        // x/y/z are f64 with scale/offset already applied by Reader
        c.push(p.x as f32, p.y as f32, p.z as f32);
        intensity.push(p.intensity as f32);
    }
    c.attrs_f32.insert("intensity".into(), intensity);
    Ok(c)
}

/// PLY (ASCII or binary) with float-like x/y/z. Other float-like vertex
/// properties present in the file become attribute columns.
pub fn read_ply(path: impl AsRef<Path>) -> Result<Cloud> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(f);
    let parser = Parser::<DefaultElement>::new();
    let ply: Ply<DefaultElement> = parser
        .read_ply(&mut reader)
        .with_context(|| format!("parse {}", path.display()))?;

    let vertex = ply.payload.get("vertex")
        .ok_or_else(|| anyhow::anyhow!("PLY missing 'vertex' element"))?;

    let mut c = Cloud::default();
    c.reserve(vertex.len());

    // extra columns are decided by the first vertex
    let extra: Vec<String> = vertex
        .first()
        .map(|el| {
            el.iter()
                .filter(|(k, v)| !matches!(k.as_str(), "x" | "y" | "z") && as_f32(v).is_some())
                .map(|(k, _)| k.clone())
                .collect()
        })
        .unwrap_or_default();
    for k in &extra {
        c.attrs_f32.insert(k.clone(), Vec::with_capacity(vertex.len()));
    }

    for el in vertex {
        c.push(get_f32(el, "x")?, get_f32(el, "y")?, get_f32(el, "z")?);
        for k in &extra {
            let val = el.get(k).and_then(as_f32).unwrap_or(0.0);
            if let Some(col) = c.attrs_f32.get_mut(k) { col.push(val); }
        }
    }
    Ok(c)
}

fn as_f32(p: &Property) -> Option<f32> {
    match p {
        Property::Float(v) => Some(*v),
        Property::Double(v) => Some(*v as f32),
        Property::UChar(v) => Some(*v as f32),
        Property::Char(v) => Some(*v as f32),
        Property::UShort(v) => Some(*v as f32),
        Property::Short(v) => Some(*v as f32),
        Property::UInt(v) => Some(*v as f32),
        Property::Int(v) => Some(*v as f32),
        _ => None,
    }
}

fn get_f32(el: &DefaultElement, key: &str) -> Result<f32> {
    match el.get(key) {
        Some(p) => match as_f32(p) {
            Some(v) => Ok(v),
            None => bail!("property '{}' not float-like", key),
        },
        None => bail!("missing property '{}'", key),
    }
}

pub fn write_ply_ascii(path: impl AsRef<Path>, cloud: &Cloud) -> Result<()> {
    let path = path.as_ref();
    let n = cloud.len();
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);

    // Collect float attributes that match length
    let mut keys: Vec<&str> = cloud
        .attrs_f32
        .iter()
        .filter_map(|(k, v)| if v.len() == n { Some(k.as_str()) } else { None })
        .collect();
    // stable, nice order: x y z then nx ny nz then the rest alpha-sorted
    keys.sort();
    let mut ordered: Vec<&str> = Vec::new();
    for k in ["nx","ny","nz"] {
        if keys.binary_search(&k).is_ok() { ordered.push(k); }
    }
    for k in keys {
        if !ordered.iter().any(|&ok| ok == k) {
            ordered.push(k);
        }
    }

    // Header
    writeln!(w, "ply")?;
    writeln!(w, "format ascii 1.0")?;
    writeln!(w, "element vertex {}", n)?;
    writeln!(w, "property float x")?;
    writeln!(w, "property float y")?;
    writeln!(w, "property float z")?;
    for k in &ordered {
        writeln!(w, "property float {}", k)?;
    }
    writeln!(w, "end_header")?;

    // Body
    for i in 0..n {
        write!(w, "{} {} {}", cloud.x[i], cloud.y[i], cloud.z[i])?;
        for k in &ordered {
            let col = &cloud.attrs_f32[*k];
            write!(w, " {}", col[i])?;
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

/// Pick the reader by extension (.ply, .las/.laz); unknown extensions are
/// tried as PLY.
pub fn read_auto(path: impl AsRef<Path>) -> Result<Cloud> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "ply" => read_ply(path),
        "las" | "laz" => read_las(path),
        _ => read_ply(path).map_err(|e| {
            anyhow::anyhow!("Unsupported file (expected .ply or .las). Root error: {e}")
        }),
    }
}
