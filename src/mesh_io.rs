//! Mesh readers (OFF, OBJ, STL, PLY) and the OFF writer
//!
//! Polygons with more than three corners are fan-triangulated.

use crate::error::{MediaError, Result};
use crate::mesh::Mesh;
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Property};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

type ReadResult<T> = std::result::Result<T, String>;

/// Load a mesh, picking the reader from the file extension
pub fn load_mesh(path: &Path) -> Result<Mesh> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let mesh = match extension.as_str() {
        "off" => File::open(path)
            .map_err(|e| e.to_string())
            .and_then(|file| parse_off(BufReader::new(file))),
        "obj" => read_obj(path),
        "stl" => read_stl(path),
        "ply" => read_ply(path),
        other => Err(format!("no mesh reader for extension {:?}", other)),
    };
    mesh.map_err(|reason| MediaError::load(path, reason))
}

pub fn parse_off(reader: impl BufRead) -> ReadResult<Mesh> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| e.to_string())?;
        let content = line.split('#').next().unwrap_or_default().trim();
        if !content.is_empty() {
            lines.push(content.to_string());
        }
    }
    let mut lines = lines.into_iter();

    let header = lines.next().ok_or_else(|| "empty OFF file".to_string())?;
    let keyword = header.split_whitespace().next().unwrap_or_default();
    if !keyword.ends_with("OFF") {
        return Err(format!("expected OFF header, found {:?}", keyword));
    }

    // Counts may share the header line ("OFF 8 12 0")
    let inline: Vec<&str> = header.split_whitespace().skip(1).collect();
    let counts_line;
    let counts: Vec<&str> = if inline.is_empty() {
        counts_line = lines.next().ok_or_else(|| "missing element counts".to_string())?;
        counts_line.split_whitespace().collect()
    } else {
        inline
    };
    if counts.len() < 2 {
        return Err(format!("malformed element counts {:?}", counts));
    }
    let vertex_count: usize = parse_token(counts[0])?;
    let face_count: usize = parse_token(counts[1])?;

    // Every element needs its own line; reject counts the file cannot hold before reserving
    let remaining = lines.len();
    let needed = vertex_count
        .checked_add(face_count)
        .ok_or_else(|| format!("element counts {} + {} overflow", vertex_count, face_count))?;
    if needed > remaining {
        return Err(format!(
            "header declares {} vertices and {} faces but only {} lines follow",
            vertex_count, face_count, remaining
        ));
    }

    let mut vertices = Vec::with_capacity(vertex_count);
    for i in 0..vertex_count {
        let line = lines.next().ok_or_else(|| format!("expected {} vertices, found {}", vertex_count, i))?;
        let coords: Vec<f64> = line
            .split_whitespace()
            .take(3)
            .map(parse_token)
            .collect::<ReadResult<_>>()?;
        if coords.len() < 3 {
            return Err(format!("vertex {} has fewer than 3 coordinates", i));
        }
        vertices.push([coords[0], coords[1], coords[2]]);
    }

    let mut faces = Vec::with_capacity(face_count);
    for i in 0..face_count {
        let line = lines.next().ok_or_else(|| format!("expected {} faces, found {}", face_count, i))?;
        let mut tokens = line.split_whitespace();
        let corners: usize = parse_token(tokens.next().unwrap_or_default())?;
        let polygon: Vec<usize> = tokens.take(corners).map(parse_token).collect::<ReadResult<_>>()?;
        if polygon.len() != corners || corners < 3 {
            return Err(format!("face {} is not a polygon", i));
        }
        fan_triangulate(&polygon, &mut faces);
    }

    Mesh::new(vertices, faces)
}

pub fn write_off(mesh: &Mesh) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "OFF");
    let _ = writeln!(out, "{} {} 0", mesh.vertices.len(), mesh.faces.len());
    for [x, y, z] in &mesh.vertices {
        let _ = writeln!(out, "{} {} {}", x, y, z);
    }
    for [a, b, c] in &mesh.faces {
        let _ = writeln!(out, "3 {} {} {}", a, b, c);
    }
    out
}

fn read_obj(path: &Path) -> ReadResult<Mesh> {
    let options = tobj::LoadOptions {
        triangulate: true,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    };
    let (models, _materials) = tobj::load_obj(path, &options).map_err(|e| e.to_string())?;

    let mut vertices = Vec::new();
    let mut faces = Vec::new();
    for model in models {
        let offset = vertices.len();
        vertices.extend(
            model
                .mesh
                .positions
                .chunks_exact(3)
                .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64]),
        );
        faces.extend(model.mesh.indices.chunks_exact(3).map(|f| {
            [offset + f[0] as usize, offset + f[1] as usize, offset + f[2] as usize]
        }));
    }
    Mesh::new(vertices, faces)
}

fn read_stl(path: &Path) -> ReadResult<Mesh> {
    let mut file = File::open(path).map_err(|e| e.to_string())?;
    let stl = stl_io::read_stl(&mut file).map_err(|e| e.to_string())?;

    let vertices = stl
        .vertices
        .iter()
        .map(|v| [v[0] as f64, v[1] as f64, v[2] as f64])
        .collect();
    let faces = stl.faces.iter().map(|f| f.vertices).collect();
    Mesh::new(vertices, faces)
}

fn read_ply(path: &Path) -> ReadResult<Mesh> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let ply = Parser::<DefaultElement>::new()
        .read_ply(&mut BufReader::new(file))
        .map_err(|e| e.to_string())?;

    let vertex_elements = ply
        .payload
        .get("vertex")
        .ok_or_else(|| "PLY file has no vertex element".to_string())?;
    let mut vertices = Vec::with_capacity(vertex_elements.len());
    for element in vertex_elements {
        let coord = |name: &str| {
            element
                .get(name)
                .and_then(scalar)
                .ok_or_else(|| format!("vertex is missing {}", name))
        };
        vertices.push([coord("x")?, coord("y")?, coord("z")?]);
    }

    let mut faces = Vec::new();
    for element in ply.payload.get("face").map(Vec::as_slice).unwrap_or_default() {
        let polygon = element
            .get("vertex_indices")
            .or_else(|| element.get("vertex_index"))
            .and_then(index_list)
            .ok_or_else(|| "face has no vertex index list".to_string())?;
        if polygon.len() < 3 {
            return Err(format!("face has {} corners", polygon.len()));
        }
        fan_triangulate(&polygon, &mut faces);
    }

    Mesh::new(vertices, faces)
}

fn fan_triangulate(polygon: &[usize], faces: &mut Vec<[usize; 3]>) {
    for i in 1..polygon.len() - 1 {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

fn parse_token<T: std::str::FromStr>(token: &str) -> ReadResult<T> {
    token.parse().map_err(|_| format!("invalid number {:?}", token))
}

fn scalar(property: &Property) -> Option<f64> {
    match property {
        Property::Char(v) => Some(*v as f64),
        Property::UChar(v) => Some(*v as f64),
        Property::Short(v) => Some(*v as f64),
        Property::UShort(v) => Some(*v as f64),
        Property::Int(v) => Some(*v as f64),
        Property::UInt(v) => Some(*v as f64),
        Property::Float(v) => Some(*v as f64),
        Property::Double(v) => Some(*v),
        _ => None,
    }
}

fn index_list(property: &Property) -> Option<Vec<usize>> {
    fn convert<T: Copy + TryInto<usize>>(values: &[T]) -> Option<Vec<usize>> {
        values.iter().map(|&v| v.try_into().ok()).collect()
    }
    match property {
        Property::ListChar(v) => convert(v),
        Property::ListUChar(v) => convert(v),
        Property::ListShort(v) => convert(v),
        Property::ListUShort(v) => convert(v),
        Property::ListInt(v) => convert(v),
        Property::ListUInt(v) => convert(v),
        _ => None,
    }
}
