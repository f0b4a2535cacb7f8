//! Triangle mesh preprocessing and augmentation
//!
//! Results are JSON objects carrying the full vertex and face arrays:
//!
//! ```json
//! {"vertices": [[0.0, 0.0, 0.0], ...], "faces": [[0, 1, 2], ...]}
//! ```

use crate::decimate::{cluster_vertices, quadric_decimate};
use crate::error::{MediaError, Result};
use crate::mesh_io::load_mesh;
use crate::modality::Modality;
use crate::pipeline::{rng_from_seed, Pipeline};
use crate::technique::{techniques, TechniqueReport};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

techniques! {
    pub enum MeshPreprocess for Modality::Mesh {
        Normalize => "normalize",
        Center => "center",
        Simplify => "simplify",
    }
}

techniques! {
    pub enum MeshAugment for Modality::Mesh {
        Rotate => "rotate",
        Scale => "scale",
        Noise => "noise",
    }
}

pub type Vec3 = [f64; 3];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<[usize; 3]>,
}

impl Mesh {
    /// Build a mesh, rejecting faces that reference missing vertices
    pub fn new(vertices: Vec<Vec3>, faces: Vec<[usize; 3]>) -> std::result::Result<Self, String> {
        if let Some(face) = faces.iter().find(|f| f.iter().any(|&i| i >= vertices.len())) {
            return Err(format!(
                "face {:?} references a vertex outside 0..{}",
                face,
                vertices.len()
            ));
        }
        Ok(Self { vertices, faces })
    }

    pub fn from_json(payload: &str) -> std::result::Result<Self, String> {
        let mesh: Mesh = serde_json::from_str(payload).map_err(|e| e.to_string())?;
        Self::new(mesh.vertices, mesh.faces)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Axis-aligned `[min, max]` corners
    pub fn bounds(&self) -> Option<[Vec3; 2]> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold([first, first], |[mut lo, mut hi], v| {
            for axis in 0..3 {
                lo[axis] = lo[axis].min(v[axis]);
                hi[axis] = hi[axis].max(v[axis]);
            }
            [lo, hi]
        }))
    }

    pub fn extents(&self) -> Vec3 {
        self.bounds()
            .map(|[lo, hi]| [hi[0] - lo[0], hi[1] - lo[1], hi[2] - lo[2]])
            .unwrap_or([0.0; 3])
    }

    pub fn vertex_mean(&self) -> Vec3 {
        if self.vertices.is_empty() {
            return [0.0; 3];
        }
        let sum = self.vertices.iter().fold([0.0; 3], |acc, v| add(acc, *v));
        scale(sum, 1.0 / self.vertices.len() as f64)
    }

    /// Area-weighted mean of triangle centroids; vertex mean when the surface
    /// has no area
    pub fn centroid(&self) -> Vec3 {
        let mut total_area = 0.0;
        let mut weighted = [0.0; 3];
        for face in &self.faces {
            let [a, b, c] = self.corners(face);
            let area = 0.5 * norm(cross(sub(b, a), sub(c, a)));
            let center = scale(add(add(a, b), c), 1.0 / 3.0);
            weighted = add(weighted, scale(center, area));
            total_area += area;
        }
        if total_area <= f64::EPSILON {
            return self.vertex_mean();
        }
        scale(weighted, 1.0 / total_area)
    }

    /// Every edge is shared by exactly two faces
    pub fn is_watertight(&self) -> bool {
        if self.faces.is_empty() {
            return false;
        }
        let mut edges: HashMap<(usize, usize), usize> = HashMap::new();
        for face in &self.faces {
            for i in 0..3 {
                let (a, b) = (face[i], face[(i + 1) % 3]);
                *edges.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }
        edges.values().all(|&count| count == 2)
    }

    /// Signed volume from origin tetrahedra (positive for outward winding)
    pub fn volume(&self) -> f64 {
        self.faces
            .iter()
            .map(|face| {
                let [a, b, c] = self.corners(face);
                dot(a, cross(b, c)) / 6.0
            })
            .sum()
    }

    /// Volume centroid for closed meshes, surface centroid otherwise
    pub fn center_mass(&self) -> Vec3 {
        let volume = self.volume();
        if !self.is_watertight() || volume.abs() <= f64::EPSILON {
            return self.centroid();
        }
        let weighted = self.faces.iter().fold([0.0; 3], |acc, face| {
            let [a, b, c] = self.corners(face);
            let tet_volume = dot(a, cross(b, c)) / 6.0;
            add(acc, scale(add(add(a, b), c), tet_volume / 4.0))
        });
        scale(weighted, 1.0 / volume)
    }

    /// Apply a per-vertex transform, keeping the faces
    pub fn map_vertices(&self, f: impl FnMut(Vec3) -> Vec3) -> Mesh {
        Mesh {
            vertices: self.vertices.iter().copied().map(f).collect(),
            faces: self.faces.clone(),
        }
    }

    fn corners(&self, face: &[usize; 3]) -> [Vec3; 3] {
        [self.vertices[face[0]], self.vertices[face[1]], self.vertices[face[2]]]
    }
}

#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub rotation_degrees: f64,
    pub rotation_axis: Vec3,
    pub scale_min: f64,
    pub scale_max: f64,
    pub noise_std: f64,
    /// Fraction of faces kept by `simplify`
    pub simplify_ratio: f64,
    pub seed: Option<u64>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: 45.0,
            rotation_axis: [0.0, 1.0, 0.0],
            scale_min: 0.8,
            scale_max: 1.2,
            noise_std: 0.02,
            simplify_ratio: 0.5,
            seed: None,
        }
    }
}

pub struct MeshPipeline {
    config: MeshConfig,
}

impl MeshPipeline {
    pub fn new(config: MeshConfig) -> Self {
        Self { config }
    }

    pub fn load(&self, path: &Path) -> Result<Mesh> {
        load_mesh(path)
    }

    /// Uniform scale so the largest extent becomes 1
    pub fn normalize(&self, mesh: &Mesh) -> Result<Mesh> {
        let max_extent = mesh.extents().into_iter().fold(0.0, f64::max);
        if max_extent <= f64::EPSILON {
            return Err(MediaError::technique(MeshPreprocess::Normalize, "mesh has zero extent"));
        }
        let factor = 1.0 / max_extent;
        Ok(mesh.map_vertices(|v| scale(v, factor)))
    }

    pub fn center(&self, mesh: &Mesh) -> Mesh {
        let centroid = mesh.centroid();
        mesh.map_vertices(|v| sub(v, centroid))
    }

    /// Quadric decimation to the target face count, vertex clustering when
    /// decimation cannot get there
    pub fn simplify(&self, mesh: &Mesh) -> Mesh {
        let target = (mesh.faces.len() as f64 * self.config.simplify_ratio).floor() as usize;
        match quadric_decimate(mesh, target) {
            Some(simplified) => simplified,
            None => {
                warn!(faces = mesh.faces.len(), target, "quadric decimation fell short, using vertex clustering");
                cluster_vertices(mesh, target)
            }
        }
    }

    /// Rotate about the configured axis through the origin
    pub fn rotate(&self, mesh: &Mesh) -> Result<Mesh> {
        let axis = self.config.rotation_axis;
        let length = norm(axis);
        if length <= f64::EPSILON {
            return Err(MediaError::technique(MeshAugment::Rotate, "rotation axis has zero length"));
        }
        let k = scale(axis, 1.0 / length);
        let (sin, cos) = self.config.rotation_degrees.to_radians().sin_cos();

        // Rodrigues' rotation formula
        Ok(mesh.map_vertices(|v| {
            add(
                add(scale(v, cos), scale(cross(k, v), sin)),
                scale(k, dot(k, v) * (1.0 - cos)),
            )
        }))
    }

    pub fn random_scale(&self, mesh: &Mesh, rng: &mut impl Rng) -> Result<Mesh> {
        let (lo, hi) = (self.config.scale_min, self.config.scale_max);
        if lo.is_nan() || hi.is_nan() || lo >= hi {
            return Err(MediaError::technique(MeshAugment::Scale, format!("empty scale range {}..{}", lo, hi)));
        }
        let factors: Vec3 = [rng.gen_range(lo..hi), rng.gen_range(lo..hi), rng.gen_range(lo..hi)];
        Ok(mesh.map_vertices(|v| [v[0] * factors[0], v[1] * factors[1], v[2] * factors[2]]))
    }

    pub fn jitter(&self, mesh: &Mesh, rng: &mut impl Rng) -> Result<Mesh> {
        let normal = Normal::new(0.0, self.config.noise_std)
            .map_err(|e| MediaError::technique(MeshAugment::Noise, e))?;
        Ok(mesh.map_vertices(|v| [
            v[0] + normal.sample(rng),
            v[1] + normal.sample(rng),
            v[2] + normal.sample(rng),
        ]))
    }
}

impl Pipeline for MeshPipeline {
    type Process = MeshPreprocess;
    type Augment = MeshAugment;

    const MODALITY: Modality = Modality::Mesh;

    fn preview(&self, path: &Path) -> Result<String> {
        let mesh = self.load(path)?;
        let watertight = mesh.is_watertight();

        let preview = json!({
            "vertices": mesh.vertices.len(),
            "faces": mesh.faces.len(),
            "bounds": mesh.bounds(),
            "vertex_data": mesh.vertices,
            "face_data": mesh.faces,
            "is_watertight": watertight,
            "volume": if watertight { Some(mesh.volume()) } else { None },
            "center_mass": mesh.center_mass(),
        });
        Ok(preview.to_string())
    }

    fn process(&self, path: &Path, techniques: &[MeshPreprocess]) -> Result<TechniqueReport> {
        let mesh = self.load(path)?;

        Ok(TechniqueReport::collect(techniques, |technique| {
            let processed = match technique {
                MeshPreprocess::Normalize => self.normalize(&mesh)?,
                MeshPreprocess::Center => self.center(&mesh),
                MeshPreprocess::Simplify => self.simplify(&mesh),
            };
            encode_mesh(&processed, technique)
        }))
    }

    fn augment(&self, path: &Path, techniques: &[MeshAugment]) -> Result<TechniqueReport> {
        let mesh = self.load(path)?;
        let mut rng = rng_from_seed(self.config.seed);

        Ok(TechniqueReport::collect(techniques, |technique| {
            let processed = match technique {
                MeshAugment::Rotate => self.rotate(&mesh)?,
                MeshAugment::Scale => self.random_scale(&mesh, &mut rng)?,
                MeshAugment::Noise => self.jitter(&mesh, &mut rng)?,
            };
            encode_mesh(&processed, technique)
        }))
    }
}

fn encode_mesh(mesh: &Mesh, technique: impl ToString) -> Result<String> {
    mesh.to_json().map_err(|e| MediaError::technique(technique, e))
}

pub(crate) fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub(crate) fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn scale(a: Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

pub(crate) fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    const EPS: f64 = 1e-9;

    pub(crate) fn unit_cube() -> Mesh {
        let vertices = vec![
            [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0],
        ];
        let faces = vec![
            [0, 2, 1], [0, 3, 2], [4, 5, 6], [4, 6, 7],
            [0, 1, 5], [0, 5, 4], [3, 7, 6], [3, 6, 2],
            [0, 4, 7], [0, 7, 3], [1, 2, 6], [1, 6, 5],
        ];
        Mesh::new(vertices, faces).unwrap()
    }

    fn off_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".off").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn pipeline() -> MeshPipeline {
        MeshPipeline::new(MeshConfig { seed: Some(5), ..Default::default() })
    }

    fn close(a: Vec3, b: Vec3) -> bool {
        (0..3).all(|i| (a[i] - b[i]).abs() < 1e-6)
    }

    #[test]
    fn test_cube_properties() {
        let cube = unit_cube();
        assert!(cube.is_watertight());
        assert!((cube.volume() - 1.0).abs() < EPS);
        assert!(close(cube.center_mass(), [0.5, 0.5, 0.5]));
        assert_eq!(cube.bounds(), Some([[0.0; 3], [1.0; 3]]));
    }

    #[test]
    fn test_new_rejects_dangling_faces() {
        assert!(Mesh::new(vec![[0.0; 3]; 2], vec![[0, 1, 2]]).is_err());
        assert!(Mesh::from_json(r#"{"vertices": [[0,0,0]], "faces": [[0,0,1]]}"#).is_err());
    }

    #[test]
    fn test_normalize_max_extent_is_one() {
        let stretched = unit_cube().map_vertices(|v| [v[0] * 4.0 - 7.0, v[1] * 2.0, v[2] * 0.5]);
        let normalized = pipeline().normalize(&stretched).unwrap();
        let max_extent = normalized.extents().into_iter().fold(0.0, f64::max);
        assert!((max_extent - 1.0).abs() < EPS);

        let flat = Mesh::new(vec![[1.0; 3]; 3], vec![[0, 1, 2]]).unwrap();
        assert!(pipeline().normalize(&flat).is_err());
    }

    #[test]
    fn test_center_moves_centroid_to_origin() {
        let shifted = unit_cube().map_vertices(|v| add(v, [10.0, -3.0, 2.5]));
        let centered = pipeline().center(&shifted);
        assert!(close(centered.centroid(), [0.0; 3]));
    }

    #[test]
    fn test_off_triangle_center_has_zero_vertex_mean() {
        let file = off_file("OFF\n3 1 0\n1 2 3\n4 5 6\n7 8 10\n3 0 1 2\n");
        let report = pipeline().process(file.path(), &[MeshPreprocess::Center]).unwrap();
        let centered = Mesh::from_json(report.output("center").unwrap()).unwrap();

        assert_eq!(centered.faces, vec![[0, 1, 2]]);
        assert!(close(centered.vertex_mean(), [0.0; 3]));
    }

    #[test]
    fn test_result_json_round_trips_with_valid_faces() {
        let file = off_file(&crate::mesh_io::write_off(&unit_cube()));
        let report = pipeline()
            .process(file.path(), &[MeshPreprocess::Normalize, MeshPreprocess::Simplify])
            .unwrap();

        for technique in ["normalize", "simplify"] {
            let value: serde_json::Value = serde_json::from_str(report.output(technique).unwrap()).unwrap();
            let mesh = Mesh::from_json(&value.to_string()).unwrap();
            assert!(mesh.faces.iter().flatten().all(|&i| i < mesh.vertices.len()));
            assert!(value["vertices"].as_array().unwrap().iter().all(|v| v.as_array().unwrap().len() == 3));
        }
        let simplified = Mesh::from_json(report.output("simplify").unwrap()).unwrap();
        assert!(simplified.faces.len() <= 6);
    }

    #[test]
    fn test_rotate_quarter_about_y() {
        let mesh = Mesh::new(vec![[1.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 1.0]], vec![[0, 1, 2]]).unwrap();
        let rotated = pipeline().rotate(&mesh).unwrap();
        let c = std::f64::consts::FRAC_1_SQRT_2;
        assert!(close(rotated.vertices[0], [c, 0.0, -c]));
        assert!(close(rotated.vertices[1], [0.0, 2.0, 0.0]));
        assert!(close(rotated.vertices[2], [c, 0.0, c]));
    }

    #[test]
    fn test_scale_and_noise_stay_in_range() {
        let cube = unit_cube();
        let mut rng = rng_from_seed(Some(11));

        let scaled = pipeline().random_scale(&cube, &mut rng).unwrap();
        for extent in scaled.extents() {
            assert!((0.8..1.2).contains(&extent), "extent {}", extent);
        }

        let noisy = pipeline().jitter(&cube, &mut rng).unwrap();
        assert_eq!(noisy.faces, cube.faces);
        assert_ne!(noisy.vertices, cube.vertices);
        let max_shift = noisy
            .vertices
            .iter()
            .zip(&cube.vertices)
            .map(|(a, b)| norm(sub(*a, *b)))
            .fold(0.0, f64::max);
        assert!(max_shift < 0.5);
    }

    #[test]
    fn test_preview_reports_extended_fields() {
        let file = off_file(&crate::mesh_io::write_off(&unit_cube()));
        let preview: serde_json::Value = serde_json::from_str(&pipeline().preview(file.path()).unwrap()).unwrap();

        assert_eq!(preview["vertices"], 8);
        assert_eq!(preview["faces"], 12);
        assert_eq!(preview["bounds"], json!([[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]));
        assert_eq!(preview["vertex_data"].as_array().unwrap().len(), 8);
        assert_eq!(preview["face_data"].as_array().unwrap().len(), 12);
        assert_eq!(preview["is_watertight"], true);
        assert!((preview["volume"].as_f64().unwrap() - 1.0).abs() < EPS);
    }
}
