//! Mesh decimation
//!
//! [`quadric_decimate`] collapses edges in order of quadric error (Garland &
//! Heckbert). Candidates live in a binary heap and are invalidated lazily by
//! per-vertex stamps. [`cluster_vertices`] is the coarse grid fallback.

use crate::mesh::{add, cross, dot, scale, sub, Mesh, Vec3};
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

/// Symmetric 4x4 error quadric, upper triangle row-major
#[derive(Debug, Clone, Copy, Default)]
struct Quadric([f64; 10]);

impl Quadric {
    fn from_plane(a: f64, b: f64, c: f64, d: f64) -> Self {
        Quadric([a * a, a * b, a * c, a * d, b * b, b * c, b * d, c * c, c * d, d * d])
    }

    fn add(&self, other: &Quadric) -> Quadric {
        let mut sum = self.0;
        for (s, o) in sum.iter_mut().zip(other.0) {
            *s += o;
        }
        Quadric(sum)
    }

    fn error(&self, [x, y, z]: Vec3) -> f64 {
        let q = &self.0;
        q[0] * x * x + 2.0 * q[1] * x * y + 2.0 * q[2] * x * z + 2.0 * q[3] * x
            + q[4] * y * y + 2.0 * q[5] * y * z + 2.0 * q[6] * y
            + q[7] * z * z + 2.0 * q[8] * z
            + q[9]
    }

    /// Position minimizing the error, if the 3x3 system is well conditioned
    fn optimum(&self) -> Option<Vec3> {
        let q = &self.0;
        let m = [[q[0], q[1], q[2]], [q[1], q[4], q[5]], [q[2], q[5], q[7]]];
        let rhs = [-q[3], -q[6], -q[8]];

        let det = dot(m[0], cross(m[1], m[2]));
        let scale_ref = m.iter().flatten().fold(0.0f64, |acc, v| acc.max(v.abs()));
        if scale_ref == 0.0 || det.abs() <= 1e-10 * scale_ref.powi(3) {
            return None;
        }

        // Cramer's rule on columns
        let col = |i: usize| [m[0][i], m[1][i], m[2][i]];
        let replace = |i: usize| {
            let mut cols = [col(0), col(1), col(2)];
            cols[i] = rhs;
            dot(cols[0], cross(cols[1], cols[2]))
        };
        Some([replace(0) / det, replace(1) / det, replace(2) / det])
    }
}

#[derive(Debug)]
struct Collapse {
    cost: f64,
    keep: usize,
    remove: usize,
    stamps: (u32, u32),
    position: Vec3,
}

impl PartialEq for Collapse {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Collapse {}

impl PartialOrd for Collapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Collapse {
    // Reversed so the max-heap pops the cheapest collapse
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.total_cmp(&self.cost)
    }
}

struct Decimator {
    positions: Vec<Vec3>,
    faces: Vec<[usize; 3]>,
    face_alive: Vec<bool>,
    live_faces: usize,
    vertex_alive: Vec<bool>,
    stamps: Vec<u32>,
    quadrics: Vec<Quadric>,
    incident: Vec<Vec<usize>>,
}

impl Decimator {
    fn new(mesh: &Mesh) -> Self {
        let n = mesh.vertices.len();
        let mut quadrics = vec![Quadric::default(); n];
        let mut incident = vec![Vec::new(); n];
        let mut face_alive = vec![true; mesh.faces.len()];

        for (f, face) in mesh.faces.iter().enumerate() {
            let [a, b, c] = *face;
            if a == b || b == c || a == c {
                face_alive[f] = false;
                continue;
            }
            for &v in face {
                incident[v].push(f);
            }

            let p0 = mesh.vertices[a];
            let normal = cross(sub(mesh.vertices[b], p0), sub(mesh.vertices[c], p0));
            let length = dot(normal, normal).sqrt();
            if length <= f64::EPSILON {
                continue;
            }
            let [nx, ny, nz] = scale(normal, 1.0 / length);
            let plane = Quadric::from_plane(nx, ny, nz, -dot([nx, ny, nz], p0));
            for &v in face {
                quadrics[v] = quadrics[v].add(&plane);
            }
        }

        let live_faces = face_alive.iter().filter(|&&alive| alive).count();
        Self {
            positions: mesh.vertices.clone(),
            faces: mesh.faces.clone(),
            face_alive,
            live_faces,
            vertex_alive: vec![true; n],
            stamps: vec![0; n],
            quadrics,
            incident,
        }
    }

    fn candidate(&self, keep: usize, remove: usize) -> Collapse {
        let quadric = self.quadrics[keep].add(&self.quadrics[remove]);
        let (pa, pb) = (self.positions[keep], self.positions[remove]);
        let midpoint = scale(add(pa, pb), 0.5);

        let (position, cost) = quadric
            .optimum()
            .into_iter()
            .chain([pa, pb, midpoint])
            .map(|p| (p, quadric.error(p)))
            .min_by(|x, y| x.1.total_cmp(&y.1))
            .unwrap_or((midpoint, f64::INFINITY));

        Collapse {
            cost,
            keep,
            remove,
            stamps: (self.stamps[keep], self.stamps[remove]),
            position,
        }
    }

    fn is_current(&self, c: &Collapse) -> bool {
        self.vertex_alive[c.keep]
            && self.vertex_alive[c.remove]
            && self.stamps[c.keep] == c.stamps.0
            && self.stamps[c.remove] == c.stamps.1
    }

    /// A surviving face around the edge would turn over
    fn flips_face(&self, c: &Collapse) -> bool {
        for &v in &[c.keep, c.remove] {
            for &f in &self.incident[v] {
                if !self.face_alive[f] {
                    continue;
                }
                let face = self.faces[f];
                if face.contains(&c.keep) && face.contains(&c.remove) {
                    continue;
                }
                let before = face.map(|i| self.positions[i]);
                let after = face.map(|i| if i == c.keep || i == c.remove { c.position } else { self.positions[i] });
                if dot(triangle_normal(before), triangle_normal(after)) < 0.0 {
                    return true;
                }
            }
        }
        false
    }

    fn collapse(&mut self, c: &Collapse) -> BTreeSet<usize> {
        let (keep, remove) = (c.keep, c.remove);
        self.positions[keep] = c.position;
        self.quadrics[keep] = self.quadrics[keep].add(&self.quadrics[remove]);
        self.vertex_alive[remove] = false;
        self.stamps[keep] += 1;

        for f in std::mem::take(&mut self.incident[remove]) {
            if !self.face_alive[f] {
                continue;
            }
            for index in self.faces[f].iter_mut() {
                if *index == remove {
                    *index = keep;
                }
            }
            let [x, y, z] = self.faces[f];
            if x == y || y == z || x == z {
                self.face_alive[f] = false;
                self.live_faces -= 1;
            } else {
                self.incident[keep].push(f);
            }
        }

        let face_alive = &self.face_alive;
        self.incident[keep].retain(|&f| face_alive[f]);
        self.incident[keep].sort_unstable();
        self.incident[keep].dedup();

        self.incident[keep]
            .iter()
            .flat_map(|&f| self.faces[f])
            .filter(|&v| v != keep)
            .collect()
    }

    fn into_mesh(self) -> Mesh {
        let mut remap = vec![usize::MAX; self.positions.len()];
        let mut vertices = Vec::new();
        let mut faces = Vec::with_capacity(self.live_faces);

        for (face, _) in self.faces.iter().zip(&self.face_alive).filter(|(_, &alive)| alive) {
            faces.push(face.map(|i| {
                if remap[i] == usize::MAX {
                    remap[i] = vertices.len();
                    vertices.push(self.positions[i]);
                }
                remap[i]
            }));
        }
        Mesh { vertices, faces }
    }
}

/// Collapse edges until at most `target_faces` remain; `None` when the
/// surface runs out of valid collapses first
pub fn quadric_decimate(mesh: &Mesh, target_faces: usize) -> Option<Mesh> {
    let mut decimator = Decimator::new(mesh);

    let mut heap = BinaryHeap::new();
    for (a, b) in unique_edges(&decimator.faces, &decimator.face_alive) {
        heap.push(decimator.candidate(a, b));
    }

    while decimator.live_faces > target_faces {
        let Some(collapse) = heap.pop() else {
            return None;
        };
        if !decimator.is_current(&collapse) || decimator.flips_face(&collapse) {
            continue;
        }

        let neighbors = decimator.collapse(&collapse);
        for neighbor in neighbors {
            heap.push(decimator.candidate(collapse.keep, neighbor));
        }
    }

    Some(decimator.into_mesh())
}

/// Snap vertices to a grid, coarsening until at most `target_faces` remain
pub fn cluster_vertices(mesh: &Mesh, target_faces: usize) -> Mesh {
    let Some([lo, hi]) = mesh.bounds() else {
        return mesh.clone();
    };
    let extent = sub(hi, lo);

    let mut resolution = 64usize;
    loop {
        let clustered = cluster_at(mesh, lo, extent, resolution);
        if clustered.faces.len() <= target_faces || resolution == 1 {
            return clustered;
        }
        resolution /= 2;
    }
}

fn cluster_at(mesh: &Mesh, lo: Vec3, extent: Vec3, resolution: usize) -> Mesh {
    let cell_of = |v: Vec3| -> [usize; 3] {
        let mut cell = [0usize; 3];
        for axis in 0..3 {
            if extent[axis] > 0.0 {
                let t = (v[axis] - lo[axis]) / extent[axis];
                cell[axis] = ((t * resolution as f64) as usize).min(resolution - 1);
            }
        }
        cell
    };

    let mut cells: HashMap<[usize; 3], usize> = HashMap::new();
    let mut sums: Vec<(Vec3, usize)> = Vec::new();
    let remap: Vec<usize> = mesh
        .vertices
        .iter()
        .map(|&v| {
            let id = *cells.entry(cell_of(v)).or_insert_with(|| {
                sums.push(([0.0; 3], 0));
                sums.len() - 1
            });
            sums[id].0 = add(sums[id].0, v);
            sums[id].1 += 1;
            id
        })
        .collect();

    let vertices = sums.iter().map(|&(sum, count)| scale(sum, 1.0 / count as f64)).collect();

    let mut seen = HashSet::new();
    let faces = mesh
        .faces
        .iter()
        .map(|face| face.map(|i| remap[i]))
        .filter(|&[a, b, c]| a != b && b != c && a != c)
        .filter(|face| {
            let mut key = *face;
            key.sort_unstable();
            seen.insert(key)
        })
        .collect();

    Mesh { vertices, faces }
}

fn unique_edges(faces: &[[usize; 3]], alive: &[bool]) -> BTreeSet<(usize, usize)> {
    faces
        .iter()
        .zip(alive)
        .filter(|(_, &alive)| alive)
        .flat_map(|(face, _)| (0..3).map(move |i| (face[i], face[(i + 1) % 3])))
        .map(|(a, b)| (a.min(b), a.max(b)))
        .collect()
}

fn triangle_normal([a, b, c]: [Vec3; 3]) -> Vec3 {
    cross(sub(b, a), sub(c, a))
}
