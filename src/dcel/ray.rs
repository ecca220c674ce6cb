//! Ray casting and spatial indices over the mesh.

use cgmath::prelude::*;

use crate::{
    handle::{FaceHandle, VertexHandle},
    kdtree::{PointKdTree, Triangle, TriangleKdTree},
    math::{self, Point, Ray, Scalar},
};
use super::Dcel;


/// Result of casting a ray onto the mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// The first face hit.
    pub face: FaceHandle,

    /// The vertex of `face` closest to the hit point.
    pub nearest_vertex: VertexHandle,

    /// Ray parameter of the hit point.
    pub t: Scalar,
}

/// A triangle k-d tree over all faces of a mesh at the time it was built.
#[derive(Debug, Clone)]
pub struct FaceIndex {
    tree: TriangleKdTree,
    faces: Vec<FaceHandle>,
}

impl FaceIndex {
    pub fn tree(&self) -> &TriangleKdTree {
        &self.tree
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// The face handle of the triangle with the given index in the tree.
    pub fn face(&self, index: usize) -> FaceHandle {
        self.faces[index]
    }
}

/// A point k-d tree over all vertices of a mesh at the time it was built.
#[derive(Debug, Clone)]
pub struct VertexIndex {
    tree: PointKdTree,
    vertices: Vec<VertexHandle>,
}

impl VertexIndex {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// The vertex closest to `p`.
    pub fn nearest(&self, p: Point) -> Option<VertexHandle> {
        self.tree.nearest(p).map(|n| self.vertices[n.index])
    }

    /// All vertices with distance at most `radius` from `p`.
    pub fn within_radius(&self, p: Point, radius: Scalar) -> Vec<VertexHandle> {
        self.tree.within_radius(p, radius).into_iter().map(|i| self.vertices[i]).collect()
    }
}

impl Dcel {
    /// Returns the first face hit by the ray, or `None` if it misses the
    /// mesh. Checks all faces; see [`Dcel::cast_ray_indexed`] for the faster
    /// variant.
    pub fn cast_ray(&self, ray: &Ray) -> Option<RayHit> {
        let mut best: Option<(FaceHandle, Scalar)> = None;
        for f in self.faces() {
            let [a, b, c] = self.face_positions(f);
            if let Some(t) = math::ray_triangle(ray, a, b, c) {
                if best.map_or(true, |(_, best_t)| t < best_t) {
                    best = Some((f, t));
                }
            }
        }

        best.map(|(face, t)| self.ray_hit(ray, face, t))
    }

    /// Like [`Dcel::cast_ray`], but uses the given index.
    ///
    /// The index has to be rebuilt after the mesh changed: faces created
    /// later are invisible to it. If the face hit in the index does not exist
    /// anymore or was moved, this falls back to the linear scan.
    pub fn cast_ray_indexed(&self, ray: &Ray, index: &FaceIndex) -> Option<RayHit> {
        let hit = index.tree.cast_ray(ray)?;
        let face = index.faces[hit.index];
        let Triangle(indexed) = index.tree.primitives()[hit.index];
        if !self.contains_face(face) || indexed != self.face_positions(face) {
            return self.cast_ray(ray);
        }

        Some(self.ray_hit(ray, face, hit.t))
    }

    /// Builds a triangle k-d tree over all current faces.
    pub fn face_index(&self) -> FaceIndex {
        let faces: Vec<_> = self.faces().collect();
        let mut tree = TriangleKdTree::new();
        tree.build(faces.iter().map(|&f| Triangle(self.face_positions(f))).collect());
        FaceIndex { tree, faces }
    }

    /// Builds a point k-d tree over all current vertices.
    pub fn vertex_index(&self) -> VertexIndex {
        let vertices: Vec<_> = self.vertices().collect();
        let mut tree = PointKdTree::new();
        tree.build(vertices.iter().map(|&v| self.position(v)).collect());
        VertexIndex { tree, vertices }
    }

    fn ray_hit(&self, ray: &Ray, face: FaceHandle, t: Scalar) -> RayHit {
        let p = ray.at(t);
        let vs = self.vertices_of_face(face);
        let mut nearest_vertex = vs[0];
        for &v in &vs[1..] {
            if self.position(v).distance2(p) < self.position(nearest_vertex).distance2(p) {
                nearest_vertex = v;
            }
        }

        RayHit { face, nearest_vertex, t }
    }
}
