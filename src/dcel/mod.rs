//! The half-edge mesh (DCEL) and everything directly operating on it.

// # Some notes for developers about this implementation
//
// - Every full edge has exactly two half edges, also along the boundary of
//   the mesh. Half edges on a hole have no face and are linked via
//   `next`/`prev` into a closed loop around that hole.
// - For boundary vertices, `outgoing` always stores the (single) outgoing
//   boundary half edge. Circulating around a vertex thus always starts at the
//   hole, which gives us contiguous face lists.
// - Unlike in many half edge implementations, twins are stored explicitly and
//   not implied by their index. That's because edge collapses re-pair half
//   edges of different edges and we never want to move elements around (all
//   handles stay stable).
// - Circulation around vertices is clockwise: `next(twin(he))`.

use std::fmt;

use cgmath::prelude::*;
use fxhash::FxHashMap;
use optional::Optioned as Opt;

use crate::{
    handle::{hsize, EdgeHandle, FaceHandle, HalfEdgeHandle, VertexHandle},
    map::{DenseMap, Empty, Handles},
    math::{self, Aabb, Point, Scalar, Vector},
};


pub mod adj;
mod build;
mod collapse;
mod ray;

pub use self::{
    build::IndexedMesh,
    collapse::VertexSplit,
    ray::{FaceIndex, RayHit, VertexIndex},
};



// ===============================================================================================
// ===== Definition of types stored inside the data structure
// ===============================================================================================

/// Data stored per vertex.
#[derive(Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Point,

    /// One outgoing half edge.
    ///
    /// - If the vertex is isolated, this is `None`.
    /// - If the vertex is a boundary vertex, this is its outgoing boundary
    ///   half edge (there is exactly one, as the mesh is manifold).
    /// - Otherwise, the half edge is arbitrary.
    pub outgoing: Opt<HalfEdgeHandle>,
}

/// Data stored per half edge.
#[derive(Clone, Copy, PartialEq)]
pub struct HalfEdge {
    /// The vertex this half edge starts at.
    pub origin: VertexHandle,

    /// The half edge going the other way.
    pub twin: HalfEdgeHandle,

    /// The next half edge around the face or hole (counter clockwise).
    pub next: HalfEdgeHandle,

    /// The previous half edge around the face or hole.
    pub prev: HalfEdgeHandle,

    /// The face this half edge belongs to. `None` for boundary half edges.
    pub face: Opt<FaceHandle>,

    /// The full edge this half edge is one half of.
    pub edge: EdgeHandle,
}

/// Data stored per full edge: its two half edges.
#[derive(Clone, Copy, PartialEq)]
pub struct FullEdge {
    pub half: [HalfEdgeHandle; 2],
}

/// Data stored per face: one of its three inner half edges.
#[derive(Clone, Copy, PartialEq)]
pub struct Face {
    pub edge: HalfEdgeHandle,
}

impl fmt::Debug for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Vertex {{ position: ({}, {}, {}), outgoing: {:?} }}",
            self.position.x,
            self.position.y,
            self.position.z,
            self.outgoing,
        )
    }
}

impl fmt::Debug for HalfEdge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "HalfEdge {{ origin: {:5} twin: {:6} next: {:6} prev: {:6} edge: {:5} face: {:?} }}",
            format!("{:?},", self.origin),
            format!("{:?},", self.twin),
            format!("{:?},", self.next),
            format!("{:?},", self.prev),
            format!("{:?},", self.edge),
            self.face,
        )
    }
}

impl fmt::Debug for FullEdge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FullEdge {{ half: {:?} }}", self.half)
    }
}

impl fmt::Debug for Face {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Face {{ edge: {:?} }}", self.edge)
    }
}


/// A triangle mesh stored as doubly connected edge list.
///
/// All elements live in index-stable [`DenseMap`]s, so handles stay valid
/// until the element itself is removed. Faces are always triangles; the
/// surface must be an oriented 2-manifold, possibly with boundary.
///
/// Build one with [`Dcel::from_triangles`]. The raw `insert_*`/`remove_*`
/// methods only touch storage and do not keep the connectivity consistent;
/// use [`Dcel::collapse_edge_to`] and [`Dcel::apply_split`] to edit a valid
/// mesh.
#[derive(Clone, Default)]
pub struct Dcel {
    vertices: DenseMap<VertexHandle, Vertex>,
    half_edges: DenseMap<HalfEdgeHandle, HalfEdge>,
    edges: DenseMap<EdgeHandle, FullEdge>,
    faces: DenseMap<FaceHandle, Face>,
}

impl fmt::Debug for Dcel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Dcel")
            .field("vertices", &self.vertices)
            .field("half_edges", &self.half_edges)
            .field("edges", &self.edges)
            .field("faces", &self.faces)
            .finish()
    }
}

impl Empty for Dcel {
    fn empty() -> Self {
        Self::default()
    }
}


// ===============================================================================================
// ===== Raw storage
// ===============================================================================================

impl Dcel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_vertex(&mut self, v: Vertex) -> VertexHandle {
        self.vertices.push(v)
    }
    pub fn insert_half_edge(&mut self, he: HalfEdge) -> HalfEdgeHandle {
        self.half_edges.push(he)
    }
    pub fn insert_full_edge(&mut self, e: FullEdge) -> EdgeHandle {
        self.edges.push(e)
    }
    pub fn insert_face(&mut self, f: Face) -> FaceHandle {
        self.faces.push(f)
    }

    pub fn remove_vertex(&mut self, v: VertexHandle) -> Option<Vertex> {
        self.vertices.remove(v)
    }
    pub fn remove_half_edge(&mut self, he: HalfEdgeHandle) -> Option<HalfEdge> {
        self.half_edges.remove(he)
    }
    pub fn remove_full_edge(&mut self, e: EdgeHandle) -> Option<FullEdge> {
        self.edges.remove(e)
    }
    pub fn remove_face(&mut self, f: FaceHandle) -> Option<Face> {
        self.faces.remove(f)
    }

    /// Returns `true` if the mesh contains no elements at all.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
            && self.half_edges.is_empty()
            && self.edges.is_empty()
            && self.faces.is_empty()
    }

    /// Returns `true` if none of the four element maps has holes.
    pub fn is_compact(&self) -> bool {
        self.vertices.is_compact()
            && self.half_edges.is_compact()
            && self.edges.is_compact()
            && self.faces.is_compact()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.half_edges.clear();
        self.edges.clear();
        self.faces.clear();
    }

    pub fn num_vertices(&self) -> hsize {
        self.vertices.num_elements()
    }
    pub fn num_half_edges(&self) -> hsize {
        self.half_edges.num_elements()
    }
    pub fn num_edges(&self) -> hsize {
        self.edges.num_elements()
    }
    pub fn num_faces(&self) -> hsize {
        self.faces.num_elements()
    }

    pub fn vertices(&self) -> Handles<'_, VertexHandle, Vertex> {
        self.vertices.handles()
    }
    pub fn half_edges(&self) -> Handles<'_, HalfEdgeHandle, HalfEdge> {
        self.half_edges.handles()
    }
    pub fn edges(&self) -> Handles<'_, EdgeHandle, FullEdge> {
        self.edges.handles()
    }
    pub fn faces(&self) -> Handles<'_, FaceHandle, Face> {
        self.faces.handles()
    }

    pub fn contains_vertex(&self, v: VertexHandle) -> bool {
        self.vertices.contains_handle(v)
    }
    pub fn contains_half_edge(&self, he: HalfEdgeHandle) -> bool {
        self.half_edges.contains_handle(he)
    }
    pub fn contains_edge(&self, e: EdgeHandle) -> bool {
        self.edges.contains_handle(e)
    }
    pub fn contains_face(&self, f: FaceHandle) -> bool {
        self.faces.contains_handle(f)
    }

    pub fn vertex(&self, v: VertexHandle) -> &Vertex {
        &self.vertices[v]
    }
    pub fn half_edge(&self, he: HalfEdgeHandle) -> &HalfEdge {
        &self.half_edges[he]
    }
    pub fn full_edge(&self, e: EdgeHandle) -> &FullEdge {
        &self.edges[e]
    }
    pub fn face(&self, f: FaceHandle) -> &Face {
        &self.faces[f]
    }
}


// ===============================================================================================
// ===== Connectivity and geometry queries
// ===============================================================================================

impl Dcel {
    pub fn position(&self, v: VertexHandle) -> Point {
        self.vertices[v].position
    }

    pub fn set_position(&mut self, v: VertexHandle, pos: Point) {
        self.vertices[v].position = pos;
    }

    pub fn origin(&self, he: HalfEdgeHandle) -> VertexHandle {
        self.half_edges[he].origin
    }

    /// The vertex the half edge points to.
    pub fn target(&self, he: HalfEdgeHandle) -> VertexHandle {
        self.origin(self.twin(he))
    }

    pub fn twin(&self, he: HalfEdgeHandle) -> HalfEdgeHandle {
        self.half_edges[he].twin
    }

    pub fn next(&self, he: HalfEdgeHandle) -> HalfEdgeHandle {
        self.half_edges[he].next
    }

    pub fn prev(&self, he: HalfEdgeHandle) -> HalfEdgeHandle {
        self.half_edges[he].prev
    }

    /// The face of the half edge, or `None` if it lies on a hole.
    pub fn face_of(&self, he: HalfEdgeHandle) -> Option<FaceHandle> {
        self.half_edges[he].face.into_option()
    }

    pub fn edge_of(&self, he: HalfEdgeHandle) -> EdgeHandle {
        self.half_edges[he].edge
    }

    pub fn half_edges_of(&self, e: EdgeHandle) -> [HalfEdgeHandle; 2] {
        self.edges[e].half
    }

    /// The origins of the two half edges of `e`, in the order of
    /// [`Dcel::half_edges_of`].
    pub fn endpoints(&self, e: EdgeHandle) -> [VertexHandle; 2] {
        let [a, b] = self.edges[e].half;
        [self.origin(a), self.origin(b)]
    }

    /// The three inner half edges of the face, in `next` order starting at
    /// the face's stored half edge.
    pub fn face_half_edges(&self, f: FaceHandle) -> [HalfEdgeHandle; 3] {
        let he0 = self.faces[f].edge;
        let he1 = self.next(he0);
        let he2 = self.next(he1);
        [he0, he1, he2]
    }

    /// The three vertices of the face in counter clockwise order.
    pub fn vertices_of_face(&self, f: FaceHandle) -> [VertexHandle; 3] {
        let [a, b, c] = self.face_half_edges(f);
        [self.origin(a), self.origin(b), self.origin(c)]
    }

    pub fn face_positions(&self, f: FaceHandle) -> [Point; 3] {
        let [a, b, c] = self.vertices_of_face(f);
        [self.position(a), self.position(b), self.position(c)]
    }

    /// Unit normal of the face (zero vector for degenerate faces).
    pub fn face_normal(&self, f: FaceHandle) -> Vector {
        let [a, b, c] = self.face_positions(f);
        math::triangle_normal(a, b, c)
    }

    pub fn face_area(&self, f: FaceHandle) -> Scalar {
        let [a, b, c] = self.face_positions(f);
        math::triangle_area(a, b, c)
    }

    pub fn face_centroid(&self, f: FaceHandle) -> Point {
        let [a, b, c] = self.face_positions(f);
        math::triangle_centroid(a, b, c)
    }

    /// Area weighted average of the normals of all faces around `v`.
    /// Returns the zero vector for isolated vertices.
    pub fn vertex_normal(&self, v: VertexHandle) -> Vector {
        let sum = self.outgoing_half_edges(v)
            .filter_map(|he| self.face_of(he))
            .map(|f| {
                let [a, b, c] = self.face_positions(f);
                math::triangle_cross(a, b, c)
            })
            .fold(Vector::zero(), |acc, n| acc + n);

        if sum.magnitude2() == 0.0 {
            sum
        } else {
            sum.normalize()
        }
    }

    pub fn is_boundary_half_edge(&self, he: HalfEdgeHandle) -> bool {
        self.half_edges[he].face.is_none()
    }

    /// Returns `true` if the vertex lies on a hole. Isolated vertices are
    /// not boundary vertices.
    pub fn is_boundary_vertex(&self, v: VertexHandle) -> bool {
        self.vertices[v].outgoing.into_option()
            .map(|out| self.is_boundary_half_edge(out))
            .unwrap_or(false)
    }

    /// Returns `true` if one side of the edge is a hole.
    pub fn is_boundary_edge(&self, e: EdgeHandle) -> bool {
        let [a, b] = self.edges[e].half;
        self.is_boundary_half_edge(a) || self.is_boundary_half_edge(b)
    }

    pub fn is_isolated(&self, v: VertexHandle) -> bool {
        self.vertices[v].outgoing.is_none()
    }

    /// Number of edges incident to `v`.
    pub fn valence(&self, v: VertexHandle) -> usize {
        self.outgoing_half_edges(v).count()
    }

    /// Returns the half edge from `from` to `to`, if it exists.
    pub fn half_edge_between(&self, from: VertexHandle, to: VertexHandle) -> Option<HalfEdgeHandle> {
        self.outgoing_half_edges(from).find(|&he| self.target(he) == to)
    }

    pub fn edge_between(&self, a: VertexHandle, b: VertexHandle) -> Option<EdgeHandle> {
        self.half_edge_between(a, b).map(|he| self.edge_of(he))
    }

    /// Bounding box of all vertex positions.
    pub fn bounding_box(&self) -> Aabb {
        Aabb::around(self.vertices.values().map(|v| v.position))
    }

    /// Returns an iterator that circulates clockwise around `v`, yielding all
    /// outgoing half edges. Starts at the boundary for boundary vertices.
    pub fn outgoing_half_edges(&self, v: VertexHandle) -> CwVertexCirculator<'_> {
        match self.vertices[v].outgoing.into_option() {
            None => CwVertexCirculator::Empty,
            Some(start_he) => CwVertexCirculator::NonEmpty {
                dcel: self,
                current_he: start_he,
                start_he,
            },
        }
    }
}


// ===============================================================================================
// ===== Circulator
// ===============================================================================================

/// An iterator that circulates around a vertex in clockwise order, yielding
/// the outgoing half edges.
#[derive(Debug, Clone)]
pub enum CwVertexCirculator<'a> {
    Empty,
    NonEmpty {
        dcel: &'a Dcel,
        current_he: HalfEdgeHandle,
        start_he: HalfEdgeHandle,
    },
}

impl Iterator for CwVertexCirculator<'_> {
    type Item = HalfEdgeHandle;

    #[inline(always)]
    fn next(&mut self) -> Option<Self::Item> {
        match *self {
            CwVertexCirculator::Empty => None,
            CwVertexCirculator::NonEmpty { dcel, ref mut current_he, start_he } => {
                let out = *current_he;

                let next = dcel.next(dcel.twin(out));
                if next == start_he {
                    *self = CwVertexCirculator::Empty;
                } else {
                    *current_he = next;
                }

                Some(out)
            }
        }
    }
}


// ===============================================================================================
// ===== Integrity check
// ===============================================================================================

impl Dcel {
    /// Checks all structural invariants and panics with a `bug: ...` message
    /// naming the first violation found.
    ///
    /// This is rather slow and mostly useful in tests and debug builds.
    pub fn check_integrity(&self) {
        let mut num_outgoing: FxHashMap<VertexHandle, usize> = FxHashMap::default();

        for (he, data) in self.half_edges.iter() {
            let h = |other| self.referenced_half_edge(he, other);

            if !self.vertices.contains_handle(data.origin) {
                panic!("bug: origin of {:?} ({:?}) does not exist", he, data.origin);
            }
            *num_outgoing.entry(data.origin).or_insert(0) += 1;

            if h(data.twin).twin != he {
                panic!("bug: twin(twin({:?})) != {:?}", he, he);
            }
            if h(data.twin).origin == data.origin {
                panic!("bug: {:?} and its twin {:?} share the origin", he, data.twin);
            }
            if h(data.twin).edge != data.edge {
                panic!("bug: {:?} and its twin {:?} belong to different edges", he, data.twin);
            }
            if h(data.next).prev != he {
                panic!("bug: prev(next({:?})) != {:?}", he, he);
            }
            if h(data.prev).next != he {
                panic!("bug: next(prev({:?})) != {:?}", he, he);
            }
            if h(data.next).origin != h(data.twin).origin {
                panic!("bug: next of {:?} does not start at its target", he);
            }
            if h(data.next).face != data.face {
                panic!("bug: {:?} and its next {:?} have different faces", he, data.next);
            }

            match self.edges.get(data.edge) {
                None => panic!("bug: edge of {:?} ({:?}) does not exist", he, data.edge),
                Some(e) if !e.half.contains(&he) => {
                    panic!("bug: {:?} is not listed in its edge {:?}", he, data.edge);
                }
                _ => {}
            }

            if let Some(f) = data.face.into_option() {
                if !self.faces.contains_handle(f) {
                    panic!("bug: face of {:?} ({:?}) does not exist", he, f);
                }
                if h(h(data.next).next).next != he {
                    panic!("bug: face {:?} is not a triangle (at {:?})", f, he);
                }
            }
        }

        for (e, data) in self.edges.iter() {
            let [a, b] = data.half;
            if !self.half_edges.contains_handle(a) || !self.half_edges.contains_handle(b) {
                panic!("bug: {:?} references a non-existing half edge", e);
            }
            if self.twin(a) != b {
                panic!("bug: half edges of {:?} are not twins", e);
            }
            if self.half_edges[a].face.is_none() && self.half_edges[b].face.is_none() {
                panic!("bug: {:?} has no face on either side", e);
            }
        }

        for (f, data) in self.faces.iter() {
            match self.half_edges.get(data.edge) {
                None => panic!("bug: {:?} references non-existing {:?}", f, data.edge),
                Some(he) if he.face.into_option() != Some(f) => {
                    panic!("bug: {:?} references {:?}, which is not adjacent to it", f, data.edge);
                }
                _ => {}
            }
        }

        for (v, data) in self.vertices.iter() {
            let out = match data.outgoing.into_option() {
                None => {
                    if num_outgoing.contains_key(&v) {
                        panic!("bug: {:?} has no outgoing half edge, but is not isolated", v);
                    }
                    continue;
                }
                Some(out) => out,
            };

            match self.half_edges.get(out) {
                None => panic!("bug: outgoing half edge of {:?} ({:?}) does not exist", v, out),
                Some(he) if he.origin != v => {
                    panic!("bug: outgoing half edge {:?} of {:?} starts elsewhere", out, v);
                }
                _ => {}
            }

            let expected = num_outgoing.get(&v).cloned().unwrap_or(0);
            let mut count = 0;
            let mut num_boundary = 0;
            for he in self.outgoing_half_edges(v) {
                count += 1;
                if count > expected {
                    panic!("bug: circulating around {:?} does not terminate", v);
                }
                if self.is_boundary_half_edge(he) {
                    num_boundary += 1;
                }
            }

            if count != expected {
                panic!(
                    "bug: {:?} is non-manifold (circulation visits {} of {} outgoing half edges)",
                    v,
                    count,
                    expected,
                );
            }
            if num_boundary > 1 {
                panic!("bug: {:?} has {} outgoing boundary half edges", v, num_boundary);
            }
            if num_boundary == 1 && !self.is_boundary_half_edge(out) {
                panic!("bug: {:?} is on the boundary but its outgoing half edge is not", v);
            }
        }
    }

    fn referenced_half_edge(&self, from: HalfEdgeHandle, he: HalfEdgeHandle) -> &HalfEdge {
        match self.half_edges.get(he) {
            Some(data) => data,
            None => panic!("bug: {:?} references non-existing half edge {:?}", from, he),
        }
    }
}
