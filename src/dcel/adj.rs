//! Typed adjacency traversal.
//!
//! A traversal is selected by a type implementing [`AdjKind`]; all dispatch
//! is static. Example:
//!
//! ```
//! use fxhash::FxHashSet;
//! use lodmesh::{Dcel, dcel::adj::VertexFace, math::Point};
//!
//! let positions = vec![
//!     Point::new(0.0, 0.0, 0.0),
//!     Point::new(1.0, 0.0, 0.0),
//!     Point::new(0.0, 1.0, 0.0),
//!     Point::new(1.0, 1.0, 0.0),
//! ];
//! let dcel = Dcel::from_triangles(&positions, &[[0, 1, 2], [2, 1, 3]]).unwrap();
//!
//! let v1 = dcel.vertices().nth(1).unwrap();
//! assert_eq!(dcel.adj::<VertexFace>(v1).list().len(), 2);
//!
//! let mut ring = FxHashSet::default();
//! dcel.vv(v1).n_ring(1, &mut ring);
//! assert_eq!(ring.len(), 4);
//! ```

use std::marker::PhantomData;

use fxhash::FxHashSet;
use smallvec::SmallVec;

use crate::handle::{EdgeHandle, FaceHandle, Handle, HalfEdgeHandle, VertexHandle};
use super::Dcel;


/// List of adjacent elements. Most vertices have fewer than 8 neighbors.
pub type AdjList<T> = SmallVec<[T; 8]>;

/// A kind of adjacency traversal: from a center element to adjacent items.
pub trait AdjKind: 'static {
    type Center: Handle;
    type Item: Handle;

    /// Returns the center as item if center and items are of the same
    /// element kind (e.g. vertex to vertex). For those, the center is part
    /// of its own 0-ring.
    fn center_as_item(center: Self::Center) -> Option<Self::Item>;

    /// The items directly adjacent to `center`.
    fn list(dcel: &Dcel, center: Self::Center) -> AdjList<Self::Item>;

    /// The items one more hop away from `item`. Used to grow rings.
    fn grow(dcel: &Dcel, item: Self::Item) -> AdjList<Self::Item>;
}

/// Vertex to neighboring vertices (clockwise, starting at the outgoing half
/// edge).
#[allow(missing_debug_implementations)]
pub enum VertexVertex {}

/// Vertex to incident faces (clockwise, starting at the outgoing half edge).
#[allow(missing_debug_implementations)]
pub enum VertexFace {}

/// Face to the faces across its three edges.
#[allow(missing_debug_implementations)]
pub enum FaceFace {}

/// Face to its three inner half edges (in `next` order).
#[allow(missing_debug_implementations)]
pub enum FaceHalfEdge {}

/// Edge to all faces around its two endpoints.
#[allow(missing_debug_implementations)]
pub enum EdgeFace {}

impl AdjKind for VertexVertex {
    type Center = VertexHandle;
    type Item = VertexHandle;

    fn center_as_item(center: VertexHandle) -> Option<VertexHandle> {
        Some(center)
    }

    fn list(dcel: &Dcel, center: VertexHandle) -> AdjList<VertexHandle> {
        dcel.outgoing_half_edges(center).map(|he| dcel.target(he)).collect()
    }

    fn grow(dcel: &Dcel, item: VertexHandle) -> AdjList<VertexHandle> {
        Self::list(dcel, item)
    }
}

impl AdjKind for VertexFace {
    type Center = VertexHandle;
    type Item = FaceHandle;

    fn center_as_item(_: VertexHandle) -> Option<FaceHandle> {
        None
    }

    fn list(dcel: &Dcel, center: VertexHandle) -> AdjList<FaceHandle> {
        dcel.outgoing_half_edges(center).filter_map(|he| dcel.face_of(he)).collect()
    }

    fn grow(dcel: &Dcel, item: FaceHandle) -> AdjList<FaceHandle> {
        faces_sharing_a_vertex(dcel, item)
    }
}

impl AdjKind for FaceFace {
    type Center = FaceHandle;
    type Item = FaceHandle;

    fn center_as_item(center: FaceHandle) -> Option<FaceHandle> {
        Some(center)
    }

    fn list(dcel: &Dcel, center: FaceHandle) -> AdjList<FaceHandle> {
        dcel.face_half_edges(center)
            .iter()
            .filter_map(|&he| dcel.face_of(dcel.twin(he)))
            .collect()
    }

    fn grow(dcel: &Dcel, item: FaceHandle) -> AdjList<FaceHandle> {
        Self::list(dcel, item)
    }
}

impl AdjKind for FaceHalfEdge {
    type Center = FaceHandle;
    type Item = HalfEdgeHandle;

    fn center_as_item(_: FaceHandle) -> Option<HalfEdgeHandle> {
        None
    }

    fn list(dcel: &Dcel, center: FaceHandle) -> AdjList<HalfEdgeHandle> {
        dcel.face_half_edges(center).iter().cloned().collect()
    }

    /// The inner half edges of the face on the other side.
    fn grow(dcel: &Dcel, item: HalfEdgeHandle) -> AdjList<HalfEdgeHandle> {
        match dcel.face_of(dcel.twin(item)) {
            Some(f) => Self::list(dcel, f),
            None => AdjList::new(),
        }
    }
}

impl AdjKind for EdgeFace {
    type Center = EdgeHandle;
    type Item = FaceHandle;

    fn center_as_item(_: EdgeHandle) -> Option<FaceHandle> {
        None
    }

    fn list(dcel: &Dcel, center: EdgeHandle) -> AdjList<FaceHandle> {
        let [a, b] = dcel.endpoints(center);
        let mut out = VertexFace::list(dcel, a);
        for f in VertexFace::list(dcel, b) {
            if !out.contains(&f) {
                out.push(f);
            }
        }
        out
    }

    fn grow(dcel: &Dcel, item: FaceHandle) -> AdjList<FaceHandle> {
        faces_sharing_a_vertex(dcel, item)
    }
}

fn faces_sharing_a_vertex(dcel: &Dcel, f: FaceHandle) -> AdjList<FaceHandle> {
    let mut out = AdjList::new();
    for &v in &dcel.vertices_of_face(f) {
        for other in VertexFace::list(dcel, v) {
            if other != f && !out.contains(&other) {
                out.push(other);
            }
        }
    }
    out
}


/// Adjacency of one center element, see [`Dcel::adj`].
pub struct Adj<'a, K: AdjKind> {
    dcel: &'a Dcel,
    center: K::Center,
    _kind: PhantomData<K>,
}

impl<'a, K: AdjKind> Adj<'a, K> {
    pub fn center(&self) -> K::Center {
        self.center
    }

    /// The directly adjacent items, freshly computed from the current mesh.
    pub fn list(&self) -> AdjList<K::Item> {
        K::list(self.dcel, self.center)
    }

    /// Collects all items reachable within `k` hops into `out` (which is
    /// cleared first).
    ///
    /// If center and items are of the same kind, the 0-ring is the center
    /// itself. Otherwise, the 0-ring is empty and the 1-ring is
    /// [`Adj::list`].
    pub fn n_ring(&self, k: usize, out: &mut FxHashSet<K::Item>) {
        out.clear();

        let mut frontier = Vec::new();
        let hops = match K::center_as_item(self.center) {
            Some(center) => {
                out.insert(center);
                frontier.push(center);
                k
            }
            None => {
                if k == 0 {
                    return;
                }

                for item in self.list() {
                    if out.insert(item) {
                        frontier.push(item);
                    }
                }
                k - 1
            }
        };

        for _ in 0..hops {
            if frontier.is_empty() {
                break;
            }

            let mut next = Vec::new();
            for &item in &frontier {
                for neighbor in K::grow(self.dcel, item) {
                    if out.insert(neighbor) {
                        next.push(neighbor);
                    }
                }
            }
            frontier = next;
        }
    }
}

impl Dcel {
    /// Returns the adjacency of `center` for the traversal kind `K`.
    pub fn adj<K: AdjKind>(&self, center: K::Center) -> Adj<'_, K> {
        Adj {
            dcel: self,
            center,
            _kind: PhantomData,
        }
    }

    pub fn vv(&self, v: VertexHandle) -> Adj<'_, VertexVertex> {
        self.adj(v)
    }
    pub fn vf(&self, v: VertexHandle) -> Adj<'_, VertexFace> {
        self.adj(v)
    }
    pub fn ff(&self, f: FaceHandle) -> Adj<'_, FaceFace> {
        self.adj(f)
    }
    pub fn fhe(&self, f: FaceHandle) -> Adj<'_, FaceHalfEdge> {
        self.adj(f)
    }
    pub fn ef(&self, e: EdgeHandle) -> Adj<'_, EdgeFace> {
        self.adj(e)
    }
}
