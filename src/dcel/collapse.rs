//! Edge collapse and its inverse, the vertex split.

use cgmath::prelude::*;
use fxhash::FxHashSet;
use optional::Optioned as Opt;
use smallvec::SmallVec;
use tracing::trace;

use crate::{
    error::{Error, Result},
    handle::{EdgeHandle, FaceHandle, HalfEdgeHandle, VertexHandle},
    math::{self, Point},
};
use super::{Dcel, Face, FullEdge, HalfEdge, Vertex};


/// Everything needed to undo one edge collapse.
///
/// Returned by [`Dcel::collapse_edge_to`] and consumed by
/// [`Dcel::apply_split`]. It stores the state of all elements the collapse
/// removed or modified, *before* the collapse. Splits have to be applied in
/// the reverse order of the collapses.
#[derive(Debug, Clone)]
pub struct VertexSplit {
    edge: EdgeHandle,
    kept: VertexHandle,
    removed: VertexHandle,

    removed_vertex: Vertex,
    removed_half_edges: [(HalfEdgeHandle, HalfEdge); 6],
    removed_edges: [(EdgeHandle, FullEdge); 3],
    removed_faces: [(FaceHandle, Face); 2],

    changed_vertices: SmallVec<[(VertexHandle, Vertex); 3]>,
    changed_half_edges: SmallVec<[(HalfEdgeHandle, HalfEdge); 12]>,
    changed_edges: [(EdgeHandle, FullEdge); 2],
}

impl VertexSplit {
    /// The edge that was collapsed (and that this split recreates).
    pub fn edge(&self) -> EdgeHandle {
        self.edge
    }

    /// The vertex that survived the collapse.
    pub fn kept_vertex(&self) -> VertexHandle {
        self.kept
    }

    /// The vertex that was removed by the collapse.
    pub fn removed_vertex(&self) -> VertexHandle {
        self.removed
    }

    /// Position of the kept vertex before the collapse.
    pub fn kept_position(&self) -> Point {
        self.changed_vertices[0].1.position
    }

    /// Position of the removed vertex before the collapse.
    pub fn removed_position(&self) -> Point {
        self.removed_vertex.position
    }

    /// The two faces the collapse removed.
    pub fn removed_faces(&self) -> [FaceHandle; 2] {
        [self.removed_faces[0].0, self.removed_faces[1].0]
    }

    /// The collapsed edge and the two edges merged into others.
    pub fn removed_edges(&self) -> [EdgeHandle; 3] {
        self.removed_edges.map(|(e, _)| e)
    }
}

/// The neighborhood of an edge, as needed by the collapse. See the ASCII art
/// in `Dcel::collapse_neighborhood`.
#[derive(Debug, Clone, Copy)]
struct Neighborhood {
    a: VertexHandle,
    b: VertexHandle,
    c: VertexHandle,
    d: VertexHandle,
    h: HalfEdgeHandle,
    h1: HalfEdgeHandle,
    h2: HalfEdgeHandle,
    t: HalfEdgeHandle,
    t1: HalfEdgeHandle,
    t2: HalfEdgeHandle,
    f1: FaceHandle,
    f2: FaceHandle,
}

impl Dcel {
    /// Collapses the edge by merging its second endpoint into its first one
    /// (`endpoints(edge)[0]`), keeping the position of the latter. Returns the
    /// surviving vertex.
    ///
    /// Validated like [`Dcel::collapse_edge_to`] with the first endpoint's
    /// position as target: faces of the removed vertex that would fold over
    /// when moved there make the collapse fail.
    pub fn collapse_edge(&mut self, edge: EdgeHandle) -> Result<VertexHandle> {
        self.collapse_impl(edge, None).map(|split| split.kept)
    }

    /// Collapses the edge and moves the surviving vertex to `position`.
    ///
    /// The first endpoint (`endpoints(edge)[0]`) survives, the second one is
    /// removed together with the edge, the two faces adjacent to it and two
    /// further edges (each of those faces' remaining edges are merged into
    /// one).
    ///
    /// Everything is checked before the mesh is modified, so on error, the
    /// mesh is unchanged:
    /// - `Error::Topology` if the edge lies on the boundary.
    /// - `Error::DegenerateCollapse` if the collapse would make the mesh
    ///   non-manifold or degenerate (the endpoints share more neighbors than
    ///   the two opposite vertices, both endpoints lie on the boundary, an
    ///   opposite vertex would be left with too few edges) or if a face
    ///   around the edge would flip its orientation when moving the vertex to
    ///   `position`.
    ///
    /// On success, returns the record to undo the collapse with
    /// [`Dcel::apply_split`].
    pub fn collapse_edge_to(&mut self, edge: EdgeHandle, position: Point) -> Result<VertexSplit> {
        self.collapse_impl(edge, Some(position))
    }

    /// Checks whether the edge can be collapsed to `position` (or at the
    /// first endpoint's position if `None`) without changing the mesh.
    pub fn can_collapse(&self, edge: EdgeHandle, position: Option<Point>) -> Result<()> {
        self.check_collapse(edge, position).map(|_| ())
    }

    /// Collects the handles around `edge`:
    ///
    /// ```text
    ///            c
    ///          /   \
    ///      h1 /  F1 \ h2
    ///        /   h   \
    ///       b ------- a
    ///        \   t   /
    ///      t2 \  F2 / t1
    ///          \   /
    ///            d
    /// ```
    ///
    /// with `h = a -> b`, `h1 = b -> c`, `h2 = c -> a` and `t = b -> a`,
    /// `t1 = a -> d`, `t2 = d -> b`.
    fn collapse_neighborhood(&self, edge: EdgeHandle) -> Result<Neighborhood> {
        let [h, t] = self.half_edges_of(edge);
        let (f1, f2) = match (self.face_of(h), self.face_of(t)) {
            (Some(f1), Some(f2)) => (f1, f2),
            _ => {
                return Err(Error::Topology(format!("cannot collapse boundary edge {:?}", edge)));
            }
        };

        let h1 = self.next(h);
        let h2 = self.next(h1);
        let t1 = self.next(t);
        let t2 = self.next(t1);
        if self.next(h2) != h || self.next(t2) != t {
            return Err(Error::Topology(format!("a face adjacent to {:?} is not a triangle", edge)));
        }

        Ok(Neighborhood {
            a: self.origin(h),
            b: self.origin(t),
            c: self.origin(h2),
            d: self.origin(t2),
            h, h1, h2, t, t1, t2, f1, f2,
        })
    }

    fn check_collapse(&self, edge: EdgeHandle, position: Option<Point>) -> Result<Neighborhood> {
        let n = self.collapse_neighborhood(edge)?;
        let degenerate = || Err(Error::DegenerateCollapse(edge));

        // Merging two boundary vertices connected by an inner edge would pinch
        // the surface.
        if self.is_boundary_vertex(n.a) && self.is_boundary_vertex(n.b) {
            return degenerate();
        }

        // Link condition: the only common neighbors are the opposite vertices.
        let neighbors_a: FxHashSet<_> = self.outgoing_half_edges(n.a)
            .map(|he| self.target(he))
            .collect();
        let num_common = self.outgoing_half_edges(n.b)
            .map(|he| self.target(he))
            .filter(|v| neighbors_a.contains(v))
            .count();
        if num_common != 2 {
            return degenerate();
        }

        // The opposite vertices each lose one edge.
        for &opposite in &[n.c, n.d] {
            let min_valence = if self.is_boundary_vertex(opposite) { 3 } else { 4 };
            if self.valence(opposite) < min_valence {
                return degenerate();
            }
        }

        let position = position.unwrap_or_else(|| self.position(n.a));
        if self.collapse_flips_face(&n, position) {
            return degenerate();
        }

        Ok(n)
    }

    /// Returns `true` if any face around `a` or `b` (except the two faces
    /// removed by the collapse) would flip or degenerate when both vertices
    /// are moved to `position`.
    fn collapse_flips_face(&self, n: &Neighborhood, position: Point) -> bool {
        let faces = self.outgoing_half_edges(n.a)
            .chain(self.outgoing_half_edges(n.b))
            .filter_map(|he| self.face_of(he))
            .filter(|&f| f != n.f1 && f != n.f2);

        for f in faces {
            let vs = self.vertices_of_face(f);
            let old = self.face_positions(f);
            let mut new = old;
            for i in 0..3 {
                if vs[i] == n.a || vs[i] == n.b {
                    new[i] = position;
                }
            }

            let before = math::triangle_normal(old[0], old[1], old[2]);
            let after = math::triangle_cross(new[0], new[1], new[2]);
            if after.magnitude() * 0.5 <= math::DEGENERATE_AREA || before.dot(after) <= 0.0 {
                return true;
            }
        }

        false
    }

    fn collapse_impl(&mut self, edge: EdgeHandle, position: Option<Point>) -> Result<VertexSplit> {
        let n = self.check_collapse(edge, position)?;
        let Neighborhood { a, b, c, d, h, h1, h2, t, t1, t2, f1, f2 } = n;

        let o1 = self.twin(h1);
        let o2 = self.twin(t2);
        let h2_twin = self.twin(h2);
        let t1_twin = self.twin(t1);
        let e_h1 = self.edge_of(h1);
        let e_h2 = self.edge_of(h2);
        let e_t1 = self.edge_of(t1);
        let e_t2 = self.edge_of(t2);

        // ===================================================================
        // ===== Record everything we are about to touch
        // ===================================================================
        let b_outgoing: SmallVec<[HalfEdgeHandle; 8]> = self.outgoing_half_edges(b)
            .filter(|&he| he != t && he != h1)
            .collect();

        let mut changed_half_edges: SmallVec<[(HalfEdgeHandle, HalfEdge); 12]> = SmallVec::new();
        for &he in b_outgoing.iter().chain(&[o1, h2_twin, t1_twin]) {
            if !changed_half_edges.iter().any(|&(other, _)| other == he) {
                changed_half_edges.push((he, self.half_edges[he]));
            }
        }

        let removed_half_edges = [h, h1, h2, t, t1, t2].map(|he| (he, self.half_edges[he]));

        let split = VertexSplit {
            edge,
            kept: a,
            removed: b,
            removed_vertex: self.vertices[b],
            removed_half_edges,
            removed_edges: [
                (edge, self.edges[edge]),
                (e_h1, self.edges[e_h1]),
                (e_t2, self.edges[e_t2]),
            ],
            removed_faces: [(f1, self.faces[f1]), (f2, self.faces[f2])],
            changed_vertices: [a, c, d].iter().map(|&v| (v, self.vertices[v])).collect(),
            changed_half_edges,
            changed_edges: [(e_h2, self.edges[e_h2]), (e_t1, self.edges[e_t1])],
        };

        // ===================================================================
        // ===== Mutate
        // ===================================================================
        for &he in &b_outgoing {
            self.half_edges[he].origin = a;
        }

        // `o1` takes the place of `h2`, `o2` the place of `t1`.
        self.half_edges[o1].twin = h2_twin;
        self.half_edges[o1].edge = e_h2;
        self.half_edges[h2_twin].twin = o1;
        replace_half(&mut self.edges[e_h2], h2, o1);

        self.half_edges[o2].twin = t1_twin;
        self.half_edges[o2].edge = e_t1;
        self.half_edges[t1_twin].twin = o2;
        replace_half(&mut self.edges[e_t1], t1, o2);

        let a_out = self.vertices[a].outgoing.into_option();
        let b_out = self.vertices[b].outgoing.into_option();
        let new_a_out = match (a_out, b_out) {
            (Some(out), _) if self.is_boundary_half_edge(out) => out,
            (_, Some(out)) if self.is_boundary_half_edge(out) => out,
            (Some(out), _) if out != h && out != t1 => out,
            _ => h2_twin,
        };
        self.vertices[a].outgoing = Opt::some(new_a_out);
        if self.vertices[c].outgoing.into_option() == Some(h2) {
            self.vertices[c].outgoing = Opt::some(o1);
        }
        if self.vertices[d].outgoing.into_option() == Some(t2) {
            self.vertices[d].outgoing = Opt::some(t1_twin);
        }

        for &he in &[h, h1, h2, t, t1, t2] {
            self.half_edges.remove(he);
        }
        for &e in &[edge, e_h1, e_t2] {
            self.edges.remove(e);
        }
        self.faces.remove(f1);
        self.faces.remove(f2);
        self.vertices.remove(b);

        if let Some(position) = position {
            self.vertices[a].position = position;
        }

        trace!(?edge, kept = ?a, removed = ?b, "collapsed edge");
        Ok(split)
    }

    /// Undoes the collapse described by `split`, restoring exactly the state
    /// (positions, connectivity and handles) before that collapse.
    ///
    /// Splits have to be applied in reverse order of their collapses. Fails
    /// with `Error::Topology` without modifying the mesh if the split does
    /// not fit the current state (e.g. the kept vertex does not exist or the
    /// slots of the removed elements are already occupied).
    pub fn apply_split(&mut self, split: &VertexSplit) -> Result<()> {
        let fits = self.vertices.contains_handle(split.kept)
            && !self.vertices.contains_handle(split.removed)
            && split.removed_half_edges.iter().all(|(he, _)| !self.half_edges.contains_handle(*he))
            && split.removed_edges.iter().all(|(e, _)| !self.edges.contains_handle(*e))
            && split.removed_faces.iter().all(|(f, _)| !self.faces.contains_handle(*f))
            && split.changed_half_edges.iter().all(|(he, _)| self.half_edges.contains_handle(*he))
            && split.changed_edges.iter().all(|(e, _)| self.edges.contains_handle(*e))
            && split.changed_vertices.iter().all(|(v, _)| self.vertices.contains_handle(*v));
        if !fits {
            return Err(Error::Topology(format!(
                "vertex split of {:?} does not match the current mesh (splits have to be \
                    applied in reverse order of the collapses)",
                split.edge,
            )));
        }

        self.vertices.insert(split.removed, split.removed_vertex);
        for &(he, data) in &split.removed_half_edges {
            self.half_edges.insert(he, data);
        }
        for &(e, data) in &split.removed_edges {
            self.edges.insert(e, data);
        }
        for &(f, data) in &split.removed_faces {
            self.faces.insert(f, data);
        }

        for &(v, data) in &split.changed_vertices {
            self.vertices[v] = data;
        }
        for &(he, data) in &split.changed_half_edges {
            self.half_edges[he] = data;
        }
        for &(e, data) in &split.changed_edges {
            self.edges[e] = data;
        }

        trace!(edge = ?split.edge, kept = ?split.kept, restored = ?split.removed, "split vertex");
        Ok(())
    }
}

fn replace_half(edge: &mut FullEdge, old: HalfEdgeHandle, new: HalfEdgeHandle) {
    for half in &mut edge.half {
        if *half == old {
            *half = new;
        }
    }
}
